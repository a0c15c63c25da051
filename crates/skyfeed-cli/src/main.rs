use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, FixedOffset, SecondsFormat, TimeZone};
use clap::{Parser, Subcommand, ValueEnum};
use prettytable::{Table, row};
use serde::Serialize;
use skyfeed_core::bucket;
use skyfeed_core::config::{self, Config};
use skyfeed_core::models::format_system_time;
use skyfeed_core::{Clock, FixedClock, LatestImages, SystemClock};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "skyfeed", version)]
#[command(about = "List the most recent captures in an hour-bucketed all-sky image archive")]
struct Cli {
    /// Read configuration from this TOML file instead of the default location.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the newest images from the current and previous hour buckets.
    Latest(LatestArgs),
    /// Show the bucket directories that would be scanned.
    Buckets(BucketArgs),
    /// Configuration helpers
    Config {
        #[command(subcommand)]
        cmd: ConfigCommands,
    },
}

#[derive(Parser)]
struct LatestArgs {
    #[arg(long)]
    image_dir: Option<PathBuf>,
    /// How many of the newest images to return.
    #[arg(long)]
    keep: Option<usize>,
    /// Reference instant (RFC 3339) instead of the system clock.
    #[arg(long)]
    at: Option<String>,
    #[arg(long)]
    parallel: bool,
    /// Give up on slow buckets after this long, e.g. `2s`.
    #[arg(long)]
    deadline: Option<String>,
    #[arg(long, value_enum, default_value_t = LatestFormat::Json)]
    format: LatestFormat,
}

#[derive(Parser)]
struct BucketArgs {
    #[arg(long)]
    image_dir: Option<PathBuf>,
    #[arg(long)]
    at: Option<String>,
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show effective config
    Doctor,
    /// Write the effective config to the config file
    Save,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Table,
}

#[derive(Clone, Copy, ValueEnum)]
enum LatestFormat {
    Json,
    Table,
    /// `image_list = [...];` for inclusion as a script.
    Script,
}

#[derive(Serialize)]
struct BucketRow {
    partition: String,
    reference: String,
    dir: PathBuf,
    exists: bool,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Latest(args) => {
            if let Some(dir) = args.image_dir {
                config.image_dir = dir;
            }
            if let Some(keep) = args.keep {
                config.keep_count = keep;
            }
            if args.parallel {
                config.parallel = true;
            }
            if let Some(raw) = &args.deadline {
                config.deadline = Some(parse_deadline(raw)?);
            }
            let aggregator = config.aggregator();
            let latest = match parse_at(args.at.as_deref())? {
                Some(at) => aggregator.latest_from(&FixedClock(at))?,
                None => aggregator.latest_from(&SystemClock)?,
            };
            emit_latest(args.format, &latest)?;
        }
        Commands::Buckets(args) => {
            let image_dir = args.image_dir.unwrap_or(config.image_dir);
            let rows = match parse_at(args.at.as_deref())? {
                Some(at) => bucket_rows(&image_dir, &FixedClock(at))?,
                None => bucket_rows(&image_dir, &SystemClock)?,
            };
            emit_json_or_table(args.format, &rows, |items| {
                let mut table = Table::new();
                table.add_row(row!["partition", "reference", "dir", "exists"]);
                for item in items {
                    table.add_row(row![
                        item.partition,
                        item.reference,
                        item.dir.display(),
                        item.exists
                    ]);
                }
                table
            })?;
        }
        Commands::Config { cmd } => match cmd {
            ConfigCommands::Doctor => {
                let report = config.doctor();
                println!("{}", serde_json::to_string_pretty(&report)?);
            }
            ConfigCommands::Save => {
                let path = config.save()?;
                info!(path = %path.display(), "config saved");
            }
        },
    }

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "skyfeed_core=info,skyfeed=info".into());
    let registry = tracing_subscriber::registry().with(env_filter);
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v == "json");
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn parse_at(raw: Option<&str>) -> Result<Option<DateTime<FixedOffset>>> {
    raw.map(|value| {
        DateTime::parse_from_rfc3339(value)
            .with_context(|| format!("--at must be an RFC 3339 timestamp, got {value:?}"))
    })
    .transpose()
}

fn parse_deadline(raw: &str) -> Result<Duration> {
    let deadline = config::parse_deadline(raw).map_err(|err| anyhow!("--deadline: {err}"))?;
    debug!(?deadline, "using scan deadline");
    Ok(deadline)
}

fn bucket_rows<C>(image_dir: &std::path::Path, clock: &C) -> Result<Vec<BucketRow>>
where
    C: Clock,
    <C::Zone as TimeZone>::Offset: fmt::Display,
{
    let now = clock.now()?;
    let rows = bucket::candidates(image_dir, &now)?
        .into_iter()
        .map(|c| BucketRow {
            partition: c.key.partition.to_string(),
            reference: c.reference.to_rfc3339_opts(SecondsFormat::Secs, false),
            exists: c.dir.is_dir(),
            dir: c.dir,
        })
        .collect();
    Ok(rows)
}

fn emit_latest(format: LatestFormat, latest: &LatestImages) -> Result<()> {
    print!("{}", render_latest(format, latest)?);
    Ok(())
}

/// Partial runs are flagged in every format: `complete` in json, an
/// `image_list_partial` assignment in script, a footer row in table.
fn render_latest(format: LatestFormat, latest: &LatestImages) -> Result<String> {
    let out = match format {
        LatestFormat::Json => format!("{}\n", serde_json::to_string_pretty(latest)?),
        LatestFormat::Script => {
            let mut out = format!("image_list = {};\n", serde_json::to_string(&latest.paths)?);
            if !latest.complete {
                out.push_str("image_list_partial = true;\n");
            }
            out
        }
        LatestFormat::Table => {
            let mut table = Table::new();
            table.add_row(row!["modified", "path"]);
            for path in &latest.paths {
                // mtime is re-read here for display only; ordering came from the scan
                let modified = std::fs::metadata(path)
                    .and_then(|m| m.modified())
                    .map(format_system_time)
                    .unwrap_or_else(|_| "-".into());
                table.add_row(row![modified, path.display()]);
            }
            if !latest.complete {
                table.add_row(row!["partial", "deadline expired before all buckets were scanned"]);
            }
            table.to_string()
        }
    };
    Ok(out)
}

fn emit_json_or_table<T: Serialize>(
    format: OutputFormat,
    value: &T,
    table_builder: impl FnOnce(&T) -> Table,
) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Table => {
            let table = table_builder(value);
            table.printstd();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use skyfeed_core::ScanIssue;

    fn latest(complete: bool) -> LatestImages {
        LatestImages {
            paths: vec![PathBuf::from("images/20240310/day/10_01/a.jpg")],
            scanned: 1,
            issues: vec![ScanIssue::MissingDirectory {
                path: PathBuf::from("images/20240309/night/10_01"),
            }],
            complete,
        }
    }

    #[test]
    fn json_output_carries_completeness() {
        let out = render_latest(LatestFormat::Json, &latest(false)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["complete"], false);
        assert_eq!(value["paths"][0], "images/20240310/day/10_01/a.jpg");
        assert_eq!(value["issues"][0]["kind"], "missing_directory");
    }

    #[test]
    fn script_output_flags_partial_runs() {
        let full = render_latest(LatestFormat::Script, &latest(true)).unwrap();
        assert_eq!(full, "image_list = [\"images/20240310/day/10_01/a.jpg\"];\n");

        let partial = render_latest(LatestFormat::Script, &latest(false)).unwrap();
        assert!(partial.starts_with("image_list = ["));
        assert!(partial.ends_with("image_list_partial = true;\n"));
    }

    #[test]
    fn table_output_flags_partial_runs() {
        let partial = render_latest(LatestFormat::Table, &latest(false)).unwrap();
        assert!(partial.contains("partial"));
        let full = render_latest(LatestFormat::Table, &latest(true)).unwrap();
        assert!(!full.contains("partial"));
    }
}
