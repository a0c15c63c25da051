use crate::aggregator::{DEFAULT_KEEP_COUNT, ImageAggregator};
use crate::error::{Error, Result};
use crate::models::{DEFAULT_EXTENSIONS, ExtensionFilter};
use crate::scanner::{DEFAULT_MAX_DEPTH, DirectoryScanner};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_IMAGE_DIR: &str = "images";
pub const ENV_IMAGE_DIR: &str = "SKYFEED_IMAGE_DIR";
pub const ENV_KEEP_COUNT: &str = "SKYFEED_KEEP_COUNT";
pub const ENV_EXTENSIONS: &str = "SKYFEED_EXTENSIONS";
pub const ENV_CASE_SENSITIVE: &str = "SKYFEED_CASE_SENSITIVE";
pub const ENV_MAX_DEPTH: &str = "SKYFEED_MAX_DEPTH";
pub const ENV_PARALLEL: &str = "SKYFEED_PARALLEL";
pub const ENV_DEADLINE: &str = "SKYFEED_DEADLINE";

const ENV_KEYS: [&str; 7] = [
    ENV_IMAGE_DIR,
    ENV_KEEP_COUNT,
    ENV_EXTENSIONS,
    ENV_CASE_SENSITIVE,
    ENV_MAX_DEPTH,
    ENV_PARALLEL,
    ENV_DEADLINE,
];

/// Runtime configuration resolved from environment and optional config file.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub image_dir: PathBuf,
    pub keep_count: usize,
    pub filter: ExtensionFilter,
    pub max_depth: usize,
    pub parallel: bool,
    pub deadline: Option<Duration>,
    /// TOML file the values were read from, and where `save` writes.
    pub source_file: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct ConfigFile {
    image_dir: Option<PathBuf>,
    keep_count: Option<usize>,
    extensions: Option<Vec<String>>,
    case_sensitive: Option<bool>,
    max_depth: Option<usize>,
    parallel: Option<bool>,
    deadline: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigDoctor {
    pub image_dir: PathBuf,
    pub image_dir_exists: bool,
    pub keep_count: usize,
    pub extensions: Vec<String>,
    pub case_sensitive: bool,
    pub max_depth: usize,
    pub parallel: bool,
    pub deadline: Option<String>,
    pub config_file: Option<PathBuf>,
    pub source: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            image_dir: PathBuf::from(DEFAULT_IMAGE_DIR),
            keep_count: DEFAULT_KEEP_COUNT,
            filter: ExtensionFilter::default(),
            max_depth: DEFAULT_MAX_DEPTH,
            parallel: false,
            deadline: None,
            source_file: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = config_path();
        let contents = path
            .as_deref()
            .and_then(|path| fs::read_to_string(path).ok());
        let file_config = contents
            .as_deref()
            .map(parse_file)
            .transpose()?;
        let mut config = Self::resolve(file_config.as_ref(), |key| std::env::var(key).ok())?;
        config.source_file = path.filter(|_| file_config.is_some());
        Ok(config)
    }

    /// Load from an explicit TOML file, still honouring environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|err| {
            Error::InvalidConfig(format!("failed to read {}: {err}", path.display()))
        })?;
        let file_config = parse_file(&contents)?;
        let mut config = Self::resolve(Some(&file_config), |key| std::env::var(key).ok())?;
        config.source_file = Some(path.to_path_buf());
        Ok(config)
    }

    fn resolve(
        file_config: Option<&ConfigFile>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let lookup = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let image_dir = lookup(ENV_IMAGE_DIR)
            .map(PathBuf::from)
            .or_else(|| file_config.and_then(|c| c.image_dir.clone()))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_IMAGE_DIR));

        let keep_count = match lookup(ENV_KEEP_COUNT) {
            Some(raw) => parse_env(ENV_KEEP_COUNT, &raw)?,
            None => file_config
                .and_then(|c| c.keep_count)
                .unwrap_or(DEFAULT_KEEP_COUNT),
        };

        let extensions = lookup(ENV_EXTENSIONS)
            .map(|raw| raw.split(',').map(|e| e.trim().to_string()).collect())
            .or_else(|| file_config.and_then(|c| c.extensions.clone()))
            .unwrap_or_else(|| DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect());

        let case_sensitive = match lookup(ENV_CASE_SENSITIVE) {
            Some(raw) => parse_bool(ENV_CASE_SENSITIVE, &raw)?,
            None => file_config.and_then(|c| c.case_sensitive).unwrap_or(true),
        };

        let max_depth = match lookup(ENV_MAX_DEPTH) {
            Some(raw) => parse_env(ENV_MAX_DEPTH, &raw)?,
            None => file_config
                .and_then(|c| c.max_depth)
                .unwrap_or(DEFAULT_MAX_DEPTH),
        };
        if max_depth == 0 {
            return Err(Error::InvalidConfig("max_depth must be at least 1".into()));
        }

        let parallel = match lookup(ENV_PARALLEL) {
            Some(raw) => parse_bool(ENV_PARALLEL, &raw)?,
            None => file_config.and_then(|c| c.parallel).unwrap_or(false),
        };

        let deadline = lookup(ENV_DEADLINE)
            .or_else(|| file_config.and_then(|c| c.deadline.clone()))
            .map(|raw| parse_deadline(&raw))
            .transpose()?;

        let filter = ExtensionFilter::new(extensions, case_sensitive);
        if filter.extensions.is_empty() {
            return Err(Error::InvalidConfig(
                "at least one image extension is required".into(),
            ));
        }

        Ok(Self {
            image_dir,
            keep_count,
            filter,
            max_depth,
            parallel,
            deadline,
            source_file: None,
        })
    }

    /// Write to the file this config was loaded from, or the default location.
    pub fn save(&self) -> Result<PathBuf> {
        let Some(path) = self.source_file.clone().or_else(config_path) else {
            return Err(Error::InvalidConfig(
                "unable to determine config directory".into(),
            ));
        };
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                Error::InvalidConfig(format!("failed to create config dir: {err}"))
            })?;
        }
        let file_config = ConfigFile {
            image_dir: Some(self.image_dir.clone()),
            keep_count: Some(self.keep_count),
            extensions: Some(self.filter.extensions.clone()),
            case_sensitive: Some(self.filter.case_sensitive),
            max_depth: Some(self.max_depth),
            parallel: Some(self.parallel),
            deadline: self
                .deadline
                .map(|d| humantime::format_duration(d).to_string()),
        };
        let serialized = toml::to_string_pretty(&file_config)
            .map_err(|err| Error::InvalidConfig(format!("failed to serialize config: {err}")))?;
        fs::write(path, serialized)
            .map_err(|err| Error::InvalidConfig(format!("failed to write config: {err}")))?;
        Ok(())
    }

    pub fn aggregator(&self) -> ImageAggregator {
        let scanner = DirectoryScanner::new(self.filter.clone()).with_max_depth(self.max_depth);
        ImageAggregator::new(self.image_dir.clone(), self.keep_count)
            .with_scanner(scanner)
            .parallel(self.parallel)
            .deadline(self.deadline)
    }

    pub fn doctor(&self) -> ConfigDoctor {
        let source = if ENV_KEYS.iter().any(|key| std::env::var(key).is_ok()) {
            "environment".to_string()
        } else {
            "config file / defaults".to_string()
        };
        ConfigDoctor {
            image_dir: self.image_dir.clone(),
            image_dir_exists: self.image_dir.is_dir(),
            keep_count: self.keep_count,
            extensions: self.filter.extensions.clone(),
            case_sensitive: self.filter.case_sensitive,
            max_depth: self.max_depth,
            parallel: self.parallel,
            deadline: self
                .deadline
                .map(|d| humantime::format_duration(d).to_string()),
            config_file: self.source_file.clone(),
            source,
        }
    }
}

fn parse_file(contents: &str) -> Result<ConfigFile> {
    toml::from_str::<ConfigFile>(contents)
        .map_err(|err| Error::InvalidConfig(format!("config parse error: {err}")))
}

fn parse_env<T>(key: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|err| Error::InvalidConfig(format!("{key}={raw}: {err}")))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::InvalidConfig(format!(
            "{key}={other}: expected true or false"
        ))),
    }
}

pub fn parse_deadline(raw: &str) -> Result<Duration> {
    humantime::parse_duration(raw.trim())
        .map_err(|err| Error::InvalidConfig(format!("invalid deadline {raw:?}: {err}")))
}

pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("skyfeed").join("config.toml"))
}
