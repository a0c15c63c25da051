use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use strum::{AsRefStr, Display, EnumIter, EnumString};

pub const DEFAULT_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Day/night split of the archive. The name doubles as the directory name.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TimePartition {
    Day,
    Night,
}

/// Identifies one hour bucket: `<date>/<partition>/<dd_HH>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct BucketKey {
    pub date: NaiveDate,
    pub partition: TimePartition,
    /// `DD_HH` of the unadjusted reference instant.
    pub hour_slot: String,
}

impl BucketKey {
    pub fn date_str(&self) -> String {
        self.date.format("%Y%m%d").to_string()
    }

    pub fn dir_in(&self, base_dir: &Path) -> PathBuf {
        base_dir
            .join(self.date_str())
            .join(self.partition.as_ref())
            .join(&self.hour_slot)
    }
}

/// A matched image file and the modification time read while scanning it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageRecord {
    pub path: PathBuf,
    #[serde(serialize_with = "serialize_system_time")]
    pub modified: SystemTime,
}

/// Accepted file name suffixes, tested in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionFilter {
    pub extensions: Vec<String>,
    pub case_sensitive: bool,
}

impl Default for ExtensionFilter {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            case_sensitive: true,
        }
    }
}

impl ExtensionFilter {
    pub fn new<I, S>(extensions: I, case_sensitive: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(Into::<String>::into)
                .map(|e| e.trim_start_matches('.').to_string())
                .filter(|e| !e.is_empty())
                .collect(),
            case_sensitive,
        }
    }

    /// Returns the first extension that `file_name` ends with, if any.
    pub fn matches(&self, file_name: &str) -> Option<&str> {
        if self.case_sensitive {
            return self
                .extensions
                .iter()
                .find(|ext| has_suffix(file_name, ext))
                .map(String::as_str);
        }
        let lowered = file_name.to_ascii_lowercase();
        self.extensions
            .iter()
            .find(|ext| has_suffix(&lowered, &ext.to_ascii_lowercase()))
            .map(String::as_str)
    }
}

fn has_suffix(file_name: &str, ext: &str) -> bool {
    file_name
        .strip_suffix(ext)
        .is_some_and(|stem| stem.ends_with('.'))
}

/// Non-fatal condition hit while scanning a bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanIssue {
    MissingDirectory { path: PathBuf },
    UnreadableEntry { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    pub records: Vec<ImageRecord>,
    pub issues: Vec<ScanIssue>,
}

impl ScanOutcome {
    pub fn append(&mut self, mut other: ScanOutcome) {
        self.records.append(&mut other.records);
        self.issues.append(&mut other.issues);
    }
}

/// Result of one aggregation run, oldest path first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LatestImages {
    pub paths: Vec<PathBuf>,
    /// Number of records found before truncation.
    pub scanned: usize,
    pub issues: Vec<ScanIssue>,
    /// False when some bucket scans never reported back, usually a deadline.
    pub complete: bool,
}

pub fn format_system_time(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn serialize_system_time<S: Serializer>(
    time: &SystemTime,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_system_time(*time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn partition_names_are_lowercase() {
        assert_eq!(TimePartition::Day.to_string(), "day");
        assert_eq!(TimePartition::Night.as_ref(), "night");
        assert_eq!(
            TimePartition::from_str("night").unwrap(),
            TimePartition::Night
        );
    }

    #[test]
    fn default_filter_is_case_sensitive() {
        let filter = ExtensionFilter::default();
        assert_eq!(filter.matches("a.jpg"), Some("jpg"));
        assert_eq!(filter.matches("a.jpeg"), Some("jpeg"));
        assert_eq!(filter.matches("c.PNG"), None);
        assert_eq!(filter.matches("b.txt"), None);
    }

    #[test]
    fn suffix_must_follow_a_dot() {
        let filter = ExtensionFilter::default();
        assert_eq!(filter.matches("notajpg"), None);
        assert_eq!(filter.matches("archive.jpg.png"), Some("png"));
    }

    #[test]
    fn first_listed_extension_wins() {
        let filter = ExtensionFilter::new(["peg", "jpeg"], true);
        assert_eq!(filter.matches("x.jpeg"), Some("jpeg"));
    }

    #[test]
    fn leading_dots_are_stripped() {
        let filter = ExtensionFilter::new([".jpg", ""], true);
        assert_eq!(filter.extensions, vec!["jpg".to_string()]);
    }

    #[test]
    fn case_insensitive_filter_accepts_upper_case() {
        let filter = ExtensionFilter::new(DEFAULT_EXTENSIONS, false);
        assert_eq!(filter.matches("c.PNG"), Some("png"));
    }

    #[test]
    fn bucket_key_builds_nested_path() {
        let key = BucketKey {
            date: NaiveDate::from_ymd_opt(2024, 3, 9).unwrap(),
            partition: TimePartition::Night,
            hour_slot: "10_02".into(),
        };
        assert_eq!(
            key.dir_in(Path::new("images")),
            Path::new("images").join("20240309").join("night").join("10_02")
        );
    }

    #[test]
    fn scan_issue_serializes_with_kind() {
        let issue = ScanIssue::MissingDirectory {
            path: PathBuf::from("images/x"),
        };
        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["kind"], "missing_directory");
        assert_eq!(json["path"], "images/x");
    }
}
