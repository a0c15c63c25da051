use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for an aggregation run.
///
/// Only conditions that stop bucket paths from being computed live here.
/// Missing or unreadable directories are reported as [`crate::models::ScanIssue`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("clock unavailable: {0}")]
    Clock(String),
    #[error("instant {instant} cannot be shifted back by {offset}")]
    TimeOutOfRange { instant: String, offset: String },
}

impl Error {
    pub(crate) fn out_of_range(instant: impl ToString, offset: chrono::TimeDelta) -> Self {
        Error::TimeOutOfRange {
            instant: instant.to_string(),
            offset: format!("{}h", offset.num_hours()),
        }
    }
}
