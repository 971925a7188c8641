use crate::key::SeriesKey;
use std::fmt::{Display, Formatter};

/// Which bench in a run payload a validation problem was found in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRef {
    /// Position of the bench in the payload, starting from 0
    pub index: usize,
    pub name: Option<String>,
}

impl Display for EntryRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "bench #{} ({})", self.index, name),
            None => write!(f, "bench #{}", self.index),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum Problem {
    #[display("is missing")]
    Missing,
    #[display("must not be empty")]
    Empty,
    #[display("must be a finite number")]
    NotFinite,
    #[display("must not be negative")]
    Negative,
    #[display("could not be parsed ({_0})")]
    Unparseable(String),
    #[display("repeats the name of an earlier bench in the same run")]
    Duplicate,
}

/// A run payload was rejected as a whole
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid run, `{field}`{} {problem}", entry_suffix(.entry))]
pub struct ValidationError {
    /// Path of the offending field in the payload, for example `commit.id` or `unit`
    pub field: &'static str,
    /// The bench the field belongs to, if it is a bench field
    pub entry: Option<EntryRef>,
    pub problem: Problem,
}

fn entry_suffix(entry: &Option<EntryRef>) -> String {
    entry
        .as_ref()
        .map(|entry| format!(" of {entry}"))
        .unwrap_or_default()
}

impl ValidationError {
    pub(crate) fn run_field(field: &'static str, problem: Problem) -> Self {
        Self {
            field,
            entry: None,
            problem,
        }
    }

    pub(crate) fn bench_field(
        field: &'static str,
        index: usize,
        name: Option<&str>,
        problem: Problem,
    ) -> Self {
        Self {
            field,
            entry: Some(EntryRef {
                index,
                name: name.map(|n| n.to_string()),
            }),
            problem,
        }
    }
}

/// The durable storage behind the history store failed
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serde JSON error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// An append to a series was rejected
///
/// The history of the series is unchanged whenever this is returned.
#[derive(Debug, thiserror::Error)]
pub enum AppendError {
    #[error("Series {key} already has a record for commit {commit_id}")]
    DuplicateCommit { key: SeriesKey, commit_id: String },
    #[error(
        "Run timestamp {run_timestamp} for series {key} is earlier than its last run timestamp {last_run_timestamp}"
    )]
    OutOfOrder {
        key: SeriesKey,
        run_timestamp: i64,
        last_run_timestamp: i64,
    },
    #[error("Failed to persist a record for series {key}")]
    Storage {
        key: SeriesKey,
        #[source]
        source: StorageError,
    },
}

impl AppendError {
    pub fn key(&self) -> &SeriesKey {
        match self {
            AppendError::DuplicateCommit { key, .. }
            | AppendError::OutOfOrder { key, .. }
            | AppendError::Storage { key, .. } => key,
        }
    }
}

/// The detector policy cannot be used
///
/// This is fatal to a whole evaluation, no entry is evaluated with a policy that failed to
/// resolve.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("No direction configured for {scope}")]
    MissingDirection { scope: String },
    #[error("No alert threshold configured for {scope}")]
    MissingThreshold { scope: String },
    #[error("Threshold {value} for {scope} must be a finite, non-negative number")]
    InvalidThreshold { scope: String, value: f64 },
    #[error("Rolling window for {scope} must be at least 1")]
    InvalidRollingWindow { scope: String },
    #[error("Failed to read policy file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse policy file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// A whole ingestion call failed before anything was written
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_names_field_and_entry() {
        let err = ValidationError::bench_field("unit", 2, Some("fibonacci"), Problem::Empty);
        assert_eq!(
            err.to_string(),
            "Invalid run, `unit` of bench #2 (fibonacci) must not be empty"
        );
    }

    #[test]
    fn validation_message_for_run_field() {
        let err = ValidationError::run_field("commit.id", Problem::Missing);
        assert_eq!(err.to_string(), "Invalid run, `commit.id` is missing");
    }

    #[test]
    fn append_error_exposes_key() {
        let err = AppendError::DuplicateCommit {
            key: SeriesKey::new("cargo", "gcd"),
            commit_id: "abc".to_string(),
        };
        assert_eq!(err.key(), &SeriesKey::new("cargo", "gcd"));
        assert_eq!(
            err.to_string(),
            "Series cargo/gcd already has a record for commit abc"
        );
    }
}
