use crate::range::{format_range, parse_range};
use serde::{Deserialize, Serialize};

/// A commit author or committer
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Person {
    pub email: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// The source state a run was built from
///
/// Supplied by the caller and never derived or modified by the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Commit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<Person>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub committer: Option<Person>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distinct: Option<bool>,
    /// The commit hash, which is also the idempotency key for appends to a series
    pub id: String,
    #[serde(default)]
    pub message: String,
    /// ISO-8601 timestamp, kept exactly as supplied
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tree_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// One validated measurement
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkEntry {
    pub name: String,
    pub value: f64,
    /// Numeric magnitude of the uncertainty around `value`
    pub range: f64,
    pub unit: String,
    pub extra: Option<String>,
}

impl BenchmarkEntry {
    /// Convert to the persisted form, formatting the range for display
    pub fn to_record(&self) -> BenchRecord {
        BenchRecord {
            name: self.name.clone(),
            value: self.value,
            range: format_range(self.range),
            unit: self.unit.clone(),
            extra: self.extra.clone(),
        }
    }
}

/// One measurement as the dashboard stores it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BenchRecord {
    pub name: String,
    pub value: f64,
    pub range: String,
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<String>,
}

impl BenchRecord {
    /// Read the persisted form back into an entry
    ///
    /// A range that cannot be parsed is treated as zero, persisted data is never rejected here.
    pub fn to_entry(&self) -> BenchmarkEntry {
        BenchmarkEntry {
            name: self.name.clone(),
            value: self.value,
            range: parse_range(&self.range).unwrap_or_default(),
            unit: self.unit.clone(),
            extra: self.extra.clone(),
        }
    }
}

/// One run as the dashboard stores it, with its commit and the benches recorded for it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunRecord {
    pub commit: Commit,
    /// The time the run happened
    ///
    /// This is a Unix timestamp in milliseconds.
    pub date: i64,
    pub tool: String,
    pub benches: Vec<BenchRecord>,
}

impl RunRecord {
    /// Find the bench with the given name in this run
    pub fn bench(&self, name: &str) -> Option<&BenchRecord> {
        self.benches.iter().find(|bench| bench.name == name)
    }
}
