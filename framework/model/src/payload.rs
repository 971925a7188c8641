use crate::record::{Person, RunRecord};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use sha3::Digest;

/// A run as handed over by CI, before validation
///
/// Every field is optional at this level so that a missing field can be reported by name rather
/// than as a generic deserialization failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawRun {
    /// The commit the run was built from
    pub commit: Option<RawCommit>,
    /// The time the run happened
    ///
    /// This is a Unix timestamp in milliseconds.
    pub date: Option<i64>,
    /// The benchmarking harness that produced the benches, for example `cargo`
    pub tool: Option<String>,
    /// The measurements, in the order the harness reported them
    pub benches: Option<Vec<RawBench>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawCommit {
    pub author: Option<Person>,
    pub committer: Option<Person>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distinct: Option<bool>,
    pub id: Option<String>,
    pub message: Option<String>,
    /// ISO-8601 timestamp of the commit
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tree_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawBench {
    pub name: Option<String>,
    pub value: Option<f64>,
    /// Display form of the uncertainty, usually `± N`
    pub range: Option<String>,
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<String>,
}

impl RawRun {
    /// Compute a fingerprint for this run payload
    ///
    /// The fingerprint identifies one submission of a run. It uses the
    ///     - Tool name
    ///     - Commit id
    ///     - Run timestamp
    ///     - Benchmark names, sorted
    ///
    /// The fingerprint is computed using [sha3::Sha3_256].
    pub fn fingerprint(&self) -> String {
        let mut hasher = sha3::Sha3_256::new();
        if let Some(tool) = &self.tool {
            Digest::update(&mut hasher, tool.as_bytes());
        }
        if let Some(id) = self.commit.as_ref().and_then(|c| c.id.as_ref()) {
            Digest::update(&mut hasher, id.as_bytes());
        }
        if let Some(date) = self.date {
            Digest::update(&mut hasher, date.to_le_bytes());
        }
        self.benches
            .iter()
            .flatten()
            .filter_map(|bench| bench.name.as_deref())
            .sorted()
            .for_each(|name| Digest::update(&mut hasher, name.as_bytes()));

        format!("{:x}", hasher.finalize())
    }
}

impl From<&RunRecord> for RawRun {
    /// Turn a persisted run back into a payload, so that imported history goes through the same
    /// validation as freshly submitted runs.
    fn from(record: &RunRecord) -> Self {
        let commit = &record.commit;
        RawRun {
            commit: Some(RawCommit {
                author: commit.author.clone(),
                committer: commit.committer.clone(),
                distinct: commit.distinct,
                id: Some(commit.id.clone()),
                message: Some(commit.message.clone()),
                timestamp: Some(commit.timestamp.clone()),
                tree_id: commit.tree_id.clone(),
                url: commit.url.clone(),
            }),
            date: Some(record.date),
            tool: Some(record.tool.clone()),
            benches: Some(
                record
                    .benches
                    .iter()
                    .map(|bench| RawBench {
                        name: Some(bench.name.clone()),
                        value: Some(bench.value),
                        range: Some(bench.range.clone()),
                        unit: Some(bench.unit.clone()),
                        extra: bench.extra.clone(),
                    })
                    .collect(),
            ),
        }
    }
}
