use crate::record::RunRecord;
use anyhow::Context;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// The assignment the dashboard's `data.js` file starts with
pub const DATA_JS_PREFIX: &str = "window.BENCHMARK_DATA = ";

/// The complete persisted history, as read by the dashboard
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkData {
    /// The latest run timestamp in the history
    ///
    /// This is a Unix timestamp in milliseconds.
    #[serde(default)]
    pub last_update: i64,
    #[serde(default)]
    pub repo_url: String,
    /// Run records keyed by tool
    ///
    /// Tools keep the order they were first added in, which is the order the dashboard lays them
    /// out in. Comparing two values with `==` ignores this order.
    pub entries: IndexMap<String, Vec<RunRecord>>,
}

impl BenchmarkData {
    /// All run records, tool by tool
    pub fn runs(&self) -> impl Iterator<Item = &RunRecord> {
        self.entries.values().flatten()
    }
}

/// Load the benchmark history document from a reader
///
/// Both plain JSON and the dashboard's `data.js` form, `window.BENCHMARK_DATA = {...}`, are
/// accepted.
pub fn load_benchmark_data<R: Read>(mut reader: R) -> anyhow::Result<BenchmarkData> {
    let mut content = String::new();
    reader
        .read_to_string(&mut content)
        .context("Failed to read benchmark data")?;

    let trimmed = content.trim();
    let json = trimmed
        .strip_prefix(DATA_JS_PREFIX.trim_end())
        .map(|rest| rest.trim().trim_end_matches(';'))
        .unwrap_or(trimmed);

    serde_json::from_str(json).context("Failed to parse benchmark data")
}

/// Serialize the benchmark history document to a writer
///
/// With `as_script` set, the output is the `data.js` form the dashboard loads with a script tag.
pub fn store_benchmark_data<W: Write>(
    data: &BenchmarkData,
    writer: &mut W,
    as_script: bool,
) -> anyhow::Result<()> {
    if as_script {
        writer.write_all(DATA_JS_PREFIX.as_bytes())?;
    }
    serde_json::to_writer_pretty(&mut *writer, data)?;
    if as_script {
        writer.write_all(";\n".as_bytes())?;
    }
    Ok(())
}
