use crate::error::{Problem, ValidationError};
use crate::key::SeriesKey;
use bench_history_model::{
    parse_range, BenchmarkEntry, Commit, RawBench, RawCommit, RawRun, RunRecord,
};
use std::collections::HashSet;
use std::sync::Arc;

/// A validated run, ready to be appended to the history store
#[derive(Debug, Clone, PartialEq)]
pub struct Run {
    pub tool: String,
    pub commit: Arc<Commit>,
    /// Unix timestamp in milliseconds
    pub run_timestamp: i64,
    /// Entries in the order they were submitted, names are unique
    pub entries: Vec<BenchmarkEntry>,
}

impl Run {
    /// The series each entry of this run belongs to, in entry order
    pub fn series_keys(&self) -> impl Iterator<Item = SeriesKey> + '_ {
        self.entries
            .iter()
            .map(|entry| SeriesKey::new(self.tool.clone(), entry.name.clone()))
    }

    /// The persisted form of this run
    pub fn to_record(&self) -> RunRecord {
        RunRecord {
            commit: self.commit.as_ref().clone(),
            date: self.run_timestamp,
            tool: self.tool.clone(),
            benches: self.entries.iter().map(|e| e.to_record()).collect(),
        }
    }
}

/// Validate a run payload and turn it into a [Run]
///
/// The run is the unit of validation, the first malformed field rejects the whole run.
pub fn normalize(raw: &RawRun) -> Result<Run, ValidationError> {
    let tool = required_text(raw.tool.as_deref(), "tool")?;
    let commit = normalize_commit(raw.commit.as_ref())?;

    let run_timestamp = raw
        .date
        .ok_or_else(|| ValidationError::run_field("date", Problem::Missing))?;
    if run_timestamp < 0 {
        return Err(ValidationError::run_field("date", Problem::Negative));
    }

    let benches = raw
        .benches
        .as_ref()
        .ok_or_else(|| ValidationError::run_field("benches", Problem::Missing))?;
    if benches.is_empty() {
        return Err(ValidationError::run_field("benches", Problem::Empty));
    }

    let mut seen_names = HashSet::with_capacity(benches.len());
    let mut entries = Vec::with_capacity(benches.len());
    for (index, bench) in benches.iter().enumerate() {
        let entry = normalize_bench(index, bench)?;
        if !seen_names.insert(entry.name.clone()) {
            return Err(ValidationError::bench_field(
                "name",
                index,
                Some(&entry.name),
                Problem::Duplicate,
            ));
        }
        entries.push(entry);
    }

    Ok(Run {
        tool,
        commit: Arc::new(commit),
        run_timestamp,
        entries,
    })
}

fn normalize_commit(raw: Option<&RawCommit>) -> Result<Commit, ValidationError> {
    let raw = raw.ok_or_else(|| ValidationError::run_field("commit", Problem::Missing))?;

    let id = required_text(raw.id.as_deref(), "commit.id")?;
    let timestamp = required_text(raw.timestamp.as_deref(), "commit.timestamp")?;
    chrono::DateTime::parse_from_rfc3339(&timestamp).map_err(|e| {
        ValidationError::run_field("commit.timestamp", Problem::Unparseable(e.to_string()))
    })?;

    Ok(Commit {
        author: raw.author.clone(),
        committer: raw.committer.clone(),
        distinct: raw.distinct,
        id,
        message: raw.message.clone().unwrap_or_default(),
        timestamp,
        tree_id: raw.tree_id.clone(),
        url: raw.url.clone(),
    })
}

fn normalize_bench(index: usize, raw: &RawBench) -> Result<BenchmarkEntry, ValidationError> {
    let name = match raw.name.as_deref().map(str::trim) {
        None => {
            return Err(ValidationError::bench_field(
                "name",
                index,
                None,
                Problem::Missing,
            ))
        }
        Some("") => {
            return Err(ValidationError::bench_field(
                "name",
                index,
                None,
                Problem::Empty,
            ))
        }
        Some(name) => name.to_string(),
    };
    let invalid = |field: &'static str, problem: Problem| {
        ValidationError::bench_field(field, index, Some(&name), problem)
    };

    let value = raw.value.ok_or_else(|| invalid("value", Problem::Missing))?;
    check_magnitude(value).map_err(|problem| invalid("value", problem))?;

    let range_display = raw
        .range
        .as_deref()
        .ok_or_else(|| invalid("range", Problem::Missing))?;
    let range = parse_range(range_display)
        .ok_or_else(|| invalid("range", Problem::Unparseable(range_display.to_string())))?;
    check_magnitude(range).map_err(|problem| invalid("range", problem))?;

    let unit = match raw.unit.as_deref().map(str::trim) {
        None => return Err(invalid("unit", Problem::Missing)),
        Some("") => return Err(invalid("unit", Problem::Empty)),
        Some(unit) => unit.to_string(),
    };

    Ok(BenchmarkEntry {
        name,
        value,
        range,
        unit,
        extra: raw.extra.clone(),
    })
}

fn check_magnitude(value: f64) -> Result<(), Problem> {
    if !value.is_finite() {
        Err(Problem::NotFinite)
    } else if value < 0.0 {
        Err(Problem::Negative)
    } else {
        Ok(())
    }
}

fn required_text(value: Option<&str>, field: &'static str) -> Result<String, ValidationError> {
    match value.map(str::trim) {
        None => Err(ValidationError::run_field(field, Problem::Missing)),
        Some("") => Err(ValidationError::run_field(field, Problem::Empty)),
        Some(value) => Ok(value.to_string()),
    }
}
