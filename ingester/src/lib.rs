use anyhow::Context;
use bench_history_core::prelude::*;
use bench_history_model::{load_raw_runs, RawRun};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod table;

/// Environment variable name to set the history directory
pub const HISTORY_DIR_ENV: &str = "BENCH_HISTORY_DIR";
/// Default directory the history is stored in
pub const DEFAULT_HISTORY_DIR: &str = "bench-history";
/// Environment variable that, when set, stops regressions from failing the process
pub const IGNORE_REGRESSIONS_ENV: &str = "IGNORE_REGRESSIONS";

/// Alert threshold used when no policy file is given, a measurement twice as bad as its baseline
pub const DEFAULT_ALERT_THRESHOLD: f64 = 1.0;

/// Open the history stored in `dir`, creating the directory if needed
pub fn open_store(dir: &Path) -> anyhow::Result<HistoryStore> {
    let backend = DirectoryBackend::new(dir)
        .with_context(|| format!("Cannot use history directory {}", dir.display()))?;
    HistoryStore::open(Arc::new(backend))
        .with_context(|| format!("Failed to load history from {}", dir.display()))
}

/// Load policies from a TOML file, or fall back to the default policy for every series
pub fn load_policies(path: Option<&Path>) -> anyhow::Result<PolicySet> {
    match path {
        Some(path) => PolicySet::load(path)
            .with_context(|| format!("Invalid policy file {}", path.display())),
        None => {
            log::info!(
                "No policy file given, alerting on any series that gets {}% worse",
                DEFAULT_ALERT_THRESHOLD * 100.0
            );
            Ok(PolicySet::uniform(DetectorPolicy::new(
                DEFAULT_ALERT_THRESHOLD,
                Direction::HigherIsWorse,
            )))
        }
    }
}

/// Load every run payload from the given files, in file order
pub fn load_runs(paths: &[PathBuf]) -> anyhow::Result<Vec<RawRun>> {
    let mut raw_runs = Vec::new();
    for path in paths {
        log::debug!("Loading runs from {}", path.display());
        let runs = load_raw_runs(path.clone())
            .with_context(|| format!("Failed to load runs from {}", path.display()))?;
        raw_runs.extend(runs);
    }
    Ok(raw_runs)
}

/// The result of ingesting a batch of runs
#[derive(Debug, Default)]
pub struct BatchOutcome {
    /// Reports for the runs that were ingested, in submission order
    pub reports: Vec<IngestReport>,
    /// Runs that were rejected as a whole
    pub errors: Vec<anyhow::Error>,
}

impl BatchOutcome {
    pub fn total_runs(&self) -> usize {
        self.reports.len() + self.errors.len()
    }

    pub fn alerts(&self) -> impl Iterator<Item = &RegressionAlert> {
        self.reports.iter().flat_map(|report| report.alerts.iter())
    }
}

/// Ingest runs one after the other
///
/// A run that fails does not stop the ones after it.
pub fn ingest_runs(raw_runs: &[RawRun], store: &HistoryStore, policies: &PolicySet) -> BatchOutcome {
    let mut outcome = BatchOutcome::default();
    for raw in raw_runs {
        match ingest(raw, store, policies) {
            Ok(report) => outcome.reports.push(report),
            Err(e) => {
                log::error!("Failed to ingest run {}: {}", raw.fingerprint(), e);
                outcome.errors.push(
                    anyhow::Error::from(e).context(format!("Run {}", raw.fingerprint())),
                );
            }
        }
    }
    outcome
}

/// The file name a report is written to
pub fn report_file_name(report: &IngestReport) -> String {
    let tool: String = report
        .tool
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("ingest-report-{}-{}.json", tool, report.fingerprint)
}

/// Write a report as JSON into `dir`
pub fn write_report(report: &IngestReport, dir: &Path) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Cannot create report directory {}", dir.display()))?;
    let path = dir.join(report_file_name(report));
    let file = File::create(&path)
        .with_context(|| format!("Cannot create report file {}", path.display()))?;
    serde_json::to_writer_pretty(file, report)?;
    Ok(path)
}
