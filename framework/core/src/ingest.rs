use crate::alert::{evaluate_verdicts, EntryVerdict, RegressionAlert};
use crate::error::{AppendError, IngestError};
use crate::key::SeriesKey;
use crate::normalize::{normalize, Run};
use crate::policy::PolicySet;
use crate::store::HistoryStore;
use bench_history_model::RawRun;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "camelCase")]
pub enum RejectionReason {
    #[display("duplicate commit")]
    DuplicateCommit,
    #[display("out of order")]
    OutOfOrder,
    #[display("storage failure")]
    Storage,
}

/// An entry of the run that was not appended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedEntry {
    #[serde(flatten)]
    pub key: SeriesKey,
    pub reason: RejectionReason,
    pub message: String,
}

impl From<&AppendError> for RejectedEntry {
    fn from(e: &AppendError) -> Self {
        let (reason, message) = match e {
            AppendError::DuplicateCommit { .. } => (RejectionReason::DuplicateCommit, e.to_string()),
            AppendError::OutOfOrder { .. } => (RejectionReason::OutOfOrder, e.to_string()),
            AppendError::Storage { source, .. } => {
                (RejectionReason::Storage, format!("{e}: {source}"))
            }
        };

        Self {
            key: e.key().clone(),
            reason,
            message,
        }
    }
}

/// What happened to one submitted run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    /// Identifies the submitted payload, see [RawRun::fingerprint]
    pub fingerprint: String,
    pub tool: String,
    pub commit_id: String,
    pub run_timestamp: i64,
    pub appended: Vec<SeriesKey>,
    pub rejected: Vec<RejectedEntry>,
    /// One per appended entry, in entry order
    pub verdicts: Vec<EntryVerdict>,
    pub alerts: Vec<RegressionAlert>,
}

impl IngestReport {
    pub fn has_alerts(&self) -> bool {
        !self.alerts.is_empty()
    }
}

/// Validate a run, append its entries and evaluate the ones that were appended
///
/// Nothing is written if the run is invalid or a policy cannot be resolved for one of its
/// entries. Entries that cannot be appended are reported and do not stop the others.
pub fn ingest(
    raw: &RawRun,
    store: &HistoryStore,
    policies: &PolicySet,
) -> Result<IngestReport, IngestError> {
    policies.validate()?;
    let run = normalize(raw)?;
    for key in run.series_keys() {
        policies.resolve(&key)?;
    }

    let mut appended = Vec::with_capacity(run.entries.len());
    let mut rejected = Vec::new();
    for (entry, result) in run.entries.iter().zip(store.append_run(&run)) {
        match result {
            Ok(_) => appended.push(entry.clone()),
            Err(e) => {
                log::warn!("Rejected entry for commit {}: {}", run.commit.id, e);
                rejected.push(RejectedEntry::from(&e));
            }
        }
    }

    let appended_run = Run {
        entries: appended,
        ..run.clone()
    };
    let verdicts = evaluate_verdicts(&appended_run, store, policies)?;
    let alerts = verdicts
        .iter()
        .filter_map(EntryVerdict::alert)
        .collect::<Vec<_>>();

    log::info!(
        "Ingested {} run for commit {}: {} appended, {} rejected, {} alerts",
        run.tool,
        run.commit.id,
        appended_run.entries.len(),
        rejected.len(),
        alerts.len()
    );

    Ok(IngestReport {
        fingerprint: raw.fingerprint(),
        tool: run.tool.clone(),
        commit_id: run.commit.id.clone(),
        run_timestamp: run.run_timestamp,
        appended: appended_run.series_keys().collect(),
        rejected,
        verdicts,
        alerts,
    })
}
