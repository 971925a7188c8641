//! Append-only benchmark history with regression detection.
//!
//! A submitted run is validated by [normalize](prelude::normalize), appended entry by entry to the
//! [HistoryStore](prelude::HistoryStore) and then every appended entry is compared against its
//! baseline by the [Detector](prelude::Detector). [ingest](prelude::ingest) does all of that in one
//! call.

mod alert;
mod detect;
mod error;
mod ingest;
mod key;
mod normalize;
mod policy;
mod store;

pub mod prelude {
    pub use crate::alert::{evaluate, evaluate_verdicts, EntryOutcome, EntryVerdict, RegressionAlert};
    pub use crate::detect::{detect, Comparison, Detector, IndeterminateReason, Verdict};
    pub use crate::error::{
        AppendError, ConfigurationError, EntryRef, IngestError, Problem, StorageError,
        ValidationError,
    };
    pub use crate::ingest::{ingest, IngestReport, RejectedEntry, RejectionReason};
    pub use crate::key::SeriesKey;
    pub use crate::normalize::{normalize, Run};
    pub use crate::policy::{BenchmarkPolicy, DetectorPolicy, Direction, PolicyOverride, PolicySet};
    pub use crate::store::{
        AppendResult, DirectoryBackend, DynHistoryBackend, History, HistoryBackend, HistoryRecord,
        HistoryStore, ImportSummary, MemoryBackend, Series,
    };
}
