//! The append-only history of every series.

use crate::error::{AppendError, StorageError};
use crate::key::SeriesKey;
use crate::normalize::{normalize, Run};
use bench_history_model::{BenchmarkData, BenchmarkEntry, Commit, RawRun, RunRecord};
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

mod backend;


pub use backend::{DirectoryBackend, DynHistoryBackend, HistoryBackend, MemoryBackend};

/// One point in a series
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    /// Shared by every record that came from the same run
    pub commit: Arc<Commit>,
    pub entry: BenchmarkEntry,
    /// Unix timestamp in milliseconds
    pub run_timestamp: i64,
}

type Records = Arc<Vec<Arc<HistoryRecord>>>;

/// A read-only snapshot of one series, as of the time it was taken
///
/// Appends made after the snapshot was taken are not visible through it.
#[derive(Debug, Clone)]
pub struct History {
    key: SeriesKey,
    records: Records,
}

impl History {
    fn empty(key: SeriesKey) -> Self {
        Self {
            key,
            records: Arc::new(Vec::with_capacity(0)),
        }
    }

    pub fn key(&self) -> &SeriesKey {
        &self.key
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records from oldest to newest
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &HistoryRecord> + ExactSizeIterator + '_ {
        self.records.iter().map(|record| record.as_ref())
    }

    pub fn get(&self, index: usize) -> Option<&HistoryRecord> {
        self.records.get(index).map(|record| record.as_ref())
    }

    pub fn last(&self) -> Option<&HistoryRecord> {
        self.records.last().map(|record| record.as_ref())
    }

    /// Index of the record for a commit, if the series has one
    pub fn position(&self, commit_id: &str) -> Option<usize> {
        self.records
            .iter()
            .position(|record| record.commit.id == commit_id)
    }
}

/// A series and the lock that serializes appends to it
#[derive(Debug)]
pub struct Series {
    key: SeriesKey,
    append_lock: Mutex<()>,
    records: RwLock<Records>,
}

impl Series {
    fn new(key: SeriesKey, records: Vec<Arc<HistoryRecord>>) -> Self {
        Self {
            key,
            append_lock: Mutex::new(()),
            records: RwLock::new(Arc::new(records)),
        }
    }

    pub fn key(&self) -> &SeriesKey {
        &self.key
    }

    /// Take a snapshot of the series
    pub fn history(&self) -> History {
        History {
            key: self.key.clone(),
            records: self.records.read().clone(),
        }
    }
}

/// A successful append
#[derive(Debug, Clone)]
pub struct AppendResult {
    pub record: Arc<HistoryRecord>,
    pub series: Arc<Series>,
}

/// Outcome of importing an existing history document
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub runs: usize,
    pub appended: usize,
    pub skipped: usize,
    pub invalid_runs: usize,
}

/// The history of every series, backed by durable storage
///
/// Appends to different series run independently. Appends to the same series are serialized.
/// Durable writes are made per tool, so appends to different series of the same tool take turns
/// while their tool's document is written.
#[derive(Debug)]
pub struct HistoryStore {
    backend: DynHistoryBackend,
    series: RwLock<HashMap<SeriesKey, Arc<Series>>>,
    documents: RwLock<IndexMap<String, Arc<Mutex<Vec<RunRecord>>>>>,
    last_update: AtomicI64,
}

impl HistoryStore {
    /// Open the store, rebuilding every series from what the backend has persisted
    pub fn open(backend: DynHistoryBackend) -> Result<Self, StorageError> {
        let stored = backend.load()?;

        let mut series: HashMap<SeriesKey, Vec<Arc<HistoryRecord>>> = HashMap::new();
        let mut documents: IndexMap<String, Vec<RunRecord>> = IndexMap::new();
        let mut last_update = 0;
        for (stored_tool, runs) in stored {
            for run in runs {
                if run.tool != stored_tool {
                    log::warn!(
                        "Run for commit {} was stored under `{}` but belongs to tool `{}`",
                        run.commit.id,
                        stored_tool,
                        run.tool
                    );
                }

                let commit = Arc::new(run.commit.clone());
                for bench in &run.benches {
                    let key = SeriesKey::new(run.tool.clone(), bench.name.clone());
                    let records = series.entry(key.clone()).or_default();
                    if records.iter().any(|record| record.commit.id == commit.id) {
                        log::warn!(
                            "Skipping stored duplicate of commit {} in series {}",
                            commit.id,
                            key
                        );
                        continue;
                    }
                    if let Some(last) = records.last() {
                        if run.date < last.run_timestamp {
                            log::warn!(
                                "Stored series {} goes back in time at commit {}",
                                key,
                                commit.id
                            );
                        }
                    }

                    records.push(Arc::new(HistoryRecord {
                        commit: commit.clone(),
                        entry: bench.to_entry(),
                        run_timestamp: run.date,
                    }));
                }

                last_update = last_update.max(run.date);
                documents.entry(run.tool.clone()).or_default().push(run);
            }
        }

        log::info!(
            "Opened history with {} series across {} tools",
            series.len(),
            documents.len()
        );

        Ok(Self {
            backend,
            series: RwLock::new(
                series
                    .into_iter()
                    .map(|(key, records)| (key.clone(), Arc::new(Series::new(key, records))))
                    .collect(),
            ),
            documents: RwLock::new(
                documents
                    .into_iter()
                    .map(|(tool, runs)| (tool, Arc::new(Mutex::new(runs))))
                    .collect(),
            ),
            last_update: AtomicI64::new(last_update),
        })
    }

    /// Open a store with nothing persisted behind it
    pub fn in_memory() -> Self {
        Self {
            backend: Arc::new(MemoryBackend::new()),
            series: Default::default(),
            documents: Default::default(),
            last_update: AtomicI64::new(0),
        }
    }

    /// Append a measurement to the series `(tool, entry.name)`
    ///
    /// Rejected if the series already has a record for the commit, or if `run_timestamp` is
    /// earlier than the series' last run timestamp. The record has been durably stored by the
    /// time this returns `Ok`. On any error the series is unchanged.
    pub fn append(
        &self,
        tool: &str,
        entry: BenchmarkEntry,
        commit: Arc<Commit>,
        run_timestamp: i64,
    ) -> Result<AppendResult, AppendError> {
        let key = SeriesKey::new(tool, entry.name.clone());
        let series = self.series_or_insert(&key);

        let append_guard = series.append_lock.lock();
        let current = series.records.read().clone();

        if current.iter().any(|record| record.commit.id == commit.id) {
            return Err(AppendError::DuplicateCommit {
                key,
                commit_id: commit.id.clone(),
            });
        }
        if let Some(last) = current.last() {
            if run_timestamp < last.run_timestamp {
                return Err(AppendError::OutOfOrder {
                    key,
                    run_timestamp,
                    last_run_timestamp: last.run_timestamp,
                });
            }
        }

        let record = Arc::new(HistoryRecord {
            commit,
            entry,
            run_timestamp,
        });
        if let Err(source) = self.persist(tool, &record) {
            return Err(AppendError::Storage { key, source });
        }

        // Readers holding the previous snapshot keep it, new readers see the extended one
        let mut extended = Vec::with_capacity(current.len() + 1);
        extended.extend(current.iter().cloned());
        extended.push(record.clone());
        *series.records.write() = Arc::new(extended);

        self.last_update.fetch_max(run_timestamp, Ordering::Relaxed);

        log::debug!(
            "Appended {} {} to {} for commit {}",
            record.entry.value,
            record.entry.unit,
            key,
            record.commit.id
        );

        drop(append_guard);
        Ok(AppendResult { record, series })
    }

    /// Append every entry of a run, in entry order
    ///
    /// Each entry succeeds or fails on its own.
    pub fn append_run(&self, run: &Run) -> Vec<Result<AppendResult, AppendError>> {
        run.entries
            .iter()
            .map(|entry| {
                self.append(
                    &run.tool,
                    entry.clone(),
                    run.commit.clone(),
                    run.run_timestamp,
                )
            })
            .collect()
    }

    /// A snapshot of the series `(tool, name)`, empty if nothing was ever appended to it
    pub fn history(&self, tool: &str, name: &str) -> History {
        let key = SeriesKey::new(tool, name);
        match self.series(&key) {
            Some(series) => series.history(),
            None => History::empty(key),
        }
    }

    pub fn series(&self, key: &SeriesKey) -> Option<Arc<Series>> {
        self.series.read().get(key).cloned()
    }

    /// Every series that has at least one record
    pub fn series_keys(&self) -> BTreeSet<SeriesKey> {
        self.series
            .read()
            .values()
            .filter(|series| !series.records.read().is_empty())
            .map(|series| series.key.clone())
            .collect()
    }

    /// Whether the series has a record for the commit
    ///
    /// Use this to find out whether an append with an unknown outcome went through before
    /// retrying it.
    pub fn contains(&self, tool: &str, name: &str, commit_id: &str) -> bool {
        self.history(tool, name).position(commit_id).is_some()
    }

    /// The full persisted history in the layout the dashboard reads
    ///
    /// Tools are listed in the order they were first appended to.
    pub fn dashboard_data(&self, repo_url: &str) -> BenchmarkData {
        let entries = self
            .documents
            .read()
            .iter()
            .map(|(tool, runs)| (tool.clone(), runs.lock().clone()))
            .filter(|(_, runs)| !runs.is_empty())
            .collect();

        BenchmarkData {
            last_update: self.last_update.load(Ordering::Relaxed),
            repo_url: repo_url.to_string(),
            entries,
        }
    }

    /// Append every run of an existing history document
    ///
    /// Runs are validated like new submissions. Invalid runs and rejected entries are skipped and
    /// counted, they do not stop the import.
    pub fn import(&self, data: &BenchmarkData) -> ImportSummary {
        let mut summary = ImportSummary::default();
        for record in data.runs() {
            summary.runs += 1;
            let run = match normalize(&RawRun::from(record)) {
                Ok(run) => run,
                Err(e) => {
                    log::warn!("Not importing run for commit {}: {}", record.commit.id, e);
                    summary.invalid_runs += 1;
                    continue;
                }
            };

            for result in self.append_run(&run) {
                match result {
                    Ok(_) => summary.appended += 1,
                    Err(e) => {
                        log::debug!("Skipping imported entry: {}", e);
                        summary.skipped += 1;
                    }
                }
            }
        }
        summary
    }

    fn series_or_insert(&self, key: &SeriesKey) -> Arc<Series> {
        if let Some(series) = self.series.read().get(key) {
            return series.clone();
        }

        self.series
            .write()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Series::new(key.clone(), Vec::new())))
            .clone()
    }

    fn document(&self, tool: &str) -> Arc<Mutex<Vec<RunRecord>>> {
        if let Some(document) = self.documents.read().get(tool) {
            return document.clone();
        }

        self.documents
            .write()
            .entry(tool.to_string())
            .or_default()
            .clone()
    }

    /// Add the record to its tool's document and write the document to the backend
    ///
    /// The record joins the last run record of the document when that one is for the same commit
    /// and run timestamp. Any other record starts a new run record, so walking the document in
    /// order yields every series in the order it was appended.
    fn persist(&self, tool: &str, record: &HistoryRecord) -> Result<(), StorageError> {
        let document = self.document(tool);
        let mut runs = document.lock();

        let bench = record.entry.to_record();
        let merged = runs.last().is_some_and(|run| {
            run.commit.id == record.commit.id && run.date == record.run_timestamp
        });
        if merged {
            if let Some(run) = runs.last_mut() {
                run.benches.push(bench);
            }
        } else {
            runs.push(RunRecord {
                commit: record.commit.as_ref().clone(),
                date: record.run_timestamp,
                tool: tool.to_string(),
                benches: vec![bench],
            });
        }

        if let Err(e) = self.backend.persist(tool, &runs) {
            // Undo, the record was never stored
            if merged {
                if let Some(run) = runs.last_mut() {
                    run.benches.pop();
                }
            } else {
                runs.pop();
            }
            return Err(e);
        }

        Ok(())
    }
}
