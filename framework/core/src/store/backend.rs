use crate::error::StorageError;
use bench_history_model::RunRecord;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha3::Digest;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Durable key-value storage for the history store
///
/// The key is a tool name and the value is that tool's run records in insertion order. The store
/// only ever hands over a value that extends the previously persisted one, so backends see
/// append-only changes even though each call carries the full list.
pub trait HistoryBackend: Debug + Send + Sync {
    /// Load the run records of every tool, tools in the order they were first persisted
    fn load(&self) -> Result<IndexMap<String, Vec<RunRecord>>, StorageError>;

    /// Durably store the run records for a tool
    ///
    /// Must not return `Ok` until the records would survive a crash.
    fn persist(&self, tool: &str, runs: &[RunRecord]) -> Result<(), StorageError>;
}

/// History backend trait object.
pub type DynHistoryBackend = Arc<dyn HistoryBackend>;

/// Keeps everything in memory, for tests and for embedding the store in a short-lived process
#[derive(Debug, Default)]
pub struct MemoryBackend {
    tools: Mutex<IndexMap<String, Vec<RunRecord>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing records, as if they had been persisted before
    pub fn with_records(tools: IndexMap<String, Vec<RunRecord>>) -> Self {
        Self {
            tools: Mutex::new(tools),
        }
    }
}

impl HistoryBackend for MemoryBackend {
    fn load(&self) -> Result<IndexMap<String, Vec<RunRecord>>, StorageError> {
        Ok(self.tools.lock().clone())
    }

    fn persist(&self, tool: &str, runs: &[RunRecord]) -> Result<(), StorageError> {
        self.tools.lock().insert(tool.to_string(), runs.to_vec());
        Ok(())
    }
}

/// The on-disk document for one tool
#[derive(Debug, Serialize, Deserialize)]
struct ToolDocument {
    tool: String,
    runs: Vec<RunRecord>,
}

/// Lists tool names in the order their documents were first written
const TOOL_ORDER_FILE: &str = "tools.order";

/// Stores one JSON document per tool in a directory
///
/// Each write goes to a temporary file in the same directory which is synced and then renamed over
/// the previous document, so a crash leaves either the old or the new document in place.
#[derive(Debug)]
pub struct DirectoryBackend {
    dir: PathBuf,
    tool_order: Mutex<Vec<String>>,
}

impl DirectoryBackend {
    /// Use `dir` for storage, creating it if needed
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let order_path = dir.join(TOOL_ORDER_FILE);
        let tool_order = if order_path.is_file() {
            let file = std::fs::File::open(&order_path)?;
            serde_json::from_reader(std::io::BufReader::new(file))?
        } else {
            Vec::new()
        };

        Ok(Self {
            dir,
            tool_order: Mutex::new(tool_order),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The file a tool's document is stored in
    ///
    /// Tool names are free text, so the file name keeps only the safe characters and adds a hash
    /// of the full name to keep distinct tools apart.
    pub fn document_path(&self, tool: &str) -> PathBuf {
        let safe_name: String = tool
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let hash = format!("{:x}", sha3::Sha3_256::digest(tool.as_bytes()));

        self.dir.join(format!("{}-{}.json", safe_name, &hash[..12]))
    }
}

/// Write `value` as JSON to `path`, replacing whatever was there only once the new content is synced
fn write_atomically<T: Serialize>(
    dir: &Path,
    path: PathBuf,
    value: &T,
) -> Result<(), StorageError> {
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut file, value)?;
    file.flush()?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| StorageError::Io(e.error))?;
    Ok(())
}

impl HistoryBackend for DirectoryBackend {
    /// Tools listed in the order file come first, in that order. Documents written before the
    /// order file existed follow, sorted by tool name.
    fn load(&self) -> Result<IndexMap<String, Vec<RunRecord>>, StorageError> {
        let mut tools = BTreeMap::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }

            log::debug!("Loading history document {}", path.display());
            let file = std::fs::File::open(&path)?;
            let document: ToolDocument = serde_json::from_reader(std::io::BufReader::new(file))?;
            tools.insert(document.tool, document.runs);
        }

        let mut ordered = IndexMap::with_capacity(tools.len());
        for tool in self.tool_order.lock().iter() {
            if let Some(runs) = tools.remove(tool) {
                ordered.insert(tool.clone(), runs);
            }
        }
        ordered.extend(tools);
        Ok(ordered)
    }

    fn persist(&self, tool: &str, runs: &[RunRecord]) -> Result<(), StorageError> {
        {
            let mut tool_order = self.tool_order.lock();
            if !tool_order.iter().any(|known| known == tool) {
                tool_order.push(tool.to_string());
                if let Err(e) =
                    write_atomically(&self.dir, self.dir.join(TOOL_ORDER_FILE), &*tool_order)
                {
                    tool_order.pop();
                    return Err(e);
                }
            }
        }

        let document = ToolDocument {
            tool: tool.to_string(),
            runs: runs.to_vec(),
        };
        write_atomically(&self.dir, self.document_path(tool), &document)
    }
}
