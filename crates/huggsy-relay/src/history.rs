//! Bounded, durable event history.
//!
//! The full history is kept in memory and rewritten to a single JSON file on
//! every append. Writes go to a temp file first and are renamed into place,
//! so a crash mid-write leaves the previous file intact.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::RelayError;
use crate::record::EventRecord;

/// Default number of records retained.
pub const DEFAULT_HISTORY_LIMIT: usize = 500;

/// File name of the persisted history inside the data directory.
pub const HISTORY_FILE_NAME: &str = "messages.json";

/// Append-only log of the most recent records.
#[derive(Debug)]
pub struct HistoryStore {
    path: PathBuf,
    limit: usize,
    records: RwLock<VecDeque<EventRecord>>,
    /// Serializes file writes so they land in append order.
    write_lock: Mutex<()>,
    durable: AtomicBool,
}

impl HistoryStore {
    /// Open the store at `path`, loading any previously persisted records.
    ///
    /// Never fails: an unreadable or corrupt file is logged and treated as an
    /// empty history.
    pub async fn open(path: impl Into<PathBuf>, limit: usize) -> Self {
        let path = path.into();
        let limit = limit.max(1);

        let mut records = VecDeque::from(Self::load(&path).await);
        while records.len() > limit {
            records.pop_front();
        }

        info!(path = %path.display(), records = records.len(), "history loaded");

        Self {
            path,
            limit,
            records: RwLock::new(records),
            write_lock: Mutex::new(()),
            durable: AtomicBool::new(true),
        }
    }

    /// Read persisted records from `path`.
    ///
    /// A missing file yields an empty history; so does any read or parse error.
    pub async fn load(path: &Path) -> Vec<EventRecord> {
        match Self::try_load(path).await {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, path = %path.display(), "failed to load history, starting empty");
                Vec::new()
            }
        }
    }

    async fn try_load(path: &Path) -> Result<Vec<EventRecord>, RelayError> {
        if !fs::try_exists(path).await? {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(path).await?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Append a record, evicting the oldest past the limit, and persist.
    ///
    /// Persistence failures are logged and swallowed; the in-memory history
    /// stays authoritative and the next successful append repairs the file.
    pub async fn append(&self, record: EventRecord) {
        let _write = self.write_lock.lock().await;

        let serialized = {
            let mut records = self.records.write().await;
            records.push_back(record);
            while records.len() > self.limit {
                records.pop_front();
            }
            serde_json::to_vec_pretty(&*records)
        };

        let result = match serialized {
            Ok(content) => self.persist(&content).await,
            Err(e) => Err(e.into()),
        };

        match result {
            Ok(()) => {
                if !self.durable.swap(true, Ordering::SeqCst) {
                    info!(path = %self.path.display(), "history persistence recovered");
                }
            }
            Err(e) => {
                self.durable.store(false, Ordering::SeqCst);
                warn!(error = %e, path = %self.path.display(), "failed to persist history");
            }
        }
    }

    /// Copy of the current history, oldest first.
    pub async fn snapshot(&self) -> Vec<EventRecord> {
        self.records.read().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the most recent append reached disk.
    pub fn is_durable(&self) -> bool {
        self.durable.load(Ordering::SeqCst)
    }

    async fn persist(&self, content: &[u8]) -> Result<(), RelayError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(content).await?;
        file.sync_all().await?;

        fs::rename(&temp_path, &self.path).await?;
        debug!(path = %self.path.display(), bytes = content.len(), "history persisted");

        Ok(())
    }
}
