//! The relay: history store and broadcast hub wired together.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::RelayError;
use crate::history::{DEFAULT_HISTORY_LIMIT, HISTORY_FILE_NAME, HistoryStore};
use crate::hub::{BroadcastHub, DEFAULT_SUBSCRIBER_BUFFER, Subscription};
use crate::record::{EventKind, EventRecord, current_timestamp};

/// Default interval between stream keepalive comments.
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(30);

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Directory holding the persisted history.
    pub data_dir: PathBuf,
    /// Maximum number of records retained.
    pub history_limit: usize,
    /// Per-subscriber channel capacity.
    pub subscriber_buffer: usize,
    pub keepalive: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            history_limit: DEFAULT_HISTORY_LIMIT,
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            keepalive: DEFAULT_KEEPALIVE,
        }
    }
}

impl RelayConfig {
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn with_subscriber_buffer(mut self, buffer: usize) -> Self {
        self.subscriber_buffer = buffer;
        self
    }

    pub fn with_keepalive(mut self, keepalive: Duration) -> Self {
        self.keepalive = keepalive;
        self
    }

    pub fn history_path(&self) -> PathBuf {
        self.data_dir.join(HISTORY_FILE_NAME)
    }
}

/// History and live fan-out for one process.
#[derive(Debug)]
pub struct Relay {
    history: HistoryStore,
    hub: BroadcastHub,
    keepalive: Duration,
    /// Held across stamp, append and publish so live order matches history order.
    ingest_lock: Mutex<()>,
}

impl Relay {
    /// Open the relay, loading persisted history.
    pub async fn open(config: &RelayConfig) -> Self {
        let history = HistoryStore::open(config.history_path(), config.history_limit).await;
        Self::new(
            history,
            BroadcastHub::new(config.subscriber_buffer),
            config.keepalive,
        )
    }

    pub fn new(history: HistoryStore, hub: BroadcastHub, keepalive: Duration) -> Self {
        Self {
            history,
            hub,
            keepalive,
            ingest_lock: Mutex::new(()),
        }
    }

    /// Accept an event from a producer.
    ///
    /// Both fields must be non-empty. The record is stamped, appended to the
    /// history and then published to live subscribers.
    pub async fn ingest(&self, kind: &str, payload: &str) -> Result<EventRecord, RelayError> {
        if kind.is_empty() || payload.is_empty() {
            return Err(RelayError::MissingField);
        }

        let _guard = self.ingest_lock.lock().await;

        let record = EventRecord {
            kind: EventKind::from(kind),
            payload: payload.to_string(),
            timestamp: current_timestamp(),
        };
        info!("{}", record.transcript_line());

        self.history.append(record.clone()).await;
        let delivered = self.hub.publish(&record);
        debug!(kind = %record.kind, delivered, "record published");

        Ok(record)
    }

    pub fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }

    pub async fn snapshot(&self) -> Vec<EventRecord> {
        self.history.snapshot().await
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn hub(&self) -> &BroadcastHub {
        &self.hub
    }

    pub fn keepalive(&self) -> Duration {
        self.keepalive
    }

    /// End every open stream.
    pub fn shutdown(&self) {
        self.hub.close_all();
    }
}
