//! Live event relay for the Huggsy companion UI.
//!
//! This crate receives events from the toy's voice pipeline and:
//! - Appends them to a bounded history persisted on disk
//! - Fans them out live to every connected viewer over Server-Sent Events
//! - Serves the history so viewers can catch up after a reconnect

mod error;
mod history;
mod hub;
mod record;
mod relay;
mod routes;
mod sse;

pub use error::RelayError;
pub use history::{DEFAULT_HISTORY_LIMIT, HISTORY_FILE_NAME, HistoryStore};
pub use hub::{BroadcastHub, DEFAULT_SUBSCRIBER_BUFFER, SubscriberId, Subscription};
pub use record::{CONNECTED_PAYLOAD, EventKind, EventRecord, current_timestamp};
pub use relay::{DEFAULT_KEEPALIVE, Relay, RelayConfig};
pub use routes::create_router;
