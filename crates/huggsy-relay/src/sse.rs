//! Server-Sent Events for live updates.

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use tokio_stream::StreamExt;
use tracing::warn;

use crate::hub::Subscription;
use crate::record::EventRecord;

/// Comment text sent on every keepalive tick.
pub const KEEPALIVE_TEXT: &str = "keepalive";

/// Create an SSE stream from a hub subscription.
///
/// Each record becomes one unnamed `data:` frame holding its JSON encoding.
/// Dropping the response body (client gone, or a write failed) drops the
/// subscription, which unsubscribes it.
pub fn create_sse_stream(
    subscription: Subscription,
    keepalive: Duration,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let stream = subscription.filter_map(|record| record_event(&record).map(Ok));

    Sse::new(stream).keep_alive(KeepAlive::new().interval(keepalive).text(KEEPALIVE_TEXT))
}

fn record_event(record: &EventRecord) -> Option<Event> {
    match Event::default().json_data(record) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(error = %e, kind = %record.kind, "failed to encode record for stream");
            None
        }
    }
}
