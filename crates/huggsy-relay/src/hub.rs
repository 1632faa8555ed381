//! In-process fan-out of live records to stream subscribers.
//!
//! Each subscriber owns a bounded channel. Publishing snapshots the registered
//! senders and uses `try_send`, so a slow or dead subscriber is dropped rather
//! than stalling delivery to the others.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use dashmap::DashMap;
use futures_util::Stream;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::record::EventRecord;

/// Default per-subscriber channel capacity.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;

/// Opaque subscriber identifier.
pub type SubscriberId = u64;

#[derive(Debug)]
struct HubInner {
    subscribers: DashMap<SubscriberId, mpsc::Sender<EventRecord>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl HubInner {
    fn remove(&self, id: SubscriberId, reason: &str) -> bool {
        let removed = self.subscribers.remove(&id).is_some();
        if removed {
            debug!(
                subscriber = id,
                reason,
                remaining = self.subscribers.len(),
                "subscriber removed"
            );
        }
        removed
    }
}

/// Registry of live subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastHub {
    inner: Arc<HubInner>,
}

impl BroadcastHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                subscribers: DashMap::new(),
                next_id: AtomicU64::new(1),
                buffer: buffer.max(1),
            }),
        }
    }

    /// Register a new subscriber.
    ///
    /// The returned subscription already holds a `connected` record; it is
    /// queued for this subscriber only and never stored or broadcast.
    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.inner.buffer);

        // Fresh channel with capacity >= 1 cannot be full.
        let _ = tx.try_send(EventRecord::connected());
        self.inner.subscribers.insert(id, tx);

        info!(
            subscriber = id,
            total = self.inner.subscribers.len(),
            "subscriber connected"
        );

        Subscription {
            id,
            rx,
            hub: Arc::clone(&self.inner),
            closed: false,
        }
    }

    /// Deliver `record` to every currently registered subscriber.
    ///
    /// Returns the number of subscribers that accepted the record. Subscribers
    /// whose channel is full or closed are removed.
    pub fn publish(&self, record: &EventRecord) -> usize {
        let targets: Vec<(SubscriberId, mpsc::Sender<EventRecord>)> = self
            .inner
            .subscribers
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();

        let mut delivered = 0;
        for (id, tx) in targets {
            match tx.try_send(record.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.inner.remove(id, "buffer full");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    self.inner.remove(id, "channel closed");
                }
            }
        }

        delivered
    }

    /// Remove a subscriber. Removing an unknown or already removed id is a no-op.
    pub fn unsubscribe(&self, id: SubscriberId) {
        self.inner.remove(id, "unsubscribed");
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    pub fn is_subscribed(&self, id: SubscriberId) -> bool {
        self.inner.subscribers.contains_key(&id)
    }

    /// Drop every subscriber sink, ending all open streams.
    pub fn close_all(&self) {
        let count = self.inner.subscribers.len();
        self.inner.subscribers.clear();
        info!(count, "closed all subscribers");
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_BUFFER)
    }
}

/// A live subscription.
///
/// Yields records as a stream and unsubscribes exactly once, on `close` or
/// when dropped, whichever comes first.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::Receiver<EventRecord>,
    hub: Arc<HubInner>,
    closed: bool,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next record. Returns `None` once the hub has dropped
    /// this subscriber.
    pub async fn recv(&mut self) -> Option<EventRecord> {
        self.rx.recv().await
    }

    /// Take a queued record without waiting.
    pub fn try_recv(&mut self) -> Option<EventRecord> {
        self.rx.try_recv().ok()
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.rx.close();
        self.hub.remove(self.id, "stream closed");
    }
}

impl Stream for Subscription {
    type Item = EventRecord;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::EventKind;

    fn record(kind: &str, payload: &str) -> EventRecord {
        EventRecord::now(kind, payload)
    }

    #[tokio::test]
    async fn subscribe_queues_connected_for_new_subscriber_only() {
        let hub = BroadcastHub::default();
        let mut first = hub.subscribe();
        assert_eq!(first.recv().await.unwrap().kind, EventKind::Connected);

        let mut second = hub.subscribe();
        assert_eq!(second.recv().await.unwrap().kind, EventKind::Connected);
        assert!(first.try_recv().is_none());
    }

    #[tokio::test]
    async fn publish_reaches_all_subscribers_in_order() {
        let hub = BroadcastHub::default();
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();
        a.recv().await;
        b.recv().await;

        assert_eq!(hub.publish(&record("user_speech", "hi")), 2);
        assert_eq!(hub.publish(&record("ai_response", "hello")), 2);

        for sub in [&mut a, &mut b] {
            assert_eq!(sub.recv().await.unwrap().payload, "hi");
            assert_eq!(sub.recv().await.unwrap().payload, "hello");
        }
    }

    #[tokio::test]
    async fn late_subscriber_sees_no_earlier_records() {
        let hub = BroadcastHub::default();
        hub.publish(&record("user_speech", "before"));

        let mut sub = hub.subscribe();
        assert_eq!(sub.recv().await.unwrap().kind, EventKind::Connected);
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn dropping_subscription_unsubscribes() {
        let hub = BroadcastHub::default();
        let sub = hub.subscribe();
        let id = sub.id();
        assert!(hub.is_subscribed(id));

        drop(sub);
        assert!(!hub.is_subscribed(id));
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn double_unsubscribe_is_noop() {
        let hub = BroadcastHub::default();
        let mut doomed = hub.subscribe();
        let mut survivor = hub.subscribe();
        survivor.recv().await;

        hub.unsubscribe(doomed.id());
        hub.unsubscribe(doomed.id());
        doomed.close();
        drop(doomed);

        assert_eq!(hub.subscriber_count(), 1);
        assert_eq!(hub.publish(&record("ai_emotion", "happy")), 1);
        assert_eq!(survivor.recv().await.unwrap().payload, "happy");
    }

    #[tokio::test]
    async fn full_subscriber_is_dropped_without_affecting_others() {
        let hub = BroadcastHub::new(2);
        // Never drained: holds `connected`, one slot left.
        let slow = hub.subscribe();
        let mut fast = hub.subscribe();
        fast.recv().await;

        assert_eq!(hub.publish(&record("a", "1")), 2);
        fast.recv().await;
        assert_eq!(hub.publish(&record("a", "2")), 1);

        assert!(!hub.is_subscribed(slow.id()));
        assert!(hub.is_subscribed(fast.id()));
        assert_eq!(fast.recv().await.unwrap().payload, "2");
    }

    #[tokio::test]
    async fn closed_receiver_is_removed_on_publish() {
        let hub = BroadcastHub::default();
        let mut sub = hub.subscribe();
        let id = sub.id();
        // Close the receiving half without going through the hub.
        sub.rx.close();

        assert_eq!(hub.publish(&record("a", "1")), 0);
        assert!(!hub.is_subscribed(id));
    }

    #[tokio::test]
    async fn close_all_ends_streams() {
        let hub = BroadcastHub::default();
        let mut sub = hub.subscribe();
        sub.recv().await;

        hub.close_all();
        assert!(sub.recv().await.is_none());
        assert_eq!(hub.subscriber_count(), 0);
    }
}
