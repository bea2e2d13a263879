//! In-process fan-out of `JobEvent`s to admin subscribers (§4.3).
//!
//! Grounded on `kernel/stream_hub.rs`'s topic-keyed pub/sub hub, adapted
//! from a single `tokio::sync::broadcast` channel (which evicts *every*
//! lagging receiver uniformly) to one bounded `mpsc` channel per
//! subscriber, so a single slow consumer can be dropped-from and
//! eventually evicted without disturbing the others.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::warn;

use super::events::JobEvent;

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<JobEvent>,
    consecutive_drops: u32,
}

struct Inner {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
    capacity: usize,
    max_consecutive_drops: u32,
}

/// Fan-out broadcaster for `JobEvent`s.
///
/// Cloning an `EventBus` shares the same subscriber set (cheap `Arc` clone),
/// matching `StreamHub`'s cloneable-handle design.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

/// A live subscription. Dropping it unregisters the subscriber.
pub struct Subscription {
    id: u64,
    bus: EventBus,
    pub receiver: mpsc::Receiver<JobEvent>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<JobEvent> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.id);
    }
}

impl EventBus {
    /// Create a bus with a 256-event per-subscriber buffer and eviction
    /// after 5 consecutive dropped events, matching the defaults implied
    /// by `StreamHub::new`'s 256-message channel capacity.
    pub fn new() -> Self {
        Self::with_config(256, 5)
    }

    pub fn with_config(capacity: usize, max_consecutive_drops: u32) -> Self {
        Self {
            inner: Arc::new(Inner {
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
                capacity,
                max_consecutive_drops,
            }),
        }
    }

    /// Register a new subscriber and return its receiving half plus a
    /// cancel handle (dropping the `Subscription` unsubscribes).
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Subscriber {
                id,
                tx,
                consecutive_drops: 0,
            });

        Subscription {
            id,
            bus: self.clone(),
            receiver: rx,
        }
    }

    /// Publish an event to every live subscriber. Non-blocking for the
    /// producer: a full subscriber buffer drops this event for that
    /// subscriber only, and after `max_consecutive_drops` in a row the
    /// subscriber is terminated.
    pub fn publish(&self, event: JobEvent) {
        let mut subscribers = self
            .inner
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner());

        subscribers.retain_mut(|sub| match sub.tx.try_send(event.clone()) {
            Ok(()) => {
                sub.consecutive_drops = 0;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                sub.consecutive_drops += 1;
                if sub.consecutive_drops >= self.inner.max_consecutive_drops {
                    warn!(subscriber_id = sub.id, "evicting lagging event subscriber");
                    false
                } else {
                    true
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }

    fn unsubscribe(&self, id: u64) {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|s| s.id != id);
    }

    /// Number of currently live subscribers. Exposed for tests and
    /// housekeeping metrics.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::events::JobEventKind;
    use crate::kernel::job::{Job, JobType};

    fn sample_event() -> JobEvent {
        JobEvent::new(JobEventKind::Queued, Job::new(JobType::CollectEod, "AAPL"))
    }

    #[tokio::test]
    async fn publish_subscribe_roundtrip() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();

        bus.publish(sample_event());

        let received = sub.recv().await.unwrap();
        assert_eq!(received.kind, JobEventKind::Queued);
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_is_noop() {
        let bus = EventBus::new();
        bus.publish(sample_event());
    }

    #[tokio::test]
    async fn multiple_subscribers_each_receive_in_order() {
        let bus = EventBus::new();
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        bus.publish(sample_event());
        bus.publish(sample_event());

        assert!(sub1.recv().await.is_some());
        assert!(sub1.recv().await.is_some());
        assert!(sub2.recv().await.is_some());
        assert!(sub2.recv().await.is_some());
    }

    #[tokio::test]
    async fn dropping_subscription_unsubscribes() {
        let bus = EventBus::new();
        let sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn slow_subscriber_is_evicted_after_consecutive_drops() {
        let bus = EventBus::with_config(1, 3);
        let mut sub = bus.subscribe();

        // Fill the single-slot buffer so subsequent publishes drop.
        bus.publish(sample_event());
        assert_eq!(bus.subscriber_count(), 1);

        // Three more publishes each fail to send (buffer still full since
        // nobody is draining it) -> eviction on the third consecutive drop.
        bus.publish(sample_event());
        bus.publish(sample_event());
        bus.publish(sample_event());

        assert_eq!(bus.subscriber_count(), 0);

        // The one buffered event is still observable before the channel
        // is fully torn down.
        assert!(sub.recv().await.is_some());
    }

    #[tokio::test]
    async fn successful_send_resets_drop_counter() {
        let bus = EventBus::with_config(1, 2);
        let mut sub = bus.subscribe();

        bus.publish(sample_event()); // fills the buffer
        bus.publish(sample_event()); // drop #1

        sub.recv().await.unwrap(); // drain, freeing a slot
        bus.publish(sample_event()); // succeeds, resets counter
        bus.publish(sample_event()); // fills buffer again
        bus.publish(sample_event()); // drop #1 again, not #2 -> survives

        assert_eq!(bus.subscriber_count(), 1);
    }
}
