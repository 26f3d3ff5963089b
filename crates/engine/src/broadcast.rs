//! Subscriber registry and single-writer fan-out loop.
//!
//! Producers enqueue with a non-blocking try-send; a full queue drops the
//! payload so a slow or dead subscriber can never stall ingest. The loop
//! delivers sequentially and evicts a subscriber on its first failure.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Bounded fan-out queue depth.
pub const CHANNEL_CAPACITY: usize = 100;

pub type SubscriberId = Uuid;

/// Errors surfaced by a subscriber sink.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sink closed")]
    Closed,

    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// A downstream subscriber transport (typically a WebSocket).
///
/// Sinks never call back into the core; deliveries happen on the
/// broadcaster loop's own execution context, outside every core lock.
#[async_trait::async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver a serialized payload to the subscriber.
    async fn deliver(&self, payload: &str) -> Result<(), SinkError>;

    /// Close the underlying transport. Called at most once, on eviction
    /// or registry teardown.
    async fn close(&self) {}
}

pub struct Broadcaster {
    subscribers: Arc<RwLock<HashMap<SubscriberId, Arc<dyn EventSink>>>>,
    tx: mpsc::Sender<String>,
    dropped: AtomicU64,
}

impl Broadcaster {
    /// Create a broadcaster plus the receiving end of its payload queue,
    /// which must be handed to [`Broadcaster::run`].
    pub fn new() -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        (
            Self {
                subscribers: Arc::new(RwLock::new(HashMap::new())),
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Register a sink and deliver the initial payload to it immediately.
    /// A sink that fails its initial delivery is evicted on the spot.
    pub async fn subscribe(&self, sink: Arc<dyn EventSink>, initial: String) -> SubscriberId {
        let id = Uuid::new_v4();
        self.subscribers.write().await.insert(id, Arc::clone(&sink));
        info!(subscriber = %id, "subscriber registered");

        if sink.deliver(&initial).await.is_err() {
            warn!(subscriber = %id, "initial delivery failed, evicting");
            self.unsubscribe(id).await;
        }
        id
    }

    /// Unregister and close the sink. Idempotent: a second call with the
    /// same id is a no-op.
    pub async fn unsubscribe(&self, id: SubscriberId) {
        let sink = self.subscribers.write().await.remove(&id);
        if let Some(sink) = sink {
            sink.close().await;
            debug!(subscriber = %id, "subscriber unregistered");
        }
    }

    /// Non-blocking enqueue toward the fan-out loop. A full queue drops
    /// the payload and bumps `dropped_broadcasts`.
    pub fn publish(&self, payload: String) {
        if self.tx.try_send(payload).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!("broadcast queue saturated, payload dropped");
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Payloads dropped because the queue was full (or the loop stopped).
    pub fn dropped_broadcasts(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Single-writer fan-out loop. Per payload, iterates subscribers
    /// sequentially; a failing sink is unregistered and closed before the
    /// next delivery. Exits when the shutdown flag is raised or every
    /// sender is gone, then closes the remaining sinks.
    pub async fn run(&self, mut rx: mpsc::Receiver<String>, shutdown: Arc<AtomicBool>) {
        info!("broadcast loop started");
        let mut shutdown_check = tokio::time::interval(std::time::Duration::from_millis(200));
        shutdown_check.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                maybe = rx.recv() => {
                    match maybe {
                        Some(payload) => {
                            if shutdown.load(Ordering::Relaxed) {
                                break;
                            }
                            self.fan_out(&payload).await;
                        }
                        None => break,
                    }
                }
                _ = shutdown_check.tick() => {
                    if shutdown.load(Ordering::Relaxed) {
                        break;
                    }
                }
            }
        }

        // Registry teardown: close every remaining sink exactly once.
        let remaining: Vec<(SubscriberId, Arc<dyn EventSink>)> =
            self.subscribers.write().await.drain().collect();
        for (_, sink) in remaining {
            sink.close().await;
        }
        info!("broadcast loop stopped");
    }

    async fn fan_out(&self, payload: &str) {
        // Snapshot the registry so delivery happens outside the lock.
        let targets: Vec<(SubscriberId, Arc<dyn EventSink>)> = self
            .subscribers
            .read()
            .await
            .iter()
            .map(|(id, sink)| (*id, Arc::clone(sink)))
            .collect();

        for (id, sink) in targets {
            if sink.deliver(payload).await.is_err() {
                warn!(subscriber = %id, "delivery failed, evicting subscriber");
                self.unsubscribe(id).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    struct MockSink {
        delivered: Mutex<Vec<String>>,
        close_count: AtomicUsize,
        should_fail: bool,
    }

    impl MockSink {
        fn new(should_fail: bool) -> Arc<Self> {
            Arc::new(Self {
                delivered: Mutex::new(Vec::new()),
                close_count: AtomicUsize::new(0),
                should_fail,
            })
        }

        fn delivered(&self) -> Vec<String> {
            self.delivered.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl EventSink for MockSink {
        async fn deliver(&self, payload: &str) -> Result<(), SinkError> {
            if self.should_fail {
                return Err(SinkError::Delivery("mock failure".to_string()));
            }
            self.delivered.lock().unwrap().push(payload.to_string());
            Ok(())
        }

        async fn close(&self) {
            self.close_count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn subscribe_delivers_initial_payload() {
        let (broadcaster, _rx) = Broadcaster::new();
        let sink = MockSink::new(false);

        broadcaster.subscribe(sink.clone(), "hello".to_string()).await;
        assert_eq!(sink.delivered(), vec!["hello".to_string()]);
        assert_eq!(broadcaster.subscriber_count().await, 1);
    }

    #[tokio::test]
    async fn failed_initial_delivery_evicts() {
        let (broadcaster, _rx) = Broadcaster::new();
        let sink = MockSink::new(true);

        broadcaster.subscribe(sink.clone(), "hello".to_string()).await;
        assert_eq!(broadcaster.subscriber_count().await, 0);
        assert_eq!(sink.close_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fan_out_reaches_all_and_evicts_failures() {
        let (broadcaster, _rx) = Broadcaster::new();
        let good_a = MockSink::new(false);
        let good_b = MockSink::new(false);
        let bad = MockSink::new(true);

        broadcaster.subscribers.write().await.extend([
            (Uuid::new_v4(), good_a.clone() as Arc<dyn EventSink>),
            (Uuid::new_v4(), good_b.clone() as Arc<dyn EventSink>),
            (Uuid::new_v4(), bad.clone() as Arc<dyn EventSink>),
        ]);

        broadcaster.fan_out("tick").await;
        assert_eq!(good_a.delivered(), vec!["tick".to_string()]);
        assert_eq!(good_b.delivered(), vec!["tick".to_string()]);
        assert_eq!(broadcaster.subscriber_count().await, 2);
        assert_eq!(bad.close_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let (broadcaster, _rx) = Broadcaster::new();
        let sink = MockSink::new(false);

        let id = broadcaster.subscribe(sink.clone(), "hi".to_string()).await;
        broadcaster.unsubscribe(id).await;
        broadcaster.unsubscribe(id).await;

        assert_eq!(sink.close_count.load(Ordering::SeqCst), 1);
        assert_eq!(broadcaster.subscriber_count().await, 0);
    }

    #[tokio::test]
    async fn publish_drops_when_queue_is_full() {
        let (broadcaster, _rx) = Broadcaster::new();
        // Nothing drains the queue, so the capacity-and-first payloads fit.
        for i in 0..(CHANNEL_CAPACITY + 5) {
            broadcaster.publish(format!("p{i}"));
        }
        assert_eq!(broadcaster.dropped_broadcasts(), 5);
    }

    #[tokio::test]
    async fn run_loop_stops_on_shutdown_and_closes_sinks() {
        let (broadcaster, rx) = Broadcaster::new();
        let broadcaster = Arc::new(broadcaster);
        let sink = MockSink::new(false);
        broadcaster.subscribe(sink.clone(), "initial".to_string()).await;

        let shutdown = Arc::new(AtomicBool::new(false));
        let loop_handle = {
            let broadcaster = Arc::clone(&broadcaster);
            let shutdown = Arc::clone(&shutdown);
            tokio::spawn(async move { broadcaster.run(rx, shutdown).await })
        };

        broadcaster.publish("tick".to_string());
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(sink.delivered(), vec!["initial".to_string(), "tick".to_string()]);

        shutdown.store(true, Ordering::Relaxed);
        loop_handle.await.unwrap();
        assert_eq!(sink.close_count.load(Ordering::SeqCst), 1);
        assert_eq!(broadcaster.subscriber_count().await, 0);
    }
}
