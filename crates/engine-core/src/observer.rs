use async_trait::async_trait;
use model::events::IngestEvent;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};

/// Receives the structured events emitted while a table is copied and loaded.
#[async_trait]
pub trait IngestObserver: Send + Sync {
    async fn on_event(&self, event: &IngestEvent);
}

pub type SharedObserver = Arc<dyn IngestObserver>;

pub struct NoopObserver;

#[async_trait]
impl IngestObserver for NoopObserver {
    async fn on_event(&self, _event: &IngestEvent) {}
}

/// Renders every event as a log line.
pub struct TracingObserver;

#[async_trait]
impl IngestObserver for TracingObserver {
    async fn on_event(&self, event: &IngestEvent) {
        match event {
            IngestEvent::TablePlanned {
                table,
                split_size,
                splits,
                row_count,
            } => info!(table = %table, split_size, splits, row_count, "Planned table"),
            IngestEvent::SplitPlanned {
                table,
                split_id,
                row_count,
                checksum,
            } => debug!(table = %table, split_id, row_count, checksum = ?checksum, "Planned split"),
            IngestEvent::CacheHit { table, split_id } => {
                info!(table = %table, split_id, "Cache hit")
            }
            IngestEvent::CacheMiss {
                table,
                split_id,
                reason,
            } => info!(table = %table, split_id, reason = ?reason, "Cache miss"),
            IngestEvent::ExportProgress {
                table,
                split_id,
                rows,
                expected,
                percent,
            } => info!(table = %table, split_id, rows, expected, "Exported {percent}%"),
            IngestEvent::SplitExported {
                table,
                split_id,
                rows,
                elapsed_ms,
            } => info!(table = %table, split_id, rows, elapsed_ms, "Exported split"),
            IngestEvent::LoadSkipped {
                table_id,
                row_count,
            } => info!(table_id = %table_id, row_count, "Warehouse table up to date, skipping load"),
            IngestEvent::LoadSubmitted { table_id, uri } => {
                info!(table_id = %table_id, uri = %uri, "Submitted load job")
            }
            IngestEvent::LoadCompleted {
                table_id,
                row_count,
                elapsed_ms,
            } => info!(table_id = %table_id, row_count, elapsed_ms, "Load job completed"),
        }
    }
}

/// A subscription handle that can be used to unsubscribe.
#[derive(Debug, Clone, Copy)]
pub struct Subscription {
    subscriber_id: u64,
}

/// Fans events out to channel subscribers without ever blocking the engine.
/// A subscriber whose channel is full misses the event.
#[derive(Clone, Default)]
pub struct ChannelObserver {
    subscribers: Arc<RwLock<HashMap<u64, mpsc::Sender<Arc<IngestEvent>>>>>,
    next_id: Arc<RwLock<u64>>,
}

impl ChannelObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn subscribe(&self, sender: mpsc::Sender<Arc<IngestEvent>>) -> Subscription {
        let subscriber_id = {
            let mut id_lock = self.next_id.write().await;
            let id = *id_lock;
            *id_lock += 1;
            id
        };

        self.subscribers.write().await.insert(subscriber_id, sender);
        debug!(subscriber_id, "Subscribed to ingest events");

        Subscription { subscriber_id }
    }

    pub async fn unsubscribe(&self, subscription: Subscription) {
        let mut subscribers = self.subscribers.write().await;
        if subscribers.remove(&subscription.subscriber_id).is_some() {
            debug!(
                subscriber_id = subscription.subscriber_id,
                "Unsubscribed from ingest events"
            );
        }
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }
}

#[async_trait]
impl IngestObserver for ChannelObserver {
    async fn on_event(&self, event: &IngestEvent) {
        let subscribers = self.subscribers.read().await;
        if subscribers.is_empty() {
            return;
        }

        let event = Arc::new(event.clone());
        for (subscriber_id, sender) in subscribers.iter() {
            if let Err(e) = sender.try_send(event.clone()) {
                warn!(
                    event_type = event.event_type(),
                    subscriber_id,
                    error = ?e,
                    "Dropped event for slow subscriber (channel full)"
                );
            }
        }
    }
}

/// Forwards each event to several observers in order.
pub struct CompositeObserver {
    observers: Vec<SharedObserver>,
}

impl CompositeObserver {
    pub fn new(observers: Vec<SharedObserver>) -> Self {
        Self { observers }
    }
}

#[async_trait]
impl IngestObserver for CompositeObserver {
    async fn on_event(&self, event: &IngestEvent) {
        for observer in &self.observers {
            observer.on_event(event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(split_id: u64) -> IngestEvent {
        IngestEvent::CacheHit {
            table: "orders".into(),
            split_id,
        }
    }

    #[tokio::test]
    async fn delivers_to_every_subscriber() {
        let observer = ChannelObserver::new();
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);
        observer.subscribe(tx1).await;
        observer.subscribe(tx2).await;

        observer.on_event(&hit(1)).await;

        assert_eq!(*rx1.recv().await.unwrap(), hit(1));
        assert_eq!(*rx2.recv().await.unwrap(), hit(1));
    }

    #[tokio::test]
    async fn full_channel_drops_instead_of_blocking() {
        let observer = ChannelObserver::new();
        let (tx, mut rx) = mpsc::channel(1);
        observer.subscribe(tx).await;

        observer.on_event(&hit(1)).await;
        observer.on_event(&hit(2)).await;

        assert_eq!(*rx.recv().await.unwrap(), hit(1));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribed_receivers_get_nothing() {
        let observer = ChannelObserver::new();
        let (tx, mut rx) = mpsc::channel(4);
        let subscription = observer.subscribe(tx).await;
        observer.unsubscribe(subscription).await;
        assert_eq!(observer.subscriber_count().await, 0);

        observer.on_event(&hit(1)).await;
        assert!(rx.try_recv().is_err());
    }
}
