//! In-process change-feed backend.

use super::types::{CollectionPath, Document, DocumentPath, FeedEvent, FeedQuery, FeedSink};
use super::{ChangeFeedSource, FeedHandle};
use crate::error::Result;
use crate::types::Timestamp;
use async_trait::async_trait;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// When snapshots reach subscriber sinks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Delivered before the triggering call returns.
    #[default]
    Immediate,
    /// Queued until [`MemoryFeedSource::dispatch_pending`] runs, like an
    /// event loop that has not yet got round to them.
    Queued,
}

struct Watcher {
    query: FeedQuery,
    sink: FeedSink,
}

struct Delivery {
    watcher: u64,
    sink: FeedSink,
    event: FeedEvent,
}

struct Shared {
    collections: RwLock<HashMap<CollectionPath, BTreeMap<String, Document>>>,
    watchers: RwLock<HashMap<u64, Watcher>>,
    next_watcher: AtomicU64,
    next_doc: AtomicU64,
    /// Last issued write time.
    clock: Mutex<i64>,
    /// Serializes mutate-then-enqueue so snapshots are queued in write order.
    publish: Mutex<()>,
    /// Serializes draining. Reentrant because a sink may write.
    dispatch: ReentrantMutex<()>,
    queue_tx: Sender<Delivery>,
    queue_rx: Receiver<Delivery>,
    mode: DeliveryMode,
}

impl Shared {
    fn next_write_time(&self) -> Timestamp {
        let mut last = self.clock.lock();
        let now = Timestamp::now().0.max(*last + 1);
        *last = now;
        Timestamp(now)
    }

    fn snapshot(&self, query: &FeedQuery) -> Vec<Document> {
        let mut docs: Vec<Document> = self
            .collections
            .read()
            .get(&query.collection)
            .map(|c| c.values().cloned().collect())
            .unwrap_or_default();
        query.order.sort(&mut docs);
        docs
    }

    /// Queue a fresh snapshot for every watcher of `collection`.
    /// Caller holds the publish lock.
    fn enqueue_snapshots(&self, collection: &CollectionPath) {
        let watchers = self.watchers.read();
        for (id, watcher) in watchers.iter() {
            if &watcher.query.collection != collection {
                continue;
            }
            let docs = self.snapshot(&watcher.query);
            let _ = self.queue_tx.send(Delivery {
                watcher: *id,
                sink: Arc::clone(&watcher.sink),
                event: FeedEvent::Snapshot(docs),
            });
        }
    }

    fn drain(&self) -> usize {
        let _guard = self.dispatch.lock();
        let mut delivered = 0;
        while let Ok(delivery) = self.queue_rx.try_recv() {
            trace!(watcher = delivery.watcher, "delivering feed event");
            (delivery.sink)(delivery.event);
            delivered += 1;
        }
        delivered
    }

    fn after_publish(&self) {
        if self.mode == DeliveryMode::Immediate {
            self.drain();
        }
    }
}

/// Handle returned by [`MemoryFeedSource::subscribe`].
struct MemoryFeedHandle {
    id: u64,
    shared: Weak<Shared>,
    cancelled: AtomicBool,
}

impl FeedHandle for MemoryFeedHandle {
    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(shared) = self.shared.upgrade() {
            shared.watchers.write().remove(&self.id);
            debug!(watcher = self.id, "feed watcher cancelled");
        }
    }
}

/// Document store held in memory, with live snapshots.
///
/// Document ids assigned by [`add`](ChangeFeedSource::add) are zero-padded
/// counters, so id order is creation order. Write times are strictly
/// increasing across the whole source.
#[derive(Clone)]
pub struct MemoryFeedSource {
    shared: Arc<Shared>,
}

impl MemoryFeedSource {
    pub fn new() -> Self {
        Self::with_delivery(DeliveryMode::Immediate)
    }

    pub fn with_delivery(mode: DeliveryMode) -> Self {
        let (queue_tx, queue_rx) = unbounded();
        Self {
            shared: Arc::new(Shared {
                collections: RwLock::new(HashMap::new()),
                watchers: RwLock::new(HashMap::new()),
                next_watcher: AtomicU64::new(1),
                next_doc: AtomicU64::new(1),
                clock: Mutex::new(0),
                publish: Mutex::new(()),
                dispatch: ReentrantMutex::new(()),
                queue_tx,
                queue_rx,
                mode,
            }),
        }
    }

    /// Deliver every queued event. Returns how many were delivered.
    pub fn dispatch_pending(&self) -> usize {
        self.shared.drain()
    }

    /// Events waiting for [`dispatch_pending`](Self::dispatch_pending).
    pub fn pending_deliveries(&self) -> usize {
        self.shared.queue_rx.len()
    }

    /// Number of live watchers across all collections.
    pub fn watcher_count(&self) -> usize {
        self.shared.watchers.read().len()
    }

    pub fn document_count(&self, collection: &CollectionPath) -> usize {
        self.shared
            .collections
            .read()
            .get(collection)
            .map_or(0, |c| c.len())
    }

    /// Send a feed error to every watcher of `collection` and drop them,
    /// as a backend does when a listener is revoked or the connection dies.
    pub fn fail_watchers(&self, collection: &CollectionPath, reason: &str) {
        {
            let _publish = self.shared.publish.lock();
            let mut watchers = self.shared.watchers.write();
            let failed: Vec<u64> = watchers
                .iter()
                .filter(|(_, w)| &w.query.collection == collection)
                .map(|(id, _)| *id)
                .collect();
            for id in failed {
                if let Some(watcher) = watchers.remove(&id) {
                    let _ = self.shared.queue_tx.send(Delivery {
                        watcher: id,
                        sink: watcher.sink,
                        event: FeedEvent::Error(reason.to_string()),
                    });
                }
            }
        }
        self.shared.after_publish();
    }

    fn store(&self, collection: &CollectionPath, id: String, data: serde_json::Value) -> Document {
        let doc = {
            let _publish = self.shared.publish.lock();
            let doc = Document {
                id: id.clone(),
                data,
                written_at: self.shared.next_write_time(),
            };
            self.shared
                .collections
                .write()
                .entry(collection.clone())
                .or_default()
                .insert(id, doc.clone());
            self.shared.enqueue_snapshots(collection);
            doc
        };
        self.shared.after_publish();
        doc
    }
}

impl Default for MemoryFeedSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChangeFeedSource for MemoryFeedSource {
    async fn subscribe(&self, query: FeedQuery, sink: FeedSink) -> Result<Box<dyn FeedHandle>> {
        let id = self.shared.next_watcher.fetch_add(1, Ordering::SeqCst);
        {
            let _publish = self.shared.publish.lock();
            let initial = self.shared.snapshot(&query);
            debug!(watcher = id, collection = %query.collection, "feed watcher registered");
            self.shared.watchers.write().insert(
                id,
                Watcher {
                    query,
                    sink: Arc::clone(&sink),
                },
            );
            let _ = self.shared.queue_tx.send(Delivery {
                watcher: id,
                sink,
                event: FeedEvent::Snapshot(initial),
            });
        }
        self.shared.after_publish();

        Ok(Box::new(MemoryFeedHandle {
            id,
            shared: Arc::downgrade(&self.shared),
            cancelled: AtomicBool::new(false),
        }))
    }

    async fn add(&self, collection: &CollectionPath, data: serde_json::Value) -> Result<Document> {
        let seq = self.shared.next_doc.fetch_add(1, Ordering::SeqCst);
        // Validates the generated segment alongside the collection.
        let path = collection.doc(&format!("{:020}", seq))?;
        Ok(self.store(path.collection(), path.id().to_string(), data))
    }

    async fn write(&self, path: &DocumentPath, data: serde_json::Value) -> Result<Document> {
        Ok(self.store(path.collection(), path.id().to_string(), data))
    }

    async fn delete(&self, path: &DocumentPath) -> Result<bool> {
        let existed = {
            let _publish = self.shared.publish.lock();
            let existed = self
                .shared
                .collections
                .write()
                .get_mut(path.collection())
                .and_then(|c| c.remove(path.id()))
                .is_some();
            if existed {
                self.shared.enqueue_snapshots(path.collection());
            }
            existed
        };
        self.shared.after_publish();
        Ok(existed)
    }

    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>> {
        Ok(self
            .shared
            .collections
            .read()
            .get(path.collection())
            .and_then(|c| c.get(path.id()))
            .cloned())
    }

    async fn get_all(&self, query: &FeedQuery) -> Result<Vec<Document>> {
        Ok(self.shared.snapshot(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::{Direction, Order};
    use serde_json::json;

    fn collect() -> (FeedSink, crossbeam_channel::Receiver<FeedEvent>) {
        let (tx, rx) = unbounded();
        let sink: FeedSink = Arc::new(move |event| {
            let _ = tx.send(event);
        });
        (sink, rx)
    }

    fn snapshot_ids(event: FeedEvent) -> Vec<String> {
        match event {
            FeedEvent::Snapshot(docs) => docs.into_iter().map(|d| d.id).collect(),
            FeedEvent::Error(e) => panic!("Expected snapshot, got error {}", e),
        }
    }

    #[tokio::test]
    async fn test_initial_snapshot_then_updates() {
        let source = MemoryFeedSource::new();
        let notes = CollectionPath::root("notes").unwrap();
        source.add(&notes, json!({"n": 1})).await.unwrap();

        let (sink, rx) = collect();
        let _handle = source.subscribe(FeedQuery::new(notes.clone()), sink).await.unwrap();
        assert_eq!(snapshot_ids(rx.try_recv().unwrap()).len(), 1);

        source.add(&notes, json!({"n": 2})).await.unwrap();
        assert_eq!(snapshot_ids(rx.try_recv().unwrap()).len(), 2);
    }

    #[tokio::test]
    async fn test_other_collections_not_delivered() {
        let source = MemoryFeedSource::new();
        let notes = CollectionPath::root("notes").unwrap();
        let other = CollectionPath::root("other").unwrap();

        let (sink, rx) = collect();
        let _handle = source.subscribe(FeedQuery::new(notes), sink).await.unwrap();
        rx.try_recv().unwrap();

        source.add(&other, json!({})).await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_add_ids_follow_creation_order() {
        let source = MemoryFeedSource::new();
        let notes = CollectionPath::root("notes").unwrap();
        let first = source.add(&notes, json!({})).await.unwrap();
        let second = source.add(&notes, json!({})).await.unwrap();
        assert!(first.id < second.id);
        assert!(first.written_at < second.written_at);

        let query = FeedQuery::new(notes).ordered(Order::WrittenAt(Direction::Descending));
        let all = source.get_all(&query).await.unwrap();
        assert_eq!(all[0].id, second.id);
    }

    #[tokio::test]
    async fn test_cancel_removes_watcher() {
        let source = MemoryFeedSource::new();
        let notes = CollectionPath::root("notes").unwrap();
        let (sink, rx) = collect();
        let handle = source.subscribe(FeedQuery::new(notes.clone()), sink).await.unwrap();
        rx.try_recv().unwrap();
        assert_eq!(source.watcher_count(), 1);

        handle.cancel();
        handle.cancel();
        assert_eq!(source.watcher_count(), 0);

        source.add(&notes, json!({})).await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_queued_delivery_waits_for_dispatch() {
        let source = MemoryFeedSource::with_delivery(DeliveryMode::Queued);
        let notes = CollectionPath::root("notes").unwrap();
        let (sink, rx) = collect();
        let _handle = source.subscribe(FeedQuery::new(notes.clone()), sink).await.unwrap();
        source.add(&notes, json!({})).await.unwrap();

        assert!(rx.try_recv().is_err());
        assert_eq!(source.pending_deliveries(), 2);
        assert_eq!(source.dispatch_pending(), 2);
        assert_eq!(snapshot_ids(rx.try_recv().unwrap()).len(), 0);
        assert_eq!(snapshot_ids(rx.try_recv().unwrap()).len(), 1);
    }

    #[tokio::test]
    async fn test_write_delete_and_get() {
        let source = MemoryFeedSource::new();
        let users = CollectionPath::root("users").unwrap();
        let path = users.doc("a@x.io").unwrap();

        source.write(&path, json!({"v": 1})).await.unwrap();
        source.write(&path, json!({"v": 2})).await.unwrap();
        let doc = source.get(&path).await.unwrap().unwrap();
        assert_eq!(doc.data["v"], 2);
        assert_eq!(source.document_count(&users), 1);

        assert!(source.delete(&path).await.unwrap());
        assert!(!source.delete(&path).await.unwrap());
        assert!(source.get(&path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fail_watchers_sends_error_and_drops() {
        let source = MemoryFeedSource::new();
        let notes = CollectionPath::root("notes").unwrap();
        let (sink, rx) = collect();
        let _handle = source.subscribe(FeedQuery::new(notes.clone()), sink).await.unwrap();
        rx.try_recv().unwrap();

        source.fail_watchers(&notes, "permission revoked");
        assert!(matches!(rx.try_recv().unwrap(), FeedEvent::Error(_)));
        assert_eq!(source.watcher_count(), 0);
    }
}
