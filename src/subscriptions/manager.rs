//! Subscription manager and handles.

use crate::error::{Result, SyncError};
use crate::feed::{ChangeFeedSource, Document, FeedEvent, FeedHandle, FeedQuery, FeedSink};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace, warn};

use super::types::{SubscriptionId, SubscriptionKey};

type Registry = RwLock<HashMap<SubscriptionId, SubscriptionKey>>;

/// Liveness flag checked under the delivery lock before every callback.
///
/// The lock is reentrant so a callback may close its own subscription.
struct Gate {
    live: AtomicBool,
    delivery: ReentrantMutex<()>,
}

impl Gate {
    fn new() -> Self {
        Self {
            live: AtomicBool::new(true),
            delivery: ReentrantMutex::new(()),
        }
    }

    fn shut(&self) {
        let _guard = self.delivery.lock();
        self.live.store(false, Ordering::SeqCst);
    }
}

/// Handle to one live feed.
///
/// Closing is idempotent; once [`close`](Self::close) returns no further
/// callbacks run for this subscription. Dropping the handle closes it.
pub struct Subscription {
    id: SubscriptionId,
    key: SubscriptionKey,
    gate: Arc<Gate>,
    feed: Mutex<Option<Box<dyn FeedHandle>>>,
    registry: Weak<Registry>,
}

impl Subscription {
    /// Identifier assigned by the manager, unique per manager.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// What this subscription watches.
    pub fn key(&self) -> &SubscriptionKey {
        &self.key
    }

    /// False once closed or after the feed reported an error.
    pub fn is_live(&self) -> bool {
        self.gate.live.load(Ordering::SeqCst)
    }

    /// Stop deliveries and detach from the feed.
    ///
    /// Synchronous: once this returns, neither callback runs again. A
    /// delivery in progress on another thread is waited for. Calling it
    /// from inside this subscription's own callback is allowed, and so is
    /// calling it more than once.
    pub fn close(&self) {
        self.gate.shut();

        let Some(handle) = self.feed.lock().take() else {
            return;
        };
        handle.cancel();
        if let Some(registry) = self.registry.upgrade() {
            registry.write().remove(&self.id);
        }
        debug!(subscription = %self.id, key = %self.key, "subscription closed");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("live", &self.is_live())
            .finish()
    }
}

/// Opens feeds on a [`ChangeFeedSource`] and wraps them in [`Subscription`]s.
pub struct SubscriptionManager {
    feed: Arc<dyn ChangeFeedSource>,
    /// Open subscriptions by ID.
    registry: Arc<Registry>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
}

impl SubscriptionManager {
    pub fn new(feed: Arc<dyn ChangeFeedSource>) -> Self {
        Self {
            feed,
            registry: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Open a feed for `query` and deliver each snapshot, decoded, to
    /// `on_snapshot`.
    ///
    /// Every delivery is the whole current view; callers replace their
    /// local copy with it. Documents that fail to decode are skipped. A
    /// feed error marks the subscription dead and is passed to `on_error`
    /// once; nothing is retried. Setup failures are returned directly.
    pub async fn open<T, D, S, E>(
        &self,
        key: SubscriptionKey,
        query: FeedQuery,
        decode: D,
        on_snapshot: S,
        on_error: E,
    ) -> Result<Subscription>
    where
        D: Fn(&Document) -> Result<T> + Send + Sync + 'static,
        S: Fn(Vec<T>) + Send + Sync + 'static,
        E: Fn(SyncError) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let gate = Arc::new(Gate::new());

        let sink_gate = Arc::clone(&gate);
        let sink_key = key.clone();
        let sink: FeedSink = Arc::new(move |event| {
            let _guard = sink_gate.delivery.lock();
            if !sink_gate.live.load(Ordering::SeqCst) {
                trace!(subscription = %id, "dropping delivery for closed subscription");
                return;
            }
            match event {
                FeedEvent::Snapshot(docs) => {
                    let items = docs
                        .iter()
                        .filter_map(|doc| match decode(doc) {
                            Ok(item) => Some(item),
                            Err(e) => {
                                warn!(subscription = %id, doc = %doc.id, error = %e, "skipping undecodable document");
                                None
                            }
                        })
                        .collect();
                    on_snapshot(items);
                }
                FeedEvent::Error(reason) => {
                    sink_gate.live.store(false, Ordering::SeqCst);
                    warn!(subscription = %id, key = %sink_key, %reason, "feed failed");
                    on_error(SyncError::Feed(reason));
                }
            }
        });

        let handle = match self.feed.subscribe(query, sink).await {
            Ok(handle) => handle,
            Err(e) => {
                gate.shut();
                return Err(match e {
                    SyncError::Feed(_) => e,
                    other => SyncError::Feed(other.to_string()),
                });
            }
        };

        self.registry.write().insert(id, key.clone());
        debug!(subscription = %id, key = %key, "subscription opened");

        Ok(Subscription {
            id,
            key,
            gate,
            feed: Mutex::new(Some(handle)),
            registry: Arc::downgrade(&self.registry),
        })
    }

    /// Subscriptions opened and not yet closed.
    pub fn active_count(&self) -> usize {
        self.registry.read().len()
    }

    /// Number of open subscriptions watching `key`.
    pub fn count_for(&self, key: &SubscriptionKey) -> usize {
        self.registry.read().values().filter(|k| *k == key).count()
    }
}
