//! Shared fakes and helpers for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use crossbeam_channel::{unbounded, Receiver};
use geochat_sync::{
    Asset, AssetStore, AssetUrl, ChangeFeedSource, CollectionPath, Document, DocumentPath,
    FeedHandle, FeedQuery, FeedSink, Hash, Identity, MemoryFeedSource, Result, SessionIdentity,
    SyncClient, SyncConfig, SyncError,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn id(s: &str) -> Identity {
    Identity::new(s).unwrap()
}

/// Callback that forwards every delivery into a channel.
pub fn collector<T: Send + 'static>() -> (impl Fn(Vec<T>) + Send + Sync + 'static, Receiver<Vec<T>>) {
    let (tx, rx) = unbounded();
    (
        move |items: Vec<T>| {
            let _ = tx.send(items);
        },
        rx,
    )
}

pub fn error_collector() -> (impl Fn(SyncError) + Send + Sync + 'static, Receiver<SyncError>) {
    let (tx, rx) = unbounded();
    (
        move |err: SyncError| {
            let _ = tx.send(err);
        },
        rx,
    )
}

/// The most recent delivery, draining everything queued before it.
pub fn latest<T>(rx: &Receiver<Vec<T>>) -> Option<Vec<T>> {
    rx.try_iter().last()
}

/// [`MemoryFeedSource`] that can be told to fail writes or subscriptions,
/// or to stall before a listener attaches.
#[derive(Clone)]
pub struct FlakyFeed {
    pub inner: MemoryFeedSource,
    failing_prefixes: Arc<Mutex<Vec<String>>>,
    fail_subscribe: Arc<AtomicBool>,
    stalls: Arc<Mutex<Vec<(String, usize)>>>,
}

impl FlakyFeed {
    pub fn new(inner: MemoryFeedSource) -> Self {
        Self {
            inner,
            failing_prefixes: Arc::new(Mutex::new(Vec::new())),
            fail_subscribe: Arc::new(AtomicBool::new(false)),
            stalls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Yield to the runtime `turns` times before attaching a listener to
    /// any collection under `prefix`.
    pub fn stall_subscriptions_under(&self, prefix: &str, turns: usize) {
        self.stalls.lock().push((prefix.to_string(), turns));
    }

    /// Fail every write whose collection path starts with `prefix`.
    pub fn fail_writes_under(&self, prefix: &str) {
        self.failing_prefixes.lock().push(prefix.to_string());
    }

    pub fn heal(&self) {
        self.failing_prefixes.lock().clear();
        self.fail_subscribe.store(false, Ordering::SeqCst);
        self.stalls.lock().clear();
    }

    pub fn fail_subscriptions(&self) {
        self.fail_subscribe.store(true, Ordering::SeqCst);
    }

    fn check(&self, collection: &CollectionPath) -> Result<()> {
        let failing = self
            .failing_prefixes
            .lock()
            .iter()
            .any(|p| collection.as_str().starts_with(p.as_str()));
        if failing {
            Err(SyncError::write(collection, "injected failure"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ChangeFeedSource for FlakyFeed {
    async fn subscribe(&self, query: FeedQuery, sink: FeedSink) -> Result<Box<dyn FeedHandle>> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(SyncError::Feed("listener rejected".into()));
        }
        let turns = self
            .stalls
            .lock()
            .iter()
            .filter(|(p, _)| query.collection.as_str().starts_with(p.as_str()))
            .map(|(_, turns)| *turns)
            .max()
            .unwrap_or(0);
        for _ in 0..turns {
            tokio::task::yield_now().await;
        }
        self.inner.subscribe(query, sink).await
    }

    async fn add(&self, collection: &CollectionPath, data: serde_json::Value) -> Result<Document> {
        self.check(collection)?;
        self.inner.add(collection, data).await
    }

    async fn write(&self, path: &DocumentPath, data: serde_json::Value) -> Result<Document> {
        self.check(path.collection())?;
        self.inner.write(path, data).await
    }

    async fn delete(&self, path: &DocumentPath) -> Result<bool> {
        self.check(path.collection())?;
        self.inner.delete(path).await
    }

    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>> {
        self.inner.get(path).await
    }

    async fn get_all(&self, query: &FeedQuery) -> Result<Vec<Document>> {
        self.inner.get_all(query).await
    }
}

/// Asset store held in memory, with switchable failures.
#[derive(Clone, Default)]
pub struct MemoryAssets {
    assets: Arc<Mutex<HashMap<String, (Vec<u8>, String)>>>,
    fail_uploads: Arc<AtomicBool>,
    fail_deletes: Arc<AtomicBool>,
}

impl MemoryAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.assets.lock().len()
    }

    pub fn contains(&self, url: &AssetUrl) -> bool {
        self.assets.lock().contains_key(url.as_str())
    }
}

#[async_trait]
impl AssetStore for MemoryAssets {
    async fn upload(&self, key: &str, content: &[u8], content_type: &str) -> Result<AssetUrl> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(SyncError::Asset("upload refused".into()));
        }
        let url = AssetUrl(format!("mem://{}", key));
        self.assets
            .lock()
            .insert(url.0.clone(), (content.to_vec(), content_type.to_string()));
        Ok(url)
    }

    async fn delete(&self, url: &AssetUrl) -> Result<bool> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(SyncError::Asset("delete refused".into()));
        }
        Ok(self.assets.lock().remove(url.as_str()).is_some())
    }

    async fn fetch(&self, url: &AssetUrl) -> Result<Option<Asset>> {
        Ok(self.assets.lock().get(url.as_str()).map(|(content, content_type)| Asset {
            url: url.clone(),
            content: content.clone(),
            content_type: content_type.clone(),
            digest: Hash::from_bytes(content),
        }))
    }
}

/// Several clients sharing one backend, like devices talking to the same
/// hosted database.
pub struct Backend {
    pub memory: MemoryFeedSource,
    pub feed: FlakyFeed,
    pub assets: MemoryAssets,
}

impl Backend {
    pub fn new() -> Self {
        Self::over(MemoryFeedSource::new())
    }

    pub fn over(memory: MemoryFeedSource) -> Self {
        init_tracing();
        Self {
            feed: FlakyFeed::new(memory.clone()),
            memory,
            assets: MemoryAssets::new(),
        }
    }

    pub fn client(&self, email: &str) -> SyncClient {
        SyncClient::new(
            SyncConfig::default(),
            Arc::new(SessionIdentity::signed_in(id(email))),
            Arc::new(self.feed.clone()),
            Arc::new(self.assets.clone()),
        )
    }
}
