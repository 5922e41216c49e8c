//! Asset (binary blob) collaborator.
//!
//! Photos attached to annotations are uploaded here first; the annotation
//! record only carries the returned [`AssetUrl`].
//!
//! [`FsAssetStore`] keeps assets on local disk, sharded into directories by
//! the first byte of the key's hash (like Git objects).

mod storage;

pub use storage::FsAssetStore;

use crate::error::Result;
use crate::types::{AssetUrl, Hash, Timestamp};
use async_trait::async_trait;

/// A stored asset.
#[derive(Clone, Debug, PartialEq)]
pub struct Asset {
    pub url: AssetUrl,
    pub content: Vec<u8>,
    pub content_type: String,
    pub digest: Hash,
}

/// Blob storage used by the annotation workflow.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Store `content` under `key`, returning a durable reference.
    async fn upload(&self, key: &str, content: &[u8], content_type: &str) -> Result<AssetUrl>;

    /// Remove an asset. Returns false if it did not exist.
    async fn delete(&self, url: &AssetUrl) -> Result<bool>;

    async fn fetch(&self, url: &AssetUrl) -> Result<Option<Asset>>;
}

/// A fresh asset key: microsecond timestamp plus a random v4 UUID, so keys
/// sort roughly by creation time and concurrent clients don't collide.
pub fn fresh_key() -> String {
    format!(
        "{:016x}-{}",
        Timestamp::now().0,
        uuid::Uuid::new_v4().simple()
    )
}
