//! Change-feed collaborator.
//!
//! The synchronization core never talks to a concrete database. It consumes
//! a [`ChangeFeedSource`]: a document store that can push whole-collection
//! snapshots to subscribers and accept single-document writes.
//!
//! [`MemoryFeedSource`] is an in-process implementation used for tests and
//! local development.

mod memory;
mod types;

pub use memory::{DeliveryMode, MemoryFeedSource};
pub use types::{
    CollectionPath, Direction, Document, DocumentPath, FeedEvent, FeedQuery, FeedSink, Order,
};

use crate::error::Result;
use async_trait::async_trait;

/// Cancels one backend subscription.
pub trait FeedHandle: Send + Sync {
    /// Stop delivering to the sink. Safe to call more than once.
    fn cancel(&self);
}

/// A document store with live collection snapshots.
#[async_trait]
pub trait ChangeFeedSource: Send + Sync {
    /// Start watching a collection. The current contents are delivered as
    /// the first snapshot once setup completes, then again after every
    /// change.
    async fn subscribe(&self, query: FeedQuery, sink: FeedSink) -> Result<Box<dyn FeedHandle>>;

    /// Append a document under a store-assigned id.
    async fn add(&self, collection: &CollectionPath, data: serde_json::Value) -> Result<Document>;

    /// Create or replace the document at `path`.
    async fn write(&self, path: &DocumentPath, data: serde_json::Value) -> Result<Document>;

    /// Remove the document at `path`. Returns false if it did not exist.
    async fn delete(&self, path: &DocumentPath) -> Result<bool>;

    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>>;

    /// One-shot read of a collection.
    async fn get_all(&self, query: &FeedQuery) -> Result<Vec<Document>>;
}
