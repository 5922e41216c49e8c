//! Per-user conversation listing.
//!
//! Each user has one entry per peer they have exchanged messages with,
//! carrying a preview of the last message. Entries are written only by
//! [`crate::conversations::ConversationStore::send_message`].

use crate::addressing::derive_channel_id;
use crate::config::CollectionLayout;
use crate::error::{Result, SyncError};
use crate::feed::{ChangeFeedSource, Document, FeedQuery};
use crate::subscriptions::{Subscription, SubscriptionKey, SubscriptionManager};
use crate::types::{Identity, IndexEntry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Stored form of an index entry; `last_updated` comes from the store.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexRecord {
    owner_id: Identity,
    peer_id: Identity,
    last_message: String,
}

fn decode_entry(doc: &Document) -> Result<IndexEntry> {
    let record: IndexRecord = doc.decode()?;
    Ok(IndexEntry {
        channel_id: derive_channel_id(&record.owner_id, &record.peer_id),
        owner_id: record.owner_id,
        peer_id: record.peer_id,
        last_message: record.last_message,
        last_updated: doc.written_at,
    })
}

/// Per-user listing of conversations, one entry per peer.
pub struct ConversationIndex {
    feed: Arc<dyn ChangeFeedSource>,
    subscriptions: Arc<SubscriptionManager>,
    layout: CollectionLayout,
}

impl ConversationIndex {
    pub fn new(
        feed: Arc<dyn ChangeFeedSource>,
        subscriptions: Arc<SubscriptionManager>,
        layout: CollectionLayout,
    ) -> Self {
        Self {
            feed,
            subscriptions,
            layout,
        }
    }

    /// Watch `owner`'s listing. Snapshots are unordered; see
    /// [`sort_by_recency`].
    pub async fn stream_index<S, E>(
        &self,
        owner: &Identity,
        on_snapshot: S,
        on_error: E,
    ) -> Result<Subscription>
    where
        S: Fn(Vec<IndexEntry>) + Send + Sync + 'static,
        E: Fn(SyncError) + Send + Sync + 'static,
    {
        let query = FeedQuery::new(self.layout.index(owner)?);
        self.subscriptions
            .open(
                SubscriptionKey::Index(owner.clone()),
                query,
                decode_entry,
                on_snapshot,
                on_error,
            )
            .await
    }

    /// Create or refresh `owner`'s entry for `peer`.
    pub(crate) async fn upsert(
        &self,
        owner: &Identity,
        peer: &Identity,
        last_message: &str,
    ) -> Result<IndexEntry> {
        let channel = derive_channel_id(owner, peer);
        let path = self.layout.index(owner)?.doc(channel.as_str())?;
        let record = IndexRecord {
            owner_id: owner.clone(),
            peer_id: peer.clone(),
            last_message: last_message.to_string(),
        };
        let doc = self
            .feed
            .write(&path, serde_json::to_value(&record)?)
            .await
            .map_err(|e| match e {
                SyncError::Write { .. } => e,
                other => SyncError::write(&path, other),
            })?;
        decode_entry(&doc)
    }
}

/// Most recently updated first.
pub fn sort_by_recency(entries: &mut [IndexEntry]) {
    entries.sort_by(|a, b| {
        b.last_updated
            .cmp(&a.last_updated)
            .then_with(|| a.peer_id.cmp(&b.peer_id))
    });
}
