//! Conversation store.

use crate::addressing::derive_channel_id;
use crate::config::CollectionLayout;
use crate::error::{Result, SyncError};
use crate::feed::{ChangeFeedSource, Direction, Document, FeedQuery, Order};
use crate::index::ConversationIndex;
use crate::subscriptions::{Subscription, SubscriptionKey, SubscriptionManager};
use crate::types::{ChannelId, Identity, Message, MessageId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Stored form of a message; id and creation time come from the store.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageRecord {
    sender_id: Identity,
    text: String,
    channel_id: ChannelId,
}

fn decode_message(doc: &Document) -> Result<Message> {
    let record: MessageRecord = doc.decode()?;
    Ok(Message {
        id: MessageId(doc.id.clone()),
        sender_id: record.sender_id,
        text: record.text,
        created_at: doc.written_at,
        channel_id: record.channel_id,
    })
}

/// Outcome of [`ConversationStore::send_message`].
#[derive(Clone, Debug)]
pub struct SentMessage {
    pub message: Message,
    /// Participants whose listing could not be updated. The message itself
    /// is stored regardless.
    pub stale_index_owners: Vec<Identity>,
}

impl SentMessage {
    pub fn index_updated(&self) -> bool {
        self.stale_index_owners.is_empty()
    }
}

/// Streams and appends two-party conversations.
///
/// A send is three independent writes: the message append, then one index
/// upsert per participant. Only the append decides success; an upsert that
/// fails afterwards is logged and reported in [`SentMessage`], and nothing
/// is rolled back.
pub struct ConversationStore {
    feed: Arc<dyn ChangeFeedSource>,
    subscriptions: Arc<SubscriptionManager>,
    index: Arc<ConversationIndex>,
    layout: CollectionLayout,
}

impl ConversationStore {
    pub fn new(
        feed: Arc<dyn ChangeFeedSource>,
        subscriptions: Arc<SubscriptionManager>,
        index: Arc<ConversationIndex>,
        layout: CollectionLayout,
    ) -> Self {
        Self {
            feed,
            subscriptions,
            index,
            layout,
        }
    }

    /// Subscription key for the conversation between `me` and `peer`.
    pub fn channel_key(me: &Identity, peer: &Identity) -> SubscriptionKey {
        SubscriptionKey::Channel(derive_channel_id(me, peer))
    }

    fn query(&self, channel: &ChannelId) -> Result<FeedQuery> {
        Ok(FeedQuery::new(self.layout.messages(channel)?)
            .ordered(Order::WrittenAt(Direction::Descending)))
    }

    /// Watch the conversation with `peer`, newest message first.
    pub async fn stream_messages<S, E>(
        &self,
        me: &Identity,
        peer: &Identity,
        on_snapshot: S,
        on_error: E,
    ) -> Result<Subscription>
    where
        S: Fn(Vec<Message>) + Send + Sync + 'static,
        E: Fn(SyncError) + Send + Sync + 'static,
    {
        let channel = derive_channel_id(me, peer);
        let query = self.query(&channel)?;
        self.subscriptions
            .open(
                SubscriptionKey::Channel(channel),
                query,
                decode_message,
                on_snapshot,
                on_error,
            )
            .await
    }

    /// One-shot read of the conversation, newest first.
    pub async fn load_messages(&self, me: &Identity, peer: &Identity) -> Result<Vec<Message>> {
        let channel = derive_channel_id(me, peer);
        let docs = self.feed.get_all(&self.query(&channel)?).await?;
        docs.iter().map(decode_message).collect()
    }

    /// Append `text` from `me` to the conversation with `peer`, then
    /// refresh both participants' listings.
    pub async fn send_message(
        &self,
        me: &Identity,
        peer: &Identity,
        text: &str,
    ) -> Result<SentMessage> {
        if text.trim().is_empty() {
            return Err(SyncError::InvalidMessage("message text is empty".into()));
        }

        let channel = derive_channel_id(me, peer);
        let collection = self.layout.messages(&channel)?;
        let record = MessageRecord {
            sender_id: me.clone(),
            text: text.to_string(),
            channel_id: channel.clone(),
        };

        let doc = self
            .feed
            .add(&collection, serde_json::to_value(&record)?)
            .await
            .map_err(|e| match e {
                SyncError::Write { .. } => e,
                other => SyncError::write(&collection, other),
            })?;
        let message = decode_message(&doc)?;
        debug!(channel = %channel, message = %doc.id, "message appended");

        let mut stale_index_owners = Vec::new();
        let mut targets = vec![(me, peer)];
        if me != peer {
            targets.push((peer, me));
        }
        for (owner, other) in targets {
            if let Err(e) = self.index.upsert(owner, other, text).await {
                warn!(
                    channel = %channel,
                    owner = %owner,
                    error = %e,
                    "conversation index update failed; message already sent"
                );
                stale_index_owners.push(owner.clone());
            }
        }

        Ok(SentMessage {
            message,
            stale_index_owners,
        })
    }
}
