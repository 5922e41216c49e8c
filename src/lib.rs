//! # Geochat Sync
//!
//! Real-time synchronization core for a location-based social client:
//! two-party conversations and a shared set of photo markers on a map,
//! kept consistent across every connected client.
//!
//! ## Core Concepts
//!
//! - **Channels**: every pair of users shares one conversation, addressed
//!   by a symmetric id derived from both identities
//! - **Subscriptions**: live feeds that deliver whole snapshots and go
//!   silent the moment they are closed
//! - **Conversation index**: a per-user listing with last-message previews,
//!   refreshed as a side effect of sending
//! - **Annotations**: markers created in two phases (upload the photo, then
//!   publish the record) and deleted record-first
//!
//! Storage is delegated to injected collaborators: a [`ChangeFeedSource`]
//! for documents and an [`AssetStore`] for binary assets.
//!
//! ## Example
//!
//! ```ignore
//! use geochat_sync::{MemoryFeedSource, SessionIdentity, SyncClient, SyncConfig};
//!
//! let me = Identity::new("jolin@example.com")?;
//! let client = SyncClient::with_local_assets(
//!     SyncConfig::default(),
//!     Arc::new(SessionIdentity::signed_in(me)),
//!     Arc::new(MemoryFeedSource::new()),
//! )?;
//!
//! let peer = Identity::new("sam@example.com")?;
//! let _chat = client
//!     .stream_messages(&peer, |messages| render(messages), |err| show(err))
//!     .await?;
//! client.send_message(&peer, "See you at the pier").await?;
//! ```

pub mod addressing;
pub mod annotations;
pub mod assets;
pub mod client;
pub mod config;
pub mod conversations;
pub mod error;
pub mod feed;
pub mod identity;
pub mod index;
pub mod subscriptions;
pub mod types;
pub mod users;

// Re-exports
pub use addressing::{derive_channel_id, peer_in};
pub use annotations::{AllowAll, AnnotationStore, DeletePolicy, DeletedAnnotation, NewAnnotation, OwnerOnly};
pub use assets::{fresh_key, Asset, AssetStore, FsAssetStore};
pub use client::SyncClient;
pub use config::{AssetStoreConfig, CollectionLayout, SyncConfig};
pub use conversations::{ConversationStore, MessageView, PendingMessage, SentMessage, ViewEntry};
pub use error::{Result, SyncError};
pub use feed::{
    ChangeFeedSource, CollectionPath, DeliveryMode, Direction, Document, DocumentPath, FeedEvent,
    FeedHandle, FeedQuery, FeedSink, MemoryFeedSource, Order,
};
pub use identity::{IdentityProvider, SessionIdentity};
pub use index::{sort_by_recency, ConversationIndex};
pub use subscriptions::{
    Subscription, SubscriptionId, SubscriptionKey, SubscriptionManager, SubscriptionSlot,
};
pub use types::*;
pub use users::UserDirectory;
