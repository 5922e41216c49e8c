//! Directory of registered users, used to pick someone to chat with.

use crate::config::CollectionLayout;
use crate::error::{Result, SyncError};
use crate::feed::{ChangeFeedSource, Document, FeedQuery};
use crate::subscriptions::{Subscription, SubscriptionKey, SubscriptionManager};
use crate::types::{Identity, UserProfile};
use std::sync::Arc;
use tracing::debug;

fn decode_profile(doc: &Document) -> Result<UserProfile> {
    doc.decode()
}

/// Registered user profiles.
pub struct UserDirectory {
    feed: Arc<dyn ChangeFeedSource>,
    subscriptions: Arc<SubscriptionManager>,
    layout: CollectionLayout,
}

impl UserDirectory {
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

    /// Create or replace the profile, keyed by identity. Called once the
    /// external auth layer has signed a new user up.
    pub async fn register(&self, profile: &UserProfile) -> Result<()> {
        let path = self.layout.users()?.doc(profile.id.as_str())?;
        self.feed
            .write(&path, serde_json::to_value(profile)?)
            .await
            .map_err(|e| match e {
                SyncError::Write { .. } => e,
                other => SyncError::write(&path, other),
            })?;
        debug!(user = %profile.id, "user registered");
        Ok(())
    }

    /// Every registered user, ordered by identity.
    pub async fn list_users(&self) -> Result<Vec<UserProfile>> {
        let docs = self.feed.get_all(&FeedQuery::new(self.layout.users()?)).await?;
        docs.iter().map(decode_profile).collect()
    }

    /// Everyone except `me`.
    pub async fn list_peers(&self, me: &Identity) -> Result<Vec<UserProfile>> {
        let mut users = self.list_users().await?;
        users.retain(|u| &u.id != me);
        Ok(users)
    }

    pub async fn stream_users<S, E>(&self, on_snapshot: S, on_error: E) -> Result<Subscription>
    where
        S: Fn(Vec<UserProfile>) + Send + Sync + 'static,
        E: Fn(SyncError) + Send + Sync + 'static,
    {
        let query = FeedQuery::new(self.layout.users()?);
        self.subscriptions
            .open(SubscriptionKey::Users, query, decode_profile, on_snapshot, on_error)
            .await
    }
}
