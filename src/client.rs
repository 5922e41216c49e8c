//! Facade tying the stores together for the signed-in user.

use crate::addressing::derive_channel_id;
use crate::annotations::{AnnotationStore, DeletePolicy, DeletedAnnotation, NewAnnotation};
use crate::assets::{AssetStore, FsAssetStore};
use crate::config::SyncConfig;
use crate::conversations::{ConversationStore, SentMessage};
use crate::error::{Result, SyncError};
use crate::feed::ChangeFeedSource;
use crate::identity::IdentityProvider;
use crate::index::ConversationIndex;
use crate::subscriptions::{Subscription, SubscriptionManager, SubscriptionSlot};
use crate::types::{Annotation, AnnotationId, ChannelId, Identity, IndexEntry, Message, UserProfile};
use crate::users::UserDirectory;
use std::sync::Arc;

/// Entry point for a client application.
///
/// Collaborators are injected, so tests can swap in in-memory fakes. The
/// operations here act as the current identity from the
/// [`IdentityProvider`] and fail with [`SyncError::NotAuthenticated`] when
/// nobody is signed in. The underlying stores take identities explicitly.
pub struct SyncClient {
    config: SyncConfig,
    identity: Arc<dyn IdentityProvider>,
    subscriptions: Arc<SubscriptionManager>,
    index: Arc<ConversationIndex>,
    conversations: ConversationStore,
    annotations: AnnotationStore,
    users: UserDirectory,
}

impl SyncClient {
    pub fn new(
        config: SyncConfig,
        identity: Arc<dyn IdentityProvider>,
        feed: Arc<dyn ChangeFeedSource>,
        assets: Arc<dyn AssetStore>,
    ) -> Self {
        let layout = config.layout.clone();
        let subscriptions = Arc::new(SubscriptionManager::new(Arc::clone(&feed)));
        let index = Arc::new(ConversationIndex::new(
            Arc::clone(&feed),
            Arc::clone(&subscriptions),
            layout.clone(),
        ));
        let conversations = ConversationStore::new(
            Arc::clone(&feed),
            Arc::clone(&subscriptions),
            Arc::clone(&index),
            layout.clone(),
        );
        let annotations = AnnotationStore::new(
            Arc::clone(&feed),
            assets,
            Arc::clone(&subscriptions),
            layout.clone(),
        );
        let users = UserDirectory::new(feed, Arc::clone(&subscriptions), layout);

        Self {
            config,
            identity,
            subscriptions,
            index,
            conversations,
            annotations,
            users,
        }
    }

    /// Build a client whose assets live in an [`FsAssetStore`] opened from
    /// `config.assets`.
    pub fn with_local_assets(
        config: SyncConfig,
        identity: Arc<dyn IdentityProvider>,
        feed: Arc<dyn ChangeFeedSource>,
    ) -> Result<Self> {
        let assets = Arc::new(FsAssetStore::open(&config.assets)?);
        Ok(Self::new(config, identity, feed, assets))
    }

    pub fn with_delete_policy(mut self, policy: Arc<dyn DeletePolicy>) -> Self {
        self.annotations = self.annotations.with_policy(policy);
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    pub fn annotations(&self) -> &AnnotationStore {
        &self.annotations
    }

    pub fn index(&self) -> &ConversationIndex {
        &self.index
    }

    pub fn users(&self) -> &UserDirectory {
        &self.users
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.subscriptions
    }

    /// The signed-in identity.
    pub fn me(&self) -> Result<Identity> {
        self.identity.require_identity()
    }

    /// Channel id of the conversation with `peer`, without subscribing.
    pub fn channel_with(&self, peer: &Identity) -> Result<ChannelId> {
        Ok(derive_channel_id(&self.me()?, peer))
    }

    // --- Conversations ---

    pub async fn send_message(&self, peer: &Identity, text: &str) -> Result<SentMessage> {
        let me = self.me()?;
        self.conversations.send_message(&me, peer, text).await
    }

    pub async fn stream_messages<S, E>(
        &self,
        peer: &Identity,
        on_snapshot: S,
        on_error: E,
    ) -> Result<Subscription>
    where
        S: Fn(Vec<Message>) + Send + Sync + 'static,
        E: Fn(SyncError) + Send + Sync + 'static,
    {
        let me = self.me()?;
        self.conversations
            .stream_messages(&me, peer, on_snapshot, on_error)
            .await
    }

    /// Point a chat screen's slot at the conversation with `peer`. The
    /// previous conversation's feed is closed first. Returns whether a feed
    /// was opened.
    ///
    /// Reopening the same peer while its subscription is live keeps that
    /// subscription and drops `on_snapshot` and `on_error` unused; deliveries
    /// keep going to the callbacks it was first opened with. Call
    /// [`SubscriptionSlot::clear`] first to rebind a remounted view.
    pub async fn watch_chat<S, E>(
        &self,
        slot: &SubscriptionSlot,
        peer: &Identity,
        on_snapshot: S,
        on_error: E,
    ) -> Result<bool>
    where
        S: Fn(Vec<Message>) + Send + Sync + 'static,
        E: Fn(SyncError) + Send + Sync + 'static,
    {
        let me = self.me()?;
        let key = ConversationStore::channel_key(&me, peer);
        slot.switch(key, || {
            self.conversations
                .stream_messages(&me, peer, on_snapshot, on_error)
        })
        .await
    }

    pub async fn stream_index<S, E>(&self, on_snapshot: S, on_error: E) -> Result<Subscription>
    where
        S: Fn(Vec<IndexEntry>) + Send + Sync + 'static,
        E: Fn(SyncError) + Send + Sync + 'static,
    {
        let me = self.me()?;
        self.index.stream_index(&me, on_snapshot, on_error).await
    }

    // --- Annotations ---

    pub async fn stream_annotations<S, E>(&self, on_snapshot: S, on_error: E) -> Result<Subscription>
    where
        S: Fn(Vec<Annotation>) + Send + Sync + 'static,
        E: Fn(SyncError) + Send + Sync + 'static,
    {
        self.annotations.stream_annotations(on_snapshot, on_error).await
    }

    pub async fn create_annotation(&self, new: NewAnnotation) -> Result<Annotation> {
        let me = self.me()?;
        self.annotations.create_annotation(&me, new).await
    }

    pub async fn delete_annotation(&self, id: &AnnotationId) -> Result<DeletedAnnotation> {
        let me = self.me()?;
        self.annotations.delete_annotation(id, &me).await
    }

    // --- Users ---

    /// Add the signed-in user to the directory.
    pub async fn register_me(&self, display_name: Option<String>) -> Result<UserProfile> {
        let profile = UserProfile {
            id: self.me()?,
            display_name,
        };
        self.users.register(&profile).await?;
        Ok(profile)
    }

    /// Everyone the signed-in user could start a chat with.
    pub async fn list_peers(&self) -> Result<Vec<UserProfile>> {
        let me = self.me()?;
        self.users.list_peers(&me).await
    }
}
