//! Shared map annotations.
//!
//! Creating a marker is two writes: the photo goes to the [`AssetStore`]
//! first, then the marker record referencing it is published to the feed.
//! A failed upload publishes nothing. A failed publish leaves the uploaded
//! asset behind and reports it in [`SyncError::PartialWorkflow`]; sweeping
//! unreferenced assets is left to the asset service.
//!
//! Deleting runs the other way round: the record goes first and decides
//! the outcome, the asset is removed best-effort afterwards.

use crate::assets::{fresh_key, AssetStore};
use crate::config::CollectionLayout;
use crate::error::{Result, SyncError};
use crate::feed::{ChangeFeedSource, Document, DocumentPath, FeedQuery};
use crate::subscriptions::{Subscription, SubscriptionKey, SubscriptionManager};
use crate::types::{Annotation, AnnotationId, AssetUrl, Coordinate, Identity};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Decides who may delete a marker.
pub trait DeletePolicy: Send + Sync {
    fn can_delete(&self, owner: &Identity, requester: &Identity) -> bool;
}

/// Anyone may delete any marker.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

impl DeletePolicy for AllowAll {
    fn can_delete(&self, _owner: &Identity, _requester: &Identity) -> bool {
        true
    }
}

/// Only the marker's owner may delete it.
#[derive(Clone, Copy, Debug, Default)]
pub struct OwnerOnly;

impl DeletePolicy for OwnerOnly {
    fn can_delete(&self, owner: &Identity, requester: &Identity) -> bool {
        owner == requester
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotationRecord {
    coordinate: Coordinate,
    asset_ref: AssetUrl,
    owner_id: Identity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
}

fn decode_annotation(doc: &Document) -> Result<Annotation> {
    let record: AnnotationRecord = doc.decode()?;
    Ok(Annotation {
        id: AnnotationId(doc.id.clone()),
        coordinate: record.coordinate,
        asset_ref: record.asset_ref,
        owner_id: record.owner_id,
        title: record.title,
        description: record.description,
    })
}

/// Input for [`AnnotationStore::create_annotation`].
#[derive(Clone, Debug)]
pub struct NewAnnotation {
    pub coordinate: Coordinate,
    pub content: Vec<u8>,
    pub content_type: String,
    pub title: Option<String>,
    pub description: Option<String>,
}

impl NewAnnotation {
    pub fn photo(coordinate: Coordinate, content: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            coordinate,
            content,
            content_type: content_type.into(),
            title: None,
            description: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Outcome of [`AnnotationStore::delete_annotation`].
#[derive(Clone, Debug)]
pub struct DeletedAnnotation {
    pub annotation: Annotation,
    /// False if the asset was already gone or its removal failed.
    pub asset_removed: bool,
}

/// Shared map annotations: photo upload, record publishing, live markers
/// and owner-checked deletion.
pub struct AnnotationStore {
    feed: Arc<dyn ChangeFeedSource>,
    assets: Arc<dyn AssetStore>,
    subscriptions: Arc<SubscriptionManager>,
    layout: CollectionLayout,
    policy: Arc<dyn DeletePolicy>,
}

impl AnnotationStore {
    /// Create a store that lets anyone delete any marker. Use
    /// [`with_policy`](Self::with_policy) to restrict that.
    pub fn new(
        feed: Arc<dyn ChangeFeedSource>,
        assets: Arc<dyn AssetStore>,
        subscriptions: Arc<SubscriptionManager>,
        layout: CollectionLayout,
    ) -> Self {
        Self {
            feed,
            assets,
            subscriptions,
            layout,
            policy: Arc::new(AllowAll),
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn DeletePolicy>) -> Self {
        self.policy = policy;
        self
    }

    fn record_path(&self, id: &str) -> Result<DocumentPath> {
        self.layout.annotations()?.doc(id)
    }

    /// Watch every marker, ordered by id.
    pub async fn stream_annotations<S, E>(&self, on_snapshot: S, on_error: E) -> Result<Subscription>
    where
        S: Fn(Vec<Annotation>) + Send + Sync + 'static,
        E: Fn(SyncError) + Send + Sync + 'static,
    {
        let query = FeedQuery::new(self.layout.annotations()?);
        self.subscriptions
            .open(
                SubscriptionKey::Annotations,
                query,
                decode_annotation,
                on_snapshot,
                on_error,
            )
            .await
    }

    /// One-shot read of every marker.
    pub async fn load_annotations(&self) -> Result<Vec<Annotation>> {
        let query = FeedQuery::new(self.layout.annotations()?);
        let docs = self.feed.get_all(&query).await?;
        docs.iter().map(decode_annotation).collect()
    }

    /// Upload the photo, then publish a marker referencing it.
    ///
    /// The marker id is the asset key: a microsecond timestamp plus a random
    /// UUID, so concurrent creators never pick the same id.
    pub async fn create_annotation(&self, owner: &Identity, new: NewAnnotation) -> Result<Annotation> {
        new.coordinate.validate()?;
        let key = fresh_key();
        let path = self.record_path(&key)?;

        let asset = self
            .assets
            .upload(&key, &new.content, &new.content_type)
            .await
            .map_err(|e| match e {
                SyncError::Asset(_) => e,
                other => SyncError::Asset(other.to_string()),
            })?;
        debug!(%asset, "annotation asset uploaded");

        let record = AnnotationRecord {
            coordinate: new.coordinate,
            asset_ref: asset.clone(),
            owner_id: owner.clone(),
            title: new.title,
            description: new.description,
        };

        match self.publish(&path, &record).await {
            Ok(doc) => {
                info!(annotation = %key, owner = %owner, "annotation published");
                decode_annotation(&doc)
            }
            Err(e) => {
                warn!(%asset, error = %e, "annotation publish failed; asset left orphaned");
                Err(SyncError::PartialWorkflow {
                    asset,
                    source: Box::new(e),
                })
            }
        }
    }

    async fn publish(&self, path: &DocumentPath, record: &AnnotationRecord) -> Result<Document> {
        let value = serde_json::to_value(record)?;
        self.feed.write(path, value).await.map_err(|e| match e {
            SyncError::Write { .. } => e,
            other => SyncError::write(path, other),
        })
    }

    /// Remove a marker on behalf of `requester`, then try to remove its
    /// photo. Once the record is gone the delete counts as done.
    pub async fn delete_annotation(
        &self,
        id: &AnnotationId,
        requester: &Identity,
    ) -> Result<DeletedAnnotation> {
        let path = self.record_path(id.as_str())?;
        let doc = self
            .feed
            .get(&path)
            .await?
            .ok_or_else(|| SyncError::AnnotationNotFound(id.to_string()))?;
        let annotation = decode_annotation(&doc)?;

        if !self.policy.can_delete(&annotation.owner_id, requester) {
            return Err(SyncError::Unauthorized {
                requester: requester.to_string(),
                owner: annotation.owner_id.to_string(),
            });
        }

        let removed = self.feed.delete(&path).await.map_err(|e| match e {
            SyncError::Write { .. } => e,
            other => SyncError::write(&path, other),
        })?;
        if !removed {
            // Someone else deleted it between our read and our delete.
            return Err(SyncError::AnnotationNotFound(id.to_string()));
        }
        info!(annotation = %id, requester = %requester, "annotation deleted");

        let asset_removed = match self.assets.delete(&annotation.asset_ref).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(asset = %annotation.asset_ref, error = %e, "asset cleanup failed");
                false
            }
        };

        Ok(DeletedAnnotation {
            annotation,
            asset_removed,
        })
    }
}
