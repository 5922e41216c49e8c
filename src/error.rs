//! Error types for the synchronization core.

use crate::types::{AssetUrl, Hash};
use thiserror::Error;

/// Main error type for sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("Invalid path segment: {0:?}")]
    InvalidPath(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Invalid coordinate: lat={lat}, lng={lng}")]
    InvalidCoordinate { lat: f64, lng: f64 },

    #[error("No signed-in identity")]
    NotAuthenticated,

    /// Subscription setup or mid-stream failure. The subscription is dead
    /// and has to be reopened by the caller.
    #[error("Feed error: {0}")]
    Feed(String),

    /// A single document write (append, upsert, publish or delete) failed.
    #[error("Write to {path} failed: {reason}")]
    Write { path: String, reason: String },

    /// The asset service rejected an upload or delete.
    #[error("Asset error: {0}")]
    Asset(String),

    /// Second phase of a two-phase create failed. The asset from the first
    /// phase is left in place.
    #[error("Asset {asset} uploaded but publish failed: {source}")]
    PartialWorkflow {
        asset: AssetUrl,
        #[source]
        source: Box<SyncError>,
    },

    #[error("Annotation not found: {0}")]
    AnnotationNotFound(String),

    #[error("{requester} may not delete an annotation owned by {owner}")]
    Unauthorized { requester: String, owner: String },

    #[error("Asset not found: {0}")]
    AssetNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Asset store is locked by another process")]
    Locked,

    #[error("Invalid asset format: {0}")]
    InvalidFormat(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Hash mismatch: expected {expected}, got {got}")]
    HashMismatch { expected: Hash, got: Hash },
}

impl SyncError {
    /// Build a write failure for a document path.
    pub fn write(path: impl ToString, reason: impl ToString) -> Self {
        SyncError::Write {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }

    /// True for failures of the initiating write itself (not validation).
    pub fn is_write_failure(&self) -> bool {
        matches!(
            self,
            SyncError::Write { .. } | SyncError::Asset(_) | SyncError::PartialWorkflow { .. }
        )
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Serialization(e.to_string())
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
