//! Identity collaborator.
//!
//! Sign-in and session policy live outside this crate; the core only asks
//! who the current user is.

use crate::error::{Result, SyncError};
use crate::types::Identity;
use parking_lot::RwLock;

pub trait IdentityProvider: Send + Sync {
    /// The signed-in identity, if any.
    fn current_identity(&self) -> Option<Identity>;

    fn require_identity(&self) -> Result<Identity> {
        self.current_identity().ok_or(SyncError::NotAuthenticated)
    }
}

/// Holds whatever identity the external auth layer reported last.
#[derive(Default)]
pub struct SessionIdentity {
    current: RwLock<Option<Identity>>,
}

impl SessionIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(identity: Identity) -> Self {
        Self {
            current: RwLock::new(Some(identity)),
        }
    }

    pub fn set(&self, identity: Identity) {
        *self.current.write() = Some(identity);
    }

    pub fn clear(&self) {
        *self.current.write() = None;
    }
}

impl IdentityProvider for SessionIdentity {
    fn current_identity(&self) -> Option<Identity> {
        self.current.read().clone()
    }
}
