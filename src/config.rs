//! Configuration for the synchronization core.

use crate::error::{Result, SyncError};
use crate::feed::CollectionPath;
use crate::types::{ChannelId, Identity};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub layout: CollectionLayout,
    pub assets: AssetStoreConfig,
}

impl SyncConfig {
    /// Parse from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| SyncError::Deserialization(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }
}

/// Names of the collections the core reads and writes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionLayout {
    /// Messages live at `{chats}/{channel}/messages`.
    pub chats: String,
    /// Listings live at `{user_chats}/{owner}/channels`.
    pub user_chats: String,
    pub annotations: String,
    pub users: String,
}

impl Default for CollectionLayout {
    fn default() -> Self {
        Self {
            chats: "chats".to_string(),
            user_chats: "userChats".to_string(),
            annotations: "annotations".to_string(),
            users: "users".to_string(),
        }
    }
}

impl CollectionLayout {
    pub fn messages(&self, channel: &ChannelId) -> Result<CollectionPath> {
        CollectionPath::root(&self.chats)?.child(channel.as_str(), "messages")
    }

    pub fn index(&self, owner: &Identity) -> Result<CollectionPath> {
        CollectionPath::root(&self.user_chats)?.child(owner.as_str(), "channels")
    }

    pub fn annotations(&self) -> Result<CollectionPath> {
        CollectionPath::root(&self.annotations)
    }

    pub fn users(&self) -> Result<CollectionPath> {
        CollectionPath::root(&self.users)
    }
}

/// Settings for [`crate::assets::FsAssetStore`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetStoreConfig {
    /// Base directory for assets.
    pub path: PathBuf,

    /// Read cache size (number of assets).
    pub cache_size: usize,

    /// Whether to create the directory if it doesn't exist.
    pub create_if_missing: bool,
}

impl Default for AssetStoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./assets"),
            cache_size: 64,
            create_if_missing: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addressing::derive_channel_id;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = SyncConfig::from_json(r#"{"layout": {"annotations": "markers"}}"#).unwrap();
        assert_eq!(config.layout.annotations, "markers");
        assert_eq!(config.layout.chats, "chats");
        assert_eq!(config.assets.cache_size, 64);
    }

    #[test]
    fn test_empty_json_is_default() {
        assert_eq!(SyncConfig::from_json("{}").unwrap(), SyncConfig::default());
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(
            SyncConfig::from_json("{"),
            Err(SyncError::Deserialization(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("sync.json");
        fs::write(&path, r#"{"assets": {"cache_size": 8}}"#).unwrap();
        let config = SyncConfig::load(&path).unwrap();
        assert_eq!(config.assets.cache_size, 8);
    }

    #[test]
    fn test_layout_paths() {
        let layout = CollectionLayout::default();
        let a = Identity::new("a@x.io").unwrap();
        let b = Identity::new("b@x.io").unwrap();
        let channel = derive_channel_id(&a, &b);
        assert_eq!(
            layout.messages(&channel).unwrap().as_str(),
            "chats/a@x.io|b@x.io/messages"
        );
        assert_eq!(layout.index(&a).unwrap().as_str(), "userChats/a@x.io/channels");
    }
}
