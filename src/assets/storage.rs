//! Filesystem asset store.

use super::{Asset, AssetStore};
use crate::config::AssetStoreConfig;
use crate::error::{Result, SyncError};
use crate::types::{AssetUrl, Hash};
use async_trait::async_trait;
use fs2::FileExt;
use lru::LruCache;
use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Magic bytes for asset files.
const ASSET_MAGIC: &[u8; 4] = b"AST\0";

/// Current asset format version.
const ASSET_VERSION: u8 = 1;

/// URL scheme for assets held by this store.
const URL_SCHEME: &str = "asset://";

/// Assets on local disk.
///
/// File layout: magic, version, content type (u16 length + bytes), SHA-256
/// digest, content (u64 length + bytes), CRC32 of content. The directory is
/// locked exclusively while the store is open.
pub struct FsAssetStore {
    /// Base directory for assets.
    path: PathBuf,

    /// Held for the store's lifetime.
    _lock_file: File,

    /// LRU cache for recently read assets.
    cache: Mutex<LruCache<String, Asset>>,
}

impl FsAssetStore {
    pub fn open(config: &AssetStoreConfig) -> Result<Self> {
        let path = config.path.clone();
        if !path.exists() {
            if !config.create_if_missing {
                return Err(SyncError::Io(std::io::Error::new(
                    ErrorKind::NotFound,
                    format!("asset directory {} does not exist", path.display()),
                )));
            }
            fs::create_dir_all(&path)?;
        }

        let lock_file = Self::acquire_lock(&path)?;
        let cache_size = NonZeroUsize::new(config.cache_size.max(1)).unwrap_or(NonZeroUsize::MIN);
        debug!(path = %path.display(), "asset store opened");

        Ok(Self {
            path,
            _lock_file: lock_file,
            cache: Mutex::new(LruCache::new(cache_size)),
        })
    }

    /// Store an asset under `key`. Keys are never overwritten.
    pub fn store(&self, key: &str, content: &[u8], content_type: &str) -> Result<AssetUrl> {
        validate_key(key)?;
        let asset_path = self.asset_path(key);
        if asset_path.exists() {
            return Err(SyncError::Asset(format!("asset key {} already in use", key)));
        }

        fs::create_dir_all(self.shard_path(key))?;

        // Write next to the final path, then rename into place.
        let tmp_path = asset_path.with_extension("tmp");
        let mut file = File::create(&tmp_path)?;

        // Write header
        file.write_all(ASSET_MAGIC)?;
        file.write_all(&[ASSET_VERSION])?;

        let content_type_bytes = content_type.as_bytes();
        let content_type_len = u16::try_from(content_type_bytes.len())
            .map_err(|_| SyncError::Asset("content type too long".into()))?;
        file.write_all(&content_type_len.to_le_bytes())?;
        file.write_all(content_type_bytes)?;

        let digest = Hash::from_bytes(content);
        file.write_all(&digest.0)?;

        // Write content
        file.write_all(&(content.len() as u64).to_le_bytes())?;
        file.write_all(content)?;

        // Write checksum
        file.write_all(&crc32fast::hash(content).to_le_bytes())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp_path, &asset_path)?;

        let url = AssetUrl(format!("{}{}", URL_SCHEME, key));
        self.cache.lock().put(
            key.to_string(),
            Asset {
                url: url.clone(),
                content: content.to_vec(),
                content_type: content_type.to_string(),
                digest,
            },
        );
        debug!(%url, bytes = content.len(), "asset stored");

        Ok(url)
    }

    /// Read an asset, verifying checksum and digest.
    pub fn get(&self, url: &AssetUrl) -> Result<Option<Asset>> {
        let key = key_of(url)?;

        if let Some(cached) = self.cache.lock().get(key).cloned() {
            return Ok(Some(cached));
        }

        let asset_path = self.asset_path(key);
        let mut file = match File::open(&asset_path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        // Read and verify magic
        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != ASSET_MAGIC {
            return Err(SyncError::InvalidFormat("Invalid asset magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != ASSET_VERSION {
            return Err(SyncError::InvalidFormat(format!(
                "Unsupported asset version: {}",
                version[0]
            )));
        }

        // Declared lengths must agree with the file size before anything
        // is allocated from them.
        let file_len = file.metadata()?.len();

        let mut content_type_len_bytes = [0u8; 2];
        file.read_exact(&mut content_type_len_bytes)?;
        let content_type_len = u16::from_le_bytes(content_type_len_bytes) as u64;
        let header_len = 4 + 1 + 2 + content_type_len + 32 + 8;
        if header_len + 4 > file_len {
            return Err(SyncError::InvalidFormat(
                "Asset header exceeds file size".into(),
            ));
        }
        let mut content_type_bytes = vec![0u8; content_type_len as usize];
        file.read_exact(&mut content_type_bytes)?;
        let content_type = String::from_utf8_lossy(&content_type_bytes).into_owned();

        let mut digest_bytes = [0u8; 32];
        file.read_exact(&mut digest_bytes)?;
        let digest = Hash(digest_bytes);

        let mut content_len_bytes = [0u8; 8];
        file.read_exact(&mut content_len_bytes)?;
        let content_len = u64::from_le_bytes(content_len_bytes);
        if content_len != file_len - header_len - 4 {
            return Err(SyncError::InvalidFormat(format!(
                "Asset declares {} content bytes, file holds {}",
                content_len,
                file_len - header_len - 4
            )));
        }
        let content_len = usize::try_from(content_len)
            .map_err(|_| SyncError::InvalidFormat("Asset too large for this platform".into()))?;
        let mut content = vec![0u8; content_len];
        file.read_exact(&mut content)?;

        let mut checksum_bytes = [0u8; 4];
        file.read_exact(&mut checksum_bytes)?;
        let stored_checksum = u32::from_le_bytes(checksum_bytes);
        let computed_checksum = crc32fast::hash(&content);
        if stored_checksum != computed_checksum {
            return Err(SyncError::ChecksumMismatch {
                expected: stored_checksum,
                got: computed_checksum,
            });
        }

        let computed_digest = Hash::from_bytes(&content);
        if computed_digest != digest {
            return Err(SyncError::HashMismatch {
                expected: digest,
                got: computed_digest,
            });
        }

        let asset = Asset {
            url: url.clone(),
            content,
            content_type,
            digest,
        };
        self.cache.lock().put(key.to_string(), asset.clone());

        Ok(Some(asset))
    }

    pub fn exists(&self, url: &AssetUrl) -> bool {
        match key_of(url) {
            Ok(key) => self.cache.lock().contains(key) || self.asset_path(key).exists(),
            Err(_) => false,
        }
    }

    pub fn remove(&self, url: &AssetUrl) -> Result<bool> {
        let key = key_of(url)?;
        self.cache.lock().pop(key);

        match fs::remove_file(self.asset_path(key)) {
            Ok(()) => {
                debug!(%url, "asset removed");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// List every stored asset.
    pub fn list(&self) -> Result<Vec<AssetUrl>> {
        let mut urls = Vec::new();

        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            for asset_entry in fs::read_dir(entry.path())? {
                let asset_entry = asset_entry?;
                let filename = asset_entry.file_name();
                let filename = filename.to_string_lossy();
                if validate_key(&filename).is_ok() {
                    urls.push(AssetUrl(format!("{}{}", URL_SCHEME, filename)));
                }
            }
        }

        Ok(urls)
    }

    /// Total bytes on disk.
    pub fn total_size(&self) -> Result<u64> {
        let mut total = 0u64;

        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                for asset_entry in fs::read_dir(entry.path())? {
                    total += asset_entry?.metadata()?.len();
                }
            }
        }

        Ok(total)
    }

    fn shard_path(&self, key: &str) -> PathBuf {
        self.path.join(Hash::from_bytes(key.as_bytes()).shard_prefix())
    }

    fn asset_path(&self, key: &str) -> PathBuf {
        self.shard_path(key).join(key)
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_file = File::create(path.join("LOCK"))?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| SyncError::Locked)?;

        Ok(lock_file)
    }
}

#[async_trait]
impl AssetStore for FsAssetStore {
    async fn upload(&self, key: &str, content: &[u8], content_type: &str) -> Result<AssetUrl> {
        self.store(key, content, content_type)
    }

    async fn delete(&self, url: &AssetUrl) -> Result<bool> {
        self.remove(url)
    }

    async fn fetch(&self, url: &AssetUrl) -> Result<Option<Asset>> {
        self.get(url)
    }
}

/// Keys become file names: ASCII alphanumerics, `-`, `_` only.
fn validate_key(key: &str) -> Result<()> {
    let ok = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(SyncError::Asset(format!("invalid asset key {:?}", key)))
    }
}

fn key_of(url: &AssetUrl) -> Result<&str> {
    let key = url
        .as_str()
        .strip_prefix(URL_SCHEME)
        .ok_or_else(|| SyncError::AssetNotFound(url.to_string()))?;
    validate_key(key)?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> FsAssetStore {
        FsAssetStore::open(&AssetStoreConfig {
            path: dir.path().join("assets"),
            cache_size: 16,
            create_if_missing: true,
        })
        .unwrap()
    }

    #[test]
    fn test_store_and_retrieve() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let url = store.store("photo-1", b"\xff\xd8jpeg", "image/jpeg").unwrap();
        assert_eq!(url.as_str(), "asset://photo-1");

        let asset = store.get(&url).unwrap().unwrap();
        assert_eq!(asset.content, b"\xff\xd8jpeg");
        assert_eq!(asset.content_type, "image/jpeg");
        assert_eq!(asset.digest, Hash::from_bytes(b"\xff\xd8jpeg"));
    }

    #[test]
    fn test_read_from_disk_after_reopen() {
        let dir = TempDir::new().unwrap();
        let url = {
            let store = open_store(&dir);
            store.store("photo-2", b"pixels", "image/png").unwrap()
        };

        let store = open_store(&dir);
        let asset = store.get(&url).unwrap().unwrap();
        assert_eq!(asset.content, b"pixels");
    }

    #[test]
    fn test_keys_are_not_overwritten() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.store("dup", b"one", "text/plain").unwrap();
        let second = store.store("dup", b"two", "text/plain");
        assert!(matches!(second, Err(SyncError::Asset(_))));
    }

    #[test]
    fn test_rejects_unsafe_keys() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        assert!(store.store("../escape", b"x", "text/plain").is_err());
        assert!(store.store("", b"x", "text/plain").is_err());
    }

    #[test]
    fn test_remove() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let url = store.store("gone", b"bytes", "text/plain").unwrap();
        assert!(store.exists(&url));
        assert!(store.remove(&url).unwrap());
        assert!(!store.exists(&url));
        assert!(!store.remove(&url).unwrap());
        assert!(store.get(&url).unwrap().is_none());
    }

    #[test]
    fn test_list() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let a = store.store("a1", b"1", "text/plain").unwrap();
        let b = store.store("b2", b"2", "text/plain").unwrap();

        let urls = store.list().unwrap();
        assert_eq!(urls.len(), 2);
        assert!(urls.contains(&a));
        assert!(urls.contains(&b));
        assert!(store.total_size().unwrap() > 0);
    }

    #[test]
    fn test_corruption_detected() {
        let dir = TempDir::new().unwrap();
        let url = {
            let store = open_store(&dir);
            store.store("bitrot", b"original", "text/plain").unwrap()
        };

        let store = open_store(&dir);
        let path = store.asset_path("bitrot");
        let mut raw = fs::read(&path).unwrap();
        let len = raw.len();
        raw[len - 6] ^= 0xff;
        fs::write(&path, raw).unwrap();

        assert!(matches!(
            store.get(&url),
            Err(SyncError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_corrupted_length_rejected() {
        let dir = TempDir::new().unwrap();
        let url = {
            let store = open_store(&dir);
            store.store("truncated", b"original", "text/plain").unwrap()
        };

        let store = open_store(&dir);
        let path = store.asset_path("truncated");
        let mut raw = fs::read(&path).unwrap();
        let len_at = 4 + 1 + 2 + "text/plain".len() + 32;
        raw[len_at..len_at + 8].copy_from_slice(&u64::MAX.to_le_bytes());
        fs::write(&path, &raw).unwrap();
        assert!(matches!(store.get(&url), Err(SyncError::InvalidFormat(_))));

        // A file cut short inside the header.
        fs::write(&path, &raw[..20]).unwrap();
        assert!(matches!(store.get(&url), Err(SyncError::InvalidFormat(_))));
    }

    #[test]
    fn test_second_open_is_locked() {
        let dir = TempDir::new().unwrap();
        let _store = open_store(&dir);

        let second = FsAssetStore::open(&AssetStoreConfig {
            path: dir.path().join("assets"),
            cache_size: 16,
            create_if_missing: true,
        });
        assert!(matches!(second, Err(SyncError::Locked)));
    }

    #[test]
    fn test_missing_directory_without_create() {
        let dir = TempDir::new().unwrap();
        let result = FsAssetStore::open(&AssetStoreConfig {
            path: dir.path().join("nope"),
            cache_size: 16,
            create_if_missing: false,
        });
        assert!(matches!(result, Err(SyncError::Io(_))));
    }

    #[test]
    fn test_foreign_url() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let foreign = AssetUrl("https://example.com/p.jpg".into());
        assert!(matches!(store.get(&foreign), Err(SyncError::AssetNotFound(_))));
        assert!(!store.exists(&foreign));
    }
}
