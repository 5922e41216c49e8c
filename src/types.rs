//! Core types for the synchronization core.

use crate::error::SyncError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Separator between the two identities of a channel id. Never valid inside
/// an [`Identity`].
pub const CHANNEL_SEPARATOR: char = '|';

/// Opaque user handle supplied by the identity collaborator (usually an
/// email address).
///
/// Identities are used as document path segments and as halves of a
/// [`ChannelId`], so `/`, [`CHANNEL_SEPARATOR`] and control characters are
/// rejected at construction.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    pub fn new(value: impl Into<String>) -> Result<Self, SyncError> {
        let value = value.into();
        if value.is_empty() {
            return Err(SyncError::InvalidIdentity("empty identity".into()));
        }
        if let Some(bad) = value
            .chars()
            .find(|c| *c == CHANNEL_SEPARATOR || *c == '/' || c.is_control())
        {
            return Err(SyncError::InvalidIdentity(format!(
                "{:?} contains reserved character {:?}",
                value, bad
            )));
        }
        Ok(Identity(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Identity {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Identity::new(value)
    }
}

impl From<Identity> for String {
    fn from(id: Identity) -> Self {
        id.0
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.0)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical identifier of the conversation between two identities.
///
/// Only produced by [`crate::addressing::derive_channel_id`] or by parsing a
/// previously derived id, so the two halves are always sorted.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ChannelId(String);

impl ChannelId {
    /// Caller guarantees `low <= high`.
    pub(crate) fn from_sorted(low: &Identity, high: &Identity) -> Self {
        ChannelId(format!("{}{}{}", low.0, CHANNEL_SEPARATOR, high.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The two participants, in sorted order.
    pub fn participants(&self) -> (Identity, Identity) {
        // Both halves were validated on the way in.
        let (low, high) = self
            .0
            .split_once(CHANNEL_SEPARATOR)
            .unwrap_or((self.0.as_str(), ""));
        (Identity(low.to_string()), Identity(high.to_string()))
    }
}

impl TryFrom<String> for ChannelId {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let (low, high) = value.split_once(CHANNEL_SEPARATOR).ok_or_else(|| {
            SyncError::Deserialization(format!("channel id {:?} has no separator", value))
        })?;
        let low = Identity::new(low)?;
        let high = Identity::new(high)?;
        if low > high {
            return Err(SyncError::Deserialization(format!(
                "channel id {:?} is not in canonical order",
                value
            )));
        }
        Ok(ChannelId(value))
    }
}

impl From<ChannelId> for String {
    fn from(id: ChannelId) -> Self {
        id.0
    }
}

impl fmt::Debug for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelId({})", self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time. A clock before the epoch reads as zero.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or(0);
        Timestamp(micros)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Content digest for assets (SHA-256).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    /// Compute hash from bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        Hash(hasher.finalize().into())
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Hash(arr))
    }

    /// First byte as hex, used as a directory shard.
    pub fn shard_prefix(&self) -> String {
        hex::encode(&self.0[0..1])
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({}...)", &self.to_hex()[..8])
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A point on the map, in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Reject NaN/infinite values and out-of-range degrees.
    pub fn validate(&self) -> Result<(), SyncError> {
        let in_range = self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng);
        if in_range {
            Ok(())
        } else {
            Err(SyncError::InvalidCoordinate {
                lat: self.lat,
                lng: self.lng,
            })
        }
    }
}

/// Durable reference to an uploaded asset, as returned by the asset store.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetUrl(pub String);

impl AssetUrl {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AssetUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetUrl({})", self.0)
    }
}

impl fmt::Display for AssetUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Store-assigned message id.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

/// A stored chat message. Immutable once written.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: Identity,
    pub text: String,
    /// Assigned by the store when the message was appended.
    pub created_at: Timestamp,
    pub channel_id: ChannelId,
}

/// One row of a user's conversation listing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub owner_id: Identity,
    pub peer_id: Identity,
    pub channel_id: ChannelId,
    pub last_message: String,
    pub last_updated: Timestamp,
}

/// Annotation id; equal to the key its asset was uploaded under.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationId(pub String);

impl AnnotationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A geostamped photo marker on the shared map.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: AnnotationId,
    pub coordinate: Coordinate,
    pub asset_ref: AssetUrl,
    pub owner_id: Identity,
    pub title: Option<String>,
    pub description: Option<String>,
}

/// Directory entry for a registered user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Identity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}
