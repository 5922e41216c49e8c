//! Channel addressing.
//!
//! A conversation between two identities lives under a single channel id,
//! no matter which side opens it. The id is the two identities sorted and
//! joined with [`crate::types::CHANNEL_SEPARATOR`], which no identity may contain, so
//! distinct pairs never collide.

use crate::types::{ChannelId, Identity};

/// Derive the canonical channel id for the pair `{a, b}`.
///
/// Symmetric: `derive_channel_id(a, b) == derive_channel_id(b, a)`.
pub fn derive_channel_id(a: &Identity, b: &Identity) -> ChannelId {
    if a <= b {
        ChannelId::from_sorted(a, b)
    } else {
        ChannelId::from_sorted(b, a)
    }
}

/// The other participant of `channel`, if `me` is one of its two members.
pub fn peer_in(channel: &ChannelId, me: &Identity) -> Option<Identity> {
    let (low, high) = channel.participants();
    if &low == me {
        Some(high)
    } else if &high == me {
        Some(low)
    } else {
        None
    }
}
