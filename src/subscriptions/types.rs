//! Subscription types.

use crate::types::{ChannelId, Identity};
use std::fmt;

/// Unique identifier for a subscription within one manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// What a subscription watches. Two subscriptions with equal keys watch the
/// same data.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SubscriptionKey {
    /// Messages of one conversation channel.
    Channel(ChannelId),
    /// One user's conversation listing.
    Index(Identity),
    /// The shared marker set.
    Annotations,
    /// The user directory.
    Users,
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionKey::Channel(channel) => write!(f, "channel:{}", channel),
            SubscriptionKey::Index(owner) => write!(f, "index:{}", owner),
            SubscriptionKey::Annotations => f.write_str("annotations"),
            SubscriptionKey::Users => f.write_str("users"),
        }
    }
}
