//! Live subscription lifecycle.
//!
//! A [`Subscription`] wraps one backend feed and guarantees:
//! - every delivery is a full snapshot of the watched collection
//! - nothing is delivered after `close` returns, even if the backend had
//!   already queued a snapshot
//! - closing is idempotent and happens on drop
//!
//! A [`SubscriptionSlot`] holds one subscription per screen and switches
//! between keys old-first.
//!
//! # Example
//!
//! ```ignore
//! let manager = SubscriptionManager::new(feed);
//! let slot = SubscriptionSlot::new();
//!
//! slot.switch(SubscriptionKey::Annotations, || {
//!     manager.open(
//!         SubscriptionKey::Annotations,
//!         FeedQuery::new(CollectionPath::root("annotations")?),
//!         |doc| doc.decode::<serde_json::Value>(),
//!         |items| println!("{} markers", items.len()),
//!         |err| eprintln!("feed failed: {}", err),
//!     )
//! })
//! .await?;
//! ```

mod manager;
mod slot;
mod types;

pub use manager::{Subscription, SubscriptionManager};
pub use slot::SubscriptionSlot;
pub use types::{SubscriptionId, SubscriptionKey};
