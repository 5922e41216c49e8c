//! Two-party conversations.
//!
//! Messages between two identities live in one channel addressed by
//! [`crate::addressing::derive_channel_id`]. [`ConversationStore`] streams
//! and appends them; [`MessageView`] is the screen-side model that mixes
//! optimistic sends with authoritative snapshots.

mod store;
mod view;

pub use store::{ConversationStore, SentMessage};
pub use view::{MessageView, PendingMessage, ViewEntry};
