//! Local view of one conversation with optimistic sends.

use crate::types::{Identity, Message, Timestamp};

/// A message shown locally before the store has confirmed it.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingMessage {
    pub local_id: u64,
    pub sender_id: Identity,
    pub text: String,
    pub queued_at: Timestamp,
}

/// One row of the rendered conversation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ViewEntry<'a> {
    Pending(&'a PendingMessage),
    Confirmed(&'a Message),
}

impl<'a> ViewEntry<'a> {
    pub fn text(&self) -> &'a str {
        match *self {
            ViewEntry::Pending(p) => &p.text,
            ViewEntry::Confirmed(m) => &m.text,
        }
    }

    pub fn sender_id(&self) -> &'a Identity {
        match *self {
            ViewEntry::Pending(p) => &p.sender_id,
            ViewEntry::Confirmed(m) => &m.sender_id,
        }
    }
}

/// What a chat screen renders.
///
/// Snapshots are authoritative: [`apply_snapshot`](Self::apply_snapshot)
/// replaces the confirmed list and drops every pending entry, even ones the
/// snapshot does not contain yet. Until then a sent message may appear
/// twice (pending and confirmed).
#[derive(Debug, Default)]
pub struct MessageView {
    confirmed: Vec<Message>,
    pending: Vec<PendingMessage>,
    next_local_id: u64,
}

impl MessageView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Show an outgoing message immediately. Returns its local id.
    pub fn push_local(&mut self, sender_id: Identity, text: impl Into<String>) -> u64 {
        self.next_local_id += 1;
        self.pending.push(PendingMessage {
            local_id: self.next_local_id,
            sender_id,
            text: text.into(),
            queued_at: Timestamp::now(),
        });
        self.next_local_id
    }

    /// Remove a pending entry, e.g. after its send failed.
    pub fn discard_local(&mut self, local_id: u64) -> Option<PendingMessage> {
        let pos = self.pending.iter().position(|p| p.local_id == local_id)?;
        Some(self.pending.remove(pos))
    }

    /// Replace the view with an authoritative newest-first snapshot.
    pub fn apply_snapshot(&mut self, messages: Vec<Message>) {
        self.confirmed = messages;
        self.pending.clear();
    }

    pub fn confirmed(&self) -> &[Message] {
        &self.confirmed
    }

    pub fn pending(&self) -> &[PendingMessage] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.confirmed.len() + self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Newest first: pending entries (latest push first), then confirmed.
    pub fn entries(&self) -> impl Iterator<Item = ViewEntry<'_>> {
        self.pending
            .iter()
            .rev()
            .map(ViewEntry::Pending)
            .chain(self.confirmed.iter().map(ViewEntry::Confirmed))
    }
}
