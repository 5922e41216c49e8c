//! Document and query model shared by change-feed backends.

use crate::error::{Result, SyncError};
use crate::types::Timestamp;
use serde::de::DeserializeOwned;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

fn validate_segment(segment: &str) -> Result<()> {
    if segment.is_empty() || segment.contains('/') || segment.chars().any(char::is_control) {
        return Err(SyncError::InvalidPath(segment.to_string()));
    }
    Ok(())
}

/// Slash-separated path of a document collection, e.g.
/// `chats/a@x|b@x/messages`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath(String);

impl CollectionPath {
    /// A top-level collection.
    pub fn root(name: &str) -> Result<Self> {
        validate_segment(name)?;
        Ok(CollectionPath(name.to_string()))
    }

    /// A subcollection under document `doc_id` of this collection.
    pub fn child(&self, doc_id: &str, name: &str) -> Result<Self> {
        validate_segment(doc_id)?;
        validate_segment(name)?;
        Ok(CollectionPath(format!("{}/{}/{}", self.0, doc_id, name)))
    }

    /// Path of document `id` in this collection.
    pub fn doc(&self, id: &str) -> Result<DocumentPath> {
        validate_segment(id)?;
        Ok(DocumentPath {
            collection: self.clone(),
            id: id.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CollectionPath({})", self.0)
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Path of a single document.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DocumentPath {
    collection: CollectionPath,
    id: String,
}

impl DocumentPath {
    pub fn collection(&self) -> &CollectionPath {
        &self.collection
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Debug for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocumentPath({}/{})", self.collection.0, self.id)
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection.0, self.id)
    }
}

/// A stored document as seen by readers.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: serde_json::Value,
    /// Assigned by the store on every write.
    pub written_at: Timestamp,
}

impl Document {
    /// Decode the document body.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.data.clone())
            .map_err(|e| SyncError::Deserialization(format!("document {}: {}", self.id, e)))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Snapshot ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Order {
    /// Document id, ascending.
    #[default]
    ById,
    /// Store write time; ties break by id in the same direction.
    WrittenAt(Direction),
}

impl Order {
    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        match self {
            Order::ById => a.id.cmp(&b.id),
            Order::WrittenAt(direction) => {
                let ord = a
                    .written_at
                    .cmp(&b.written_at)
                    .then_with(|| a.id.cmp(&b.id));
                match direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            }
        }
    }

    pub fn sort(&self, docs: &mut [Document]) {
        docs.sort_by(|a, b| self.compare(a, b));
    }
}

/// What a subscriber watches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedQuery {
    pub collection: CollectionPath,
    pub order: Order,
}

impl FeedQuery {
    pub fn new(collection: CollectionPath) -> Self {
        Self {
            collection,
            order: Order::default(),
        }
    }

    pub fn ordered(mut self, order: Order) -> Self {
        self.order = order;
        self
    }
}

/// Pushed from a backend to a subscriber.
#[derive(Clone, Debug)]
pub enum FeedEvent {
    /// The whole current ordered contents of the watched collection.
    Snapshot(Vec<Document>),
    /// The feed failed and will deliver nothing further.
    Error(String),
}

/// Callback a backend delivers feed events to.
pub type FeedSink = Arc<dyn Fn(FeedEvent) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, at: i64) -> Document {
        Document {
            id: id.to_string(),
            data: json!({}),
            written_at: Timestamp(at),
        }
    }

    #[test]
    fn test_paths() {
        let chats = CollectionPath::root("chats").unwrap();
        let messages = chats.child("a@x|b@x", "messages").unwrap();
        assert_eq!(messages.as_str(), "chats/a@x|b@x/messages");
        let path = messages.doc("0001").unwrap();
        assert_eq!(path.to_string(), "chats/a@x|b@x/messages/0001");
        assert_eq!(path.collection(), &messages);
    }

    #[test]
    fn test_invalid_segments() {
        assert!(CollectionPath::root("").is_err());
        assert!(CollectionPath::root("a/b").is_err());
        let users = CollectionPath::root("users").unwrap();
        assert!(matches!(users.doc("x/y"), Err(SyncError::InvalidPath(_))));
    }

    #[test]
    fn test_written_at_descending_breaks_ties_by_id() {
        let mut docs = vec![doc("0001", 5), doc("0003", 9), doc("0002", 5)];
        Order::WrittenAt(Direction::Descending).sort(&mut docs);
        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["0003", "0002", "0001"]);
    }

    #[test]
    fn test_by_id() {
        let mut docs = vec![doc("b", 1), doc("a", 2)];
        Order::ById.sort(&mut docs);
        assert_eq!(docs[0].id, "a");
    }
}
