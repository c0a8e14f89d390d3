//! Document storage backends

mod firestore;
mod memory;

pub use firestore::{FirestoreStore, ServiceAccount};
pub use memory::MemoryStore;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;
use crate::types::Record;

/// How `set` treats an existing document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace the whole document
    Overwrite,
    /// Overlay the given fields, keeping the rest
    Merge,
}

/// Stream of documents returned by [`DocumentStore::list`].
///
/// A read fault is yielded as an `Err` item; the stream simply ends once
/// the collection is exhausted.
pub type DocumentStream<'a> = BoxStream<'a, Result<Record>>;

/// A collection-oriented document database
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Stream every document in `collection`, in store order
    fn list<'a>(&'a self, collection: &'a str) -> DocumentStream<'a>;

    /// Fetch one document, or `Error::DocumentNotFound`
    async fn get(&self, collection: &str, id: &str) -> Result<Record>;

    /// Create or write a document. Missing documents are created in both modes.
    async fn set(&self, collection: &str, id: &str, record: Record, mode: WriteMode) -> Result<()>;

    /// Delete a document. Deleting a missing document is not an error.
    async fn delete(&self, collection: &str, id: &str) -> Result<()>;
}
