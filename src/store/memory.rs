//! In-process document store

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::sync::RwLock;

use super::{DocumentStore, DocumentStream, WriteMode};
use crate::error::{Error, Result};
use crate::types::{merge_into, Record};

/// Documents kept in memory, keyed by collection then id.
///
/// Listing iterates ids in lexical order, mirroring Firestore's default
/// ordering by document name.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Record>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a collection
    pub async fn count(&self, collection: &str) -> usize {
        let collections = self.collections.read().await;
        collections.get(collection).map(|c| c.len()).unwrap_or(0)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn list<'a>(&'a self, collection: &'a str) -> DocumentStream<'a> {
        // Snapshot under the lock so the stream never holds it across yields
        stream::once(async move {
            let collections = self.collections.read().await;
            let docs: Vec<Result<Record>> = collections
                .get(collection)
                .map(|c| c.values().cloned().map(Ok).collect())
                .unwrap_or_default();
            stream::iter(docs)
        })
        .flatten()
        .boxed()
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Record> {
        let collections = self.collections.read().await;
        collections
            .get(collection)
            .and_then(|c| c.get(id))
            .cloned()
            .ok_or_else(|| Error::DocumentNotFound(format!("{}/{}", collection, id)))
    }

    async fn set(&self, collection: &str, id: &str, record: Record, mode: WriteMode) -> Result<()> {
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();

        match mode {
            WriteMode::Overwrite => {
                docs.insert(id.to_string(), record);
            }
            WriteMode::Merge => {
                let existing = docs.entry(id.to_string()).or_default();
                merge_into(existing, record);
            }
        }

        tracing::debug!("Wrote {}/{} ({:?})", collection, id, mode);
        Ok(())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        if let Some(docs) = collections.get_mut(collection) {
            docs.remove(id);
        }
        Ok(())
    }
}
