//! Document store trait and in-memory implementation.

use super::types::{OrderedMap, StoredDocument};
use crate::error::StoreError;
use async_trait::async_trait;
use std::sync::RwLock;

/// Persistent collection of documents, keyed by document id.
///
/// Documents are written once by the indexer and read back by id during
/// retrieval, or in bulk when the vector spaces are rebuilt at startup.
///
/// # Implementations
///
/// - [`JsonDirStore`](super::JsonDirStore) - one `{id}.json` file per document
/// - [`InMemoryDocumentStore`] - for tests
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Stores a document, overwriting any document with the same id.
    async fn put_document(&self, doc: &StoredDocument) -> Result<(), StoreError>;

    /// Retrieves a document by id.
    ///
    /// Returns `Ok(None)` if the document doesn't exist.
    async fn get_document(&self, id: &str) -> Result<Option<StoredDocument>, StoreError>;

    /// Returns every document id in the store.
    async fn document_ids(&self) -> Result<Vec<String>, StoreError>;

    /// Returns the number of documents in the store.
    async fn document_count(&self) -> Result<usize, StoreError> {
        Ok(self.document_ids().await?.len())
    }
}

/// In-memory document store for testing.
///
/// Keeps documents in insertion order and persists nothing.
#[derive(Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<OrderedMap<StoredDocument>>,
}

impl InMemoryDocumentStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn put_document(&self, doc: &StoredDocument) -> Result<(), StoreError> {
        let mut docs = self
            .documents
            .write()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        docs.insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<StoredDocument>, StoreError> {
        let docs = self
            .documents
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        Ok(docs.get(id).cloned())
    }

    async fn document_ids(&self) -> Result<Vec<String>, StoreError> {
        let docs = self
            .documents
            .read()
            .map_err(|e| StoreError::LockPoisoned(e.to_string()))?;
        Ok(docs.keys().map(str::to_string).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MediaKind;

    #[tokio::test]
    async fn test_in_memory_roundtrip() {
        let store = InMemoryDocumentStore::new();
        let mut doc = StoredDocument::new("doc1", MediaKind::Article);
        doc.push_fragment("hello", "gA==".into());

        store.put_document(&doc).await.unwrap();
        assert_eq!(store.get_document("doc1").await.unwrap(), Some(doc));
        assert_eq!(store.get_document("nope").await.unwrap(), None);
        assert_eq!(store.document_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_in_memory_ids_in_insertion_order() {
        let store = InMemoryDocumentStore::new();
        for id in ["b", "a", "c"] {
            store
                .put_document(&StoredDocument::new(id, MediaKind::Article))
                .await
                .unwrap();
        }
        assert_eq!(store.document_ids().await.unwrap(), vec!["b", "a", "c"]);
    }
}
