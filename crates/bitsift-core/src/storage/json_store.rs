//! Flat-file document store: one pretty-printed `{id}.json` per document.

use super::document_store::DocumentStore;
use super::types::StoredDocument;
use crate::error::StoreError;
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const EXTENSION: &str = "json";

/// Document store backed by a directory of JSON files.
///
/// No transactions: each write replaces one file.
pub struct JsonDirStore {
    root: PathBuf,
}

impl JsonDirStore {
    /// Opens (creating if needed) the store directory.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        info!("Opened document store at {}", root.display());
        Ok(Self { root })
    }

    /// Directory holding the document files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, StoreError> {
        validate_id(id)?;
        Ok(self.root.join(format!("{id}.{EXTENSION}")))
    }
}

/// Rejects ids that cannot safely become a file name inside the store.
fn validate_id(id: &str) -> Result<(), StoreError> {
    if id.is_empty()
        || id == "."
        || id == ".."
        || id.contains(['/', '\\', '\0'])
    {
        return Err(StoreError::InvalidId(id.to_string()));
    }
    Ok(())
}

/// Serializes with a four-space indent.
fn to_pretty_json(doc: &StoredDocument) -> Result<Vec<u8>, StoreError> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    doc.serialize(&mut ser)?;
    Ok(buf)
}

#[async_trait]
impl DocumentStore for JsonDirStore {
    async fn put_document(&self, doc: &StoredDocument) -> Result<(), StoreError> {
        let path = self.path_for(&doc.id)?;
        let bytes = to_pretty_json(doc)?;
        tokio::fs::write(&path, bytes).await?;
        debug!("Wrote {}", path.display());
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<StoredDocument>, StoreError> {
        let path = self.path_for(id)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let doc = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::SerializationError(format!("{}: {}", path.display(), e)))?;
        Ok(Some(doc))
    }

    async fn document_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}
