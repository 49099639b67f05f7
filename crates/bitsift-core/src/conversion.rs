//! Plain-text file conversion.
//!
//! [`TextFileConverter`] turns a `.txt` or `.md` file into a ready-to-store
//! document: semantic chunks with quantized embeddings, plus a metadata record
//! built from the file's name, path and timestamps.

use crate::chunking::SemanticChunker;
use crate::codec::{bit_vector_to_base64, quantize};
use crate::collaborators::{Converter, RawDocument};
use crate::embedding::TextEmbedder;
use crate::error::{ChunkingError, ConversionError};
use crate::storage::{MediaKind, MetadataRecord, StoredDocument};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, instrument};

/// Extensions the converter accepts (lowercase).
pub const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md"];

/// Prefix of ids assigned to uploaded documents.
pub const UPLOAD_ID_PREFIX: &str = "user_";

/// Hex digits of the path hash kept in an upload id.
const ID_HASH_LEN: usize = 16;

/// Timestamp format of the `created` / `modified` metadata fields.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Stable document id for an uploaded file: `user_` + the first 16 hex
/// digits of the SHA-256 of its path.
pub fn upload_id(path: &Path) -> String {
    let digest = Sha256::digest(path.to_string_lossy().as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("{UPLOAD_ID_PREFIX}{}", &hex[..ID_HASH_LEN])
}

fn format_time(time: SystemTime) -> String {
    DateTime::<Local>::from(time)
        .format(TIMESTAMP_FORMAT)
        .to_string()
}

/// Converter for plain-text and Markdown files.
pub struct TextFileConverter {
    embedder: Arc<dyn TextEmbedder>,
    chunker: SemanticChunker,
}

impl TextFileConverter {
    pub fn new(embedder: Arc<dyn TextEmbedder>, chunker: SemanticChunker) -> Self {
        Self { embedder, chunker }
    }

    /// Whether `path` has an extension this converter handles.
    pub fn supports(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }

    async fn metadata_record(&self, path: &Path) -> Result<MetadataRecord, ConversionError> {
        let fs_meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| ConversionError::FileRead(format!("{}: {}", path.display(), e)))?;
        let modified = fs_meta.modified().ok();
        // Not every filesystem records a creation time
        let created = fs_meta.created().ok().or(modified);

        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut record = MetadataRecord::new()
            .with_field("title", title)
            .with_field("path", path.to_string_lossy().into_owned());
        if let Some(created) = created {
            record = record.with_field("created", format_time(created));
        }
        if let Some(modified) = modified {
            record = record.with_field("modified", format_time(modified));
        }

        let embedding = self.embedder.embed(&record.render_lines()).await?;
        record.set_embedding(bit_vector_to_base64(&quantize(&embedding)?));
        Ok(record)
    }
}

#[async_trait]
impl Converter for TextFileConverter {
    #[instrument(skip_all, fields(path = %path.display()))]
    async fn to_document(&self, path: &Path) -> Result<RawDocument, ConversionError> {
        if !Self::supports(path) {
            return Err(ConversionError::UnsupportedFormat(path.display().to_string()));
        }

        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConversionError::FileRead(format!("{}: {}", path.display(), e)))?;

        let mut doc = StoredDocument::new(upload_id(path), MediaKind::Article);
        doc.set_metadata_record(self.metadata_record(path).await?);

        let chunks = self.chunker.chunk(&text).await?;
        let texts: Vec<String> = chunks.into_iter().map(|c| c.text).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != texts.len() {
            return Err(ChunkingError::BatchSizeMismatch {
                expected: texts.len(),
                actual: embeddings.len(),
            }
            .into());
        }

        for (text, embedding) in texts.into_iter().zip(embeddings) {
            doc.push_fragment(text, bit_vector_to_base64(&quantize(&embedding)?));
        }

        debug!("Converted {} into {} fragments", path.display(), doc.fragments().len());
        Ok(doc)
    }
}
