//! Test utilities for bitsift-core.
//!
//! Fake collaborators with fixed or scripted behaviour, plus document
//! fixtures. Only compiled when running tests.

use crate::codec::{bit_vector_to_base64, encode_float32_base64, quantize};
use crate::collaborators::{Crawler, Generator, QueryRewriter, RawDocument, Sufficiency};
use crate::embedding::TextEmbedder;
use crate::error::{CollaboratorError, EmbeddingError};
use crate::storage::{MediaKind, MetadataRecord, StoredDocument};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Embedder backed by an exact-match lookup table.
///
/// Unknown texts embed to an all-ones vector.
pub struct TableEmbedder {
    dimension: usize,
    table: HashMap<String, Vec<f32>>,
    pub calls: AtomicUsize,
}

impl TableEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            table: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.table.insert(text.to_string(), vector);
        self
    }
}

#[async_trait]
impl TextEmbedder for TableEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .table
            .get(text)
            .cloned()
            .unwrap_or_else(|| vec![1.0; self.dimension]))
    }
}

/// Embedder whose every call fails.
pub struct FailingEmbedder;

#[async_trait]
impl TextEmbedder for FailingEmbedder {
    fn dimension(&self) -> usize {
        8
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::Unavailable("no model".into()))
    }
}

/// Generator replaying scripted sufficiency verdicts in order.
///
/// Once the script runs out every check is insufficient. `generate` echoes
/// the query.
#[derive(Default)]
pub struct ScriptedGenerator {
    verdicts: Mutex<VecDeque<Sufficiency>>,
    pub contexts: Mutex<Vec<String>>,
    pub check_calls: AtomicUsize,
    pub generate_calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new(verdicts: Vec<Sufficiency>) -> Self {
        Self {
            verdicts: Mutex::new(verdicts.into()),
            ..Default::default()
        }
    }

    pub fn always_insufficient() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn check_sufficiency(
        &self,
        _query: &str,
        context: &str,
    ) -> Result<Sufficiency, CollaboratorError> {
        self.check_calls.fetch_add(1, Ordering::SeqCst);
        self.contexts.lock().unwrap().push(context.to_string());
        Ok(self
            .verdicts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Sufficiency::Insufficient))
    }

    async fn generate(&self, query: &str, context: &str) -> Result<String, CollaboratorError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        self.contexts.lock().unwrap().push(context.to_string());
        Ok(format!("generated: {query}"))
    }
}

/// Rewriter that prefixes the query, or fails when built with `failing`.
#[derive(Default)]
pub struct FixedRewriter {
    fail: bool,
}

impl FixedRewriter {
    pub fn failing() -> Self {
        Self { fail: true }
    }
}

#[async_trait]
impl QueryRewriter for FixedRewriter {
    async fn rewrite(&self, query: &str) -> Result<String, CollaboratorError> {
        if self.fail {
            return Err(CollaboratorError::Unavailable("rewriter offline".into()));
        }
        Ok(format!("rewritten {query}"))
    }

    async fn suggest(&self, query: &str, k: usize) -> Result<Vec<String>, CollaboratorError> {
        Ok((1..=k).map(|i| format!("{query} #{i}")).collect())
    }
}

/// Crawler handing out a fixed set of documents and counting its calls.
#[derive(Default)]
pub struct CountingCrawler {
    documents: Vec<RawDocument>,
    fail: bool,
    pub queries: Mutex<Vec<String>>,
    pub fetch_calls: AtomicUsize,
    pub clear_calls: AtomicUsize,
}

impl CountingCrawler {
    pub fn new(documents: Vec<RawDocument>) -> Self {
        Self {
            documents,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl Crawler for CountingCrawler {
    async fn fetch(&self, query: &str, n: usize) -> Result<Vec<RawDocument>, CollaboratorError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.to_string());
        if self.fail {
            return Err(CollaboratorError::Unavailable("network down".into()));
        }
        Ok(self.documents.iter().take(n).cloned().collect())
    }

    async fn clear_staging(&self) -> Result<(), CollaboratorError> {
        self.clear_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Builds an article whose fragments carry the quantized form of the given
/// vectors, plus a metadata record embedded as `metadata_vector`.
pub fn article(
    id: &str,
    fragments: &[(&str, &[f32])],
    title: &str,
    metadata_vector: &[f32],
) -> StoredDocument {
    let mut doc = StoredDocument::new(id, MediaKind::Article);
    doc.set_metadata_field("url", format!("https://example.com/{id}"));
    for (text, vector) in fragments {
        doc.push_fragment(*text, bit_vector_to_base64(&quantize(vector).unwrap()));
    }
    let mut record = MetadataRecord::new().with_field("title", title);
    record.set_embedding(bit_vector_to_base64(&quantize(metadata_vector).unwrap()));
    doc.set_metadata_record(record);
    doc
}

/// Adds an image fragment with a raw float embedding.
pub fn with_image(mut doc: StoredDocument, url: &str, vector: &[f32]) -> StoredDocument {
    doc.push_image(url, "", encode_float32_base64(vector).unwrap());
    doc
}
