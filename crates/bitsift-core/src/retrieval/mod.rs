//! Retrieval over the three vector spaces.
//!
//! [`Retriever`] runs one space search and resolves every hit back to
//! displayable content through the document store. [`cascade`] chains those
//! searches with sufficiency checks and live acquisition.

pub mod cascade;

use crate::codec::BitVector;
use crate::error::{RetrievalError, SearchError};
use crate::identity::owning_document_of;
use crate::space::{FlatVectorSpace, ScoredPoint, SpaceKind, Vector, VectorIndex};
use crate::storage::{DocumentStore, StoredDocument};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// The three spaces of one engine instance.
#[derive(Clone)]
pub struct SpaceSet {
    pub text: Arc<dyn VectorIndex>,
    pub metadata: Arc<dyn VectorIndex>,
    pub image: Arc<dyn VectorIndex>,
}

impl SpaceSet {
    /// Three empty flat spaces.
    pub fn empty(dimension: usize, image_dimension: usize) -> Self {
        Self {
            text: Arc::new(FlatVectorSpace::new(SpaceKind::Text, dimension)),
            metadata: Arc::new(FlatVectorSpace::new(SpaceKind::Metadata, dimension)),
            image: Arc::new(FlatVectorSpace::new(SpaceKind::Image, image_dimension)),
        }
    }

    /// Builds all three flat spaces from the store.
    pub async fn build(
        store: &dyn DocumentStore,
        dimension: usize,
        image_dimension: usize,
    ) -> Result<Self, SearchError> {
        Ok(Self {
            text: Arc::new(FlatVectorSpace::build(SpaceKind::Text, dimension, store).await?),
            metadata: Arc::new(
                FlatVectorSpace::build(SpaceKind::Metadata, dimension, store).await?,
            ),
            image: Arc::new(
                FlatVectorSpace::build(SpaceKind::Image, image_dimension, store).await?,
            ),
        })
    }

    pub fn get(&self, kind: SpaceKind) -> &Arc<dyn VectorIndex> {
        match kind {
            SpaceKind::Text => &self.text,
            SpaceKind::Metadata => &self.metadata,
            SpaceKind::Image => &self.image,
        }
    }
}

/// Result of one space search.
///
/// `points` holds every scored hit. `contents` holds the resolved content of
/// each hit that could be resolved, in the same order; unresolvable hits are
/// missing from `contents` only.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SpaceHits {
    pub contents: Vec<String>,
    pub points: Vec<ScoredPoint>,
}

impl SpaceHits {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Formats resolved contents as the context string handed to the generator.
///
/// Each content becomes a `Document {i}:` block, numbered from 0.
pub fn format_context(contents: &[String]) -> String {
    contents
        .iter()
        .enumerate()
        .map(|(i, text)| format!("Document {i}:\n{text}\n\n"))
        .collect()
}

/// Searches one space at a time and resolves hits to content.
#[derive(Clone)]
pub struct Retriever {
    spaces: SpaceSet,
    store: Arc<dyn DocumentStore>,
}

impl Retriever {
    pub fn new(spaces: SpaceSet, store: Arc<dyn DocumentStore>) -> Self {
        Self { spaces, store }
    }

    pub fn spaces(&self) -> &SpaceSet {
        &self.spaces
    }

    /// Nearest text fragments; contents are fragment texts.
    #[instrument(skip_all, fields(top_k = top_k))]
    pub async fn search_text_space(
        &self,
        query: &BitVector,
        top_k: usize,
    ) -> Result<SpaceHits, RetrievalError> {
        let points = self
            .spaces
            .text
            .search(&Vector::Bits(query.clone()), top_k)?;
        self.resolve(points, |doc, id| {
            doc.fragments().get(id).map(|f| f.text.clone())
        })
        .await
    }

    /// Nearest metadata records; contents are `key: value` lines.
    #[instrument(skip_all, fields(top_k = top_k))]
    pub async fn search_metadata_space(
        &self,
        query: &BitVector,
        top_k: usize,
    ) -> Result<SpaceHits, RetrievalError> {
        let points = self
            .spaces
            .metadata
            .search(&Vector::Bits(query.clone()), top_k)?;
        self.resolve(points, |doc, _| doc.metadata_record().map(|r| r.summary()))
            .await
    }

    /// Nearest images, compared unquantized; contents are image URLs.
    #[instrument(skip_all, fields(top_k = top_k))]
    pub async fn search_image_space(
        &self,
        query: &[f32],
        top_k: usize,
    ) -> Result<SpaceHits, RetrievalError> {
        let points = self
            .spaces
            .image
            .search(&Vector::Float32(query.to_vec()), top_k)?;
        self.resolve(points, |doc, id| {
            doc.images.get(id).map(|img| img.image_url.clone())
        })
        .await
    }

    /// Every fragment text of the document owning `id`, in insertion order,
    /// each newline-terminated. Empty when the document is unknown.
    pub async fn resolve_full_document_text(&self, id: &str) -> Result<String, RetrievalError> {
        let doc_id = owning_document_of(id);
        match self.store.get_document(doc_id).await? {
            Some(doc) => Ok(doc.full_text()),
            None => {
                warn!("No document {} for id {}", doc_id, id);
                Ok(String::new())
            }
        }
    }

    async fn resolve<F>(
        &self,
        points: Vec<ScoredPoint>,
        extract: F,
    ) -> Result<SpaceHits, RetrievalError>
    where
        F: Fn(&StoredDocument, &str) -> Option<String>,
    {
        let mut documents: HashMap<String, Option<StoredDocument>> = HashMap::new();
        let mut contents = Vec::with_capacity(points.len());

        for point in &points {
            let doc_id = owning_document_of(&point.id);
            if !documents.contains_key(doc_id) {
                let doc = self.store.get_document(doc_id).await?;
                documents.insert(doc_id.to_string(), doc);
            }

            let content = documents
                .get(doc_id)
                .and_then(|doc| doc.as_ref())
                .and_then(|doc| extract(doc, &point.id));
            match content {
                Some(content) => contents.push(content),
                None => warn!("Could not resolve content for {}", point.id),
            }
        }

        debug!(
            "Resolved {} of {} hits",
            contents.len(),
            points.len()
        );
        Ok(SpaceHits { contents, points })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::quantize;
    use crate::storage::InMemoryDocumentStore;
    use crate::test_utils::{article, with_image};

    async fn retriever_with(docs: Vec<StoredDocument>) -> Retriever {
        let store = Arc::new(InMemoryDocumentStore::new());
        for doc in &docs {
            store.put_document(doc).await.unwrap();
        }
        let spaces = SpaceSet::build(store.as_ref(), 8, 2).await.unwrap();
        Retriever::new(spaces, store)
    }

    const POS: [f32; 8] = [1.0; 8];
    const NEG: [f32; 8] = [-1.0; 8];
    const HALF: [f32; 8] = [1.0, 1.0, 1.0, 1.0, -1.0, -1.0, -1.0, -1.0];

    #[test]
    fn test_format_context() {
        let ctx = format_context(&["alpha".into(), "beta".into()]);
        assert_eq!(ctx, "Document 0:\nalpha\n\nDocument 1:\nbeta\n\n");
        assert_eq!(format_context(&[]), "");
    }

    #[tokio::test]
    async fn test_search_text_space_resolves_fragments() {
        let retriever = retriever_with(vec![article(
            "doc1",
            &[("cats", &NEG), ("dogs", &POS), ("birds", &HALF)],
            "Pets",
            &POS,
        )])
        .await;

        let hits = retriever
            .search_text_space(&quantize(&POS).unwrap(), 2)
            .await
            .unwrap();
        assert_eq!(hits.contents, vec!["dogs", "birds"]);
        assert_eq!(hits.points[0].id, "doc1_text_2");
        assert_eq!(hits.points[0].score, 0.0);
        assert_eq!(hits.points[1].score, 4.0);
    }

    #[tokio::test]
    async fn test_search_metadata_space_renders_fields() {
        let retriever = retriever_with(vec![
            article("a", &[("x", &POS)], "First", &NEG),
            article("b", &[("y", &POS)], "Second", &POS),
        ])
        .await;

        let hits = retriever
            .search_metadata_space(&quantize(&POS).unwrap(), 1)
            .await
            .unwrap();
        assert_eq!(hits.points[0].id, "b");
        assert_eq!(hits.contents, vec!["title: Second"]);
    }

    #[tokio::test]
    async fn test_search_image_space_returns_urls() {
        let doc = with_image(
            article("a", &[("x", &POS)], "First", &POS),
            "https://img/1.png",
            &[0.0, 1.0],
        );
        let doc = with_image(doc, "https://img/2.png", &[1.0, 0.0]);
        let retriever = retriever_with(vec![doc]).await;

        let hits = retriever.search_image_space(&[1.0, 0.1], 2).await.unwrap();
        assert_eq!(hits.contents, vec!["https://img/2.png", "https://img/1.png"]);
        assert_eq!(hits.points[0].id, "a_image_2");
    }

    #[tokio::test]
    async fn test_unresolvable_hit_keeps_point() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let spaces = SpaceSet::empty(8, 2);
        spaces
            .text
            .add_point("ghost_text_1".into(), Vector::Bits(quantize(&POS).unwrap()))
            .unwrap();
        let retriever = Retriever::new(spaces, store);

        let hits = retriever
            .search_text_space(&quantize(&POS).unwrap(), 5)
            .await
            .unwrap();
        assert!(hits.contents.is_empty());
        assert_eq!(hits.points.len(), 1);
        assert_eq!(hits.points[0].id, "ghost_text_1");
    }

    #[tokio::test]
    async fn test_resolve_full_document_text() {
        let retriever = retriever_with(vec![article(
            "doc1",
            &[("one", &POS), ("two", &NEG)],
            "T",
            &POS,
        )])
        .await;

        assert_eq!(
            retriever.resolve_full_document_text("doc1_text_2").await.unwrap(),
            "one\ntwo\n"
        );
        assert_eq!(
            retriever.resolve_full_document_text("doc1").await.unwrap(),
            "one\ntwo\n"
        );
        assert_eq!(
            retriever.resolve_full_document_text("nobody_text_1").await.unwrap(),
            ""
        );
    }

    #[tokio::test]
    async fn test_empty_spaces() {
        let retriever = retriever_with(vec![]).await;
        let hits = retriever
            .search_text_space(&quantize(&POS).unwrap(), 8)
            .await
            .unwrap();
        assert!(hits.is_empty());
        assert!(hits.contents.is_empty());
    }
}
