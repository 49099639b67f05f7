//! Live-source crawler reading from an inbox directory.
//!
//! External fetchers drop raw-document JSON files (the store's own file
//! layout, embeddings included) into the inbox. A fetch picks the files that
//! best match the query; `clear_staging` deletes the files it handed out.

use async_trait::async_trait;
use bitsift_core::codec::encode_float32_base64;
use bitsift_core::collaborators::{Crawler, ImageEmbedder, RawDocument};
use bitsift_core::error::{CollaboratorError, EmbeddingError};
use bitsift_core::storage::{ImageFragment, OrderedMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Crawler over a directory of raw-document files.
pub struct InboxCrawler {
    dir: PathBuf,
    image_embedder: Option<Arc<dyn ImageEmbedder>>,
    consumed: Mutex<Vec<PathBuf>>,
}

impl InboxCrawler {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            image_embedder: None,
            consumed: Mutex::new(Vec::new()),
        }
    }

    /// Embeds images that arrive without an embedding.
    pub fn with_image_embedder(mut self, embedder: Arc<dyn ImageEmbedder>) -> Self {
        self.image_embedder = Some(embedder);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn read_candidates(&self) -> Result<Vec<(PathBuf, RawDocument)>, CollaboratorError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Inbox {} does not exist", self.dir.display());
                return Ok(vec![]);
            }
            Err(e) => {
                return Err(CollaboratorError::Unavailable(format!(
                    "{}: {}",
                    self.dir.display(),
                    e
                )))
            }
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CollaboratorError::Unavailable(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut candidates = Vec::with_capacity(paths.len());
        for path in paths {
            let parsed = tokio::fs::read(&path)
                .await
                .map_err(|e| e.to_string())
                .and_then(|bytes| {
                    serde_json::from_slice::<RawDocument>(&bytes).map_err(|e| e.to_string())
                });
            match parsed {
                Ok(doc) => candidates.push((path, doc)),
                Err(e) => warn!("Skipping unreadable inbox file {}: {}", path.display(), e),
            }
        }
        Ok(candidates)
    }

    /// Fills in missing image embeddings. Images that cannot be embedded, or
    /// whose embedding has the wrong dimension, are dropped.
    async fn embed_images(&self, mut doc: RawDocument) -> RawDocument {
        let Some(embedder) = &self.image_embedder else {
            return doc;
        };
        if doc.images.values().all(|img| !img.embedding.is_empty()) {
            return doc;
        }

        let mut images = OrderedMap::new();
        for (id, image) in doc.images.iter() {
            if !image.embedding.is_empty() {
                images.insert(id, image.clone());
                continue;
            }
            let encoded = match embedder.embed_image_url(&image.image_url).await {
                Ok(vector) if vector.len() != embedder.dimension() => Err(format!(
                    "expected {} dimensions, got {}",
                    embedder.dimension(),
                    vector.len()
                )),
                Ok(vector) => encode_float32_base64(&vector).map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };
            match encoded {
                Ok(embedding) => {
                    images.insert(
                        id,
                        ImageFragment {
                            embedding,
                            ..image.clone()
                        },
                    );
                }
                Err(e) => warn!("Dropping image {} of {}: {}", id, doc.id, e),
            }
        }
        doc.images = images;
        doc
    }
}

/// Number of distinct query terms appearing in the document's text or
/// metadata (case-insensitive).
fn relevance(doc: &RawDocument, terms: &[String]) -> usize {
    let mut haystack = doc.full_text();
    if let Some(record) = doc.metadata_record() {
        haystack.push_str(&record.summary());
    }
    let haystack = haystack.to_lowercase();
    terms.iter().filter(|t| haystack.contains(t.as_str())).count()
}

fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = query
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    terms.sort();
    terms.dedup();
    terms
}

#[async_trait]
impl Crawler for InboxCrawler {
    async fn fetch(&self, query: &str, n: usize) -> Result<Vec<RawDocument>, CollaboratorError> {
        let terms = query_terms(query);
        let mut candidates: Vec<(usize, PathBuf, RawDocument)> = self
            .read_candidates()
            .await?
            .into_iter()
            .map(|(path, doc)| (relevance(&doc, &terms), path, doc))
            .collect();
        // Stable: equal relevance keeps file-name order
        candidates.sort_by(|a, b| b.0.cmp(&a.0));
        candidates.truncate(n);

        let mut documents = Vec::with_capacity(candidates.len());
        let mut consumed = Vec::with_capacity(candidates.len());
        for (_, path, doc) in candidates {
            documents.push(self.embed_images(doc).await);
            consumed.push(path);
        }

        info!(
            "Inbox served {} documents for \"{}\"",
            documents.len(),
            query
        );
        self.consumed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(consumed);
        Ok(documents)
    }

    async fn clear_staging(&self) -> Result<(), CollaboratorError> {
        let consumed: Vec<PathBuf> = std::mem::take(
            &mut *self.consumed.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for path in consumed {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!("Failed to remove {}: {}", path.display(), e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitsift_core::storage::{MediaKind, StoredDocument};
    use tempfile::TempDir;

    /// Always returns `[1.0, 0.0]`, claiming `dimension`.
    struct ConstantImageEmbedder {
        dimension: usize,
    }

    #[async_trait]
    impl ImageEmbedder for ConstantImageEmbedder {
        fn dimension(&self) -> usize {
            self.dimension
        }

        async fn embed_image_url(&self, _url: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(vec![1.0, 0.0])
        }
    }

    fn write_doc(dir: &Path, id: &str, text: &str) -> PathBuf {
        let mut doc = StoredDocument::new(id, MediaKind::Article);
        doc.push_fragment(text, "AA==".to_string());
        let path = dir.join(format!("{id}.json"));
        std::fs::write(&path, serde_json::to_vec(&doc).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_query_terms() {
        assert_eq!(query_terms("Rust, rust  async!"), vec!["async", "rust"]);
        assert!(query_terms("  ").is_empty());
    }

    #[tokio::test]
    async fn test_fetch_prefers_matching_documents() {
        let dir = TempDir::new().unwrap();
        write_doc(dir.path(), "a", "Weather report for Paris");
        write_doc(dir.path(), "b", "Election results in Hanoi");
        write_doc(dir.path(), "c", "Hanoi weather turns cold");

        let crawler = InboxCrawler::new(dir.path());
        let docs = crawler.fetch("hanoi weather", 2).await.unwrap();
        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[tokio::test]
    async fn test_clear_staging_removes_consumed_files() {
        let dir = TempDir::new().unwrap();
        let a = write_doc(dir.path(), "a", "alpha");
        let b = write_doc(dir.path(), "b", "beta");

        let crawler = InboxCrawler::new(dir.path());
        let docs = crawler.fetch("beta", 1).await.unwrap();
        assert_eq!(docs[0].id, "b");

        crawler.clear_staging().await.unwrap();
        assert!(a.exists());
        assert!(!b.exists());

        // Nothing left to clear
        crawler.clear_staging().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_inbox_is_empty() {
        let dir = TempDir::new().unwrap();
        let crawler = InboxCrawler::new(dir.path().join("absent"));
        assert!(crawler.fetch("anything", 4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_file_is_skipped() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        write_doc(dir.path(), "ok", "fine");

        let docs = InboxCrawler::new(dir.path()).fetch("x", 8).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "ok");
    }

    #[tokio::test]
    async fn test_missing_image_embeddings_are_filled() {
        let dir = TempDir::new().unwrap();
        let mut doc = StoredDocument::new("pics", MediaKind::Article);
        doc.push_image("https://img/1.png", "one", String::new());
        std::fs::write(
            dir.path().join("pics.json"),
            serde_json::to_vec(&doc).unwrap(),
        )
        .unwrap();

        let crawler = InboxCrawler::new(dir.path())
            .with_image_embedder(Arc::new(ConstantImageEmbedder { dimension: 2 }));
        let docs = crawler.fetch("pics", 1).await.unwrap();
        let image = docs[0].images.values().next().unwrap();
        assert_eq!(image.embedding, encode_float32_base64(&[1.0, 0.0]).unwrap());
        assert_eq!(image.image_alt, "one");
    }

    #[tokio::test]
    async fn test_wrong_dimension_image_is_dropped() {
        let dir = TempDir::new().unwrap();
        let mut doc = StoredDocument::new("pics", MediaKind::Article);
        doc.push_image("https://img/1.png", "one", String::new());
        std::fs::write(
            dir.path().join("pics.json"),
            serde_json::to_vec(&doc).unwrap(),
        )
        .unwrap();

        let crawler = InboxCrawler::new(dir.path())
            .with_image_embedder(Arc::new(ConstantImageEmbedder { dimension: 768 }));
        let docs = crawler.fetch("pics", 1).await.unwrap();
        assert!(docs[0].images.is_empty());
    }
}
