//! Ingestion: persisting documents and registering their points.
//!
//! Two entry points feed the engine:
//!
//! - **Uploads** ([`Indexer::ingest_document`], [`Indexer::ingest_file`]): the
//!   document is persisted and its text and metadata points registered.
//!   Image points are registered only with
//!   [`IndexerConfig::register_upload_images`].
//! - **Live acquisition** ([`Indexer::ingest_from_live_sources`]): every
//!   fetched document is persisted and registered in all three spaces.
//!
//! A point that fails to decode is logged and skipped; the rest of its
//! document still goes in.
//!
//! Ingesting a document id that is already known replaces it: the stored file
//! is overwritten and the document's old points leave every space before the
//! new ones are registered.

use crate::collaborators::{Converter, Crawler, RawDocument};
use crate::config::IndexerConfig;
use crate::error::IndexingError;
use crate::retrieval::SpaceSet;
use crate::space::{SpaceKind, Vector};
use crate::storage::DocumentStore;
use instant::Instant;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// What one document contributed to the spaces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub document_id: String,
    pub text_points: usize,
    pub metadata_points: usize,
    pub image_points: usize,
    /// Points that failed to decode or register
    pub skipped: usize,
}

impl IngestReport {
    pub fn total_points(&self) -> usize {
        self.text_points + self.metadata_points + self.image_points
    }
}

/// Outcome of one live-acquisition round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LiveIngestReport {
    /// Query sent to the crawler
    pub query: String,
    /// Reports of the documents that were ingested
    pub documents: Vec<IngestReport>,
    /// Documents that failed to persist
    pub failed: usize,
    pub elapsed_ms: u64,
}

/// Writes documents to the store and their points to the spaces.
pub struct Indexer {
    store: Arc<dyn DocumentStore>,
    spaces: SpaceSet,
    config: IndexerConfig,
    crawler: Option<Arc<dyn Crawler>>,
    converter: Option<Arc<dyn Converter>>,
}

impl Indexer {
    pub fn new(store: Arc<dyn DocumentStore>, spaces: SpaceSet, config: IndexerConfig) -> Self {
        Self {
            store,
            spaces,
            config,
            crawler: None,
            converter: None,
        }
    }

    /// Sets the live source used by [`ingest_from_live_sources`](Self::ingest_from_live_sources).
    pub fn with_crawler(mut self, crawler: Arc<dyn Crawler>) -> Self {
        self.crawler = Some(crawler);
        self
    }

    /// Sets the converter used by [`ingest_file`](Self::ingest_file).
    pub fn with_converter(mut self, converter: Arc<dyn Converter>) -> Self {
        self.converter = Some(converter);
        self
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Persists an uploaded document and registers its points.
    #[instrument(skip_all, fields(document_id = %raw.id))]
    pub async fn ingest_document(&self, raw: &RawDocument) -> Result<IngestReport, IndexingError> {
        self.ingest(raw, self.config.register_upload_images).await
    }

    /// Converts a file and ingests the result as an upload.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestReport, IndexingError> {
        let converter = self
            .converter
            .as_ref()
            .ok_or_else(|| IndexingError::NotConfigured("no converter".into()))?;
        let raw = converter.to_document(path).await?;
        self.ingest_document(&raw).await
    }

    /// Runs one live-acquisition round for `query`.
    ///
    /// Each fetched document is persisted and registered in all three spaces.
    /// A document that fails is logged and skipped. The crawler's staging data
    /// is cleared afterwards in every case.
    ///
    /// # Errors
    ///
    /// `Acquisition` if the crawler cannot fetch at all.
    #[instrument(skip_all, fields(query = %query))]
    pub async fn ingest_from_live_sources(
        &self,
        query: &str,
    ) -> Result<LiveIngestReport, IndexingError> {
        let crawler = self
            .crawler
            .as_ref()
            .ok_or_else(|| IndexingError::NotConfigured("no crawler".into()))?;
        let start = Instant::now();

        let fetched = crawler.fetch(query, self.config.live_documents).await;
        let result = match fetched {
            Ok(documents) => {
                let mut report = LiveIngestReport {
                    query: query.to_string(),
                    ..Default::default()
                };
                for doc in &documents {
                    match self.ingest(doc, true).await {
                        Ok(r) => report.documents.push(r),
                        Err(e) => {
                            warn!("Failed to ingest live document {}: {}", doc.id, e);
                            report.failed += 1;
                        }
                    }
                }
                report.elapsed_ms = start.elapsed().as_millis() as u64;
                info!(
                    "Live acquisition ingested {} documents ({} failed) in {}ms",
                    report.documents.len(),
                    report.failed,
                    report.elapsed_ms
                );
                Ok(report)
            }
            Err(e) => Err(IndexingError::Acquisition(e.to_string())),
        };

        if let Err(e) = crawler.clear_staging().await {
            warn!("Failed to clear crawler staging data: {}", e);
        }
        result
    }

    async fn ingest(
        &self,
        raw: &RawDocument,
        include_images: bool,
    ) -> Result<IngestReport, IndexingError> {
        self.store.put_document(raw).await?;

        let replaced: usize = SpaceKind::ALL
            .iter()
            .map(|&kind| self.spaces.get(kind).remove_document(&raw.id))
            .sum();
        if replaced > 0 {
            debug!("Replacing {} existing points of {}", replaced, raw.id);
        }

        let mut report = IngestReport {
            document_id: raw.id.clone(),
            ..Default::default()
        };

        for (id, fragment) in raw.fragments().iter() {
            if self.register(SpaceKind::Text, id, &fragment.embedding) {
                report.text_points += 1;
            } else {
                report.skipped += 1;
            }
        }

        if let Some(embedding) = raw.metadata_record().and_then(|r| r.embedding()) {
            if self.register(SpaceKind::Metadata, &raw.id, embedding) {
                report.metadata_points += 1;
            } else {
                report.skipped += 1;
            }
        }

        if include_images {
            for (id, image) in raw.images.iter() {
                if self.register(SpaceKind::Image, id, &image.embedding) {
                    report.image_points += 1;
                } else {
                    report.skipped += 1;
                }
            }
        }

        info!(
            "Ingested {}: {} text, {} metadata, {} image points ({} skipped)",
            report.document_id,
            report.text_points,
            report.metadata_points,
            report.image_points,
            report.skipped
        );
        Ok(report)
    }

    /// Decodes and registers one point. Returns false if it was skipped.
    fn register(&self, kind: SpaceKind, id: &str, encoded: &str) -> bool {
        let space = self.spaces.get(kind);
        let added = Vector::decode(kind, space.dimension(), encoded)
            .and_then(|vector| space.add_point(id.to_string(), vector));
        match added {
            Ok(()) => true,
            Err(e) => {
                warn!("Skipping point {} in {}: {}", id, kind, e);
                false
            }
        }
    }
}
