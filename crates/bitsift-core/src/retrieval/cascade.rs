//! Cascading retrieval protocol.
//!
//! One query walks the spaces in a fixed order and stops at the first context
//! the generator judges sufficient:
//!
//! ```text
//! embed query ──► image space (side channel, never gates)
//!             ──► text space      ── sufficient? ──► done (text_space)
//!             ──► metadata space  ── sufficient? ──► done (metadata_space)
//!             ──► rewrite query, one live-acquisition round
//!                   └─ failure ──► done, no answer (acquisition_failed)
//!             ──► text space      ── sufficient? ──► done (text_space_after_internet)
//!             ──► metadata space  ── generate    ──► done (metadata_space_after_internet)
//! ```
//!
//! The query is embedded once. Text and metadata searches use its quantized
//! form; the image search uses it unquantized.

use super::{format_context, Retriever, SpaceHits};
use crate::codec::{quantize, BitVector};
use crate::collaborators::{Generator, QueryRewriter, Sufficiency};
use crate::embedding::TextEmbedder;
use crate::error::RetrievalError;
use crate::indexing::Indexer;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Where a cascade run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    TextSpace,
    MetadataSpace,
    TextSpaceAfterInternet,
    MetadataSpaceAfterInternet,
    AcquisitionFailed,
}

impl Phase {
    pub fn name(self) -> &'static str {
        match self {
            Phase::TextSpace => "text_space",
            Phase::MetadataSpace => "metadata_space",
            Phase::TextSpaceAfterInternet => "text_space_after_internet",
            Phase::MetadataSpaceAfterInternet => "metadata_space_after_internet",
            Phase::AcquisitionFailed => "acquisition_failed",
        }
    }
}

/// Progress milestones reported while a run is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeStage {
    /// About to search the local spaces
    SearchingLocal,
    /// Local spaces were insufficient; about to acquire live documents
    SearchingInternet,
}

/// Everything a run produced. Partially filled while in flight.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CascadeOutcome {
    /// `None` until the run ends
    pub phase: Option<Phase>,
    /// Generated answer; `None` when acquisition failed
    pub answer: Option<String>,
    /// Image side-channel hits
    pub images: SpaceHits,
    /// Latest text-space hits
    pub text: Option<SpaceHits>,
    /// Latest metadata-space hits
    pub metadata: Option<SpaceHits>,
    /// Documents ingested by the acquisition round, if one ran
    pub acquired_documents: Option<usize>,
}

/// Callback receiving progress milestones with the hits gathered so far.
pub type ProgressFn = dyn Fn(CascadeStage, &CascadeOutcome) + Send + Sync;

/// Drives the cascade for one engine instance.
pub struct Cascade {
    embedder: Arc<dyn TextEmbedder>,
    generator: Arc<dyn Generator>,
    rewriter: Arc<dyn QueryRewriter>,
    retriever: Retriever,
    indexer: Arc<Indexer>,
    top_k: usize,
}

impl Cascade {
    pub fn new(
        embedder: Arc<dyn TextEmbedder>,
        generator: Arc<dyn Generator>,
        rewriter: Arc<dyn QueryRewriter>,
        retriever: Retriever,
        indexer: Arc<Indexer>,
        top_k: usize,
    ) -> Self {
        Self {
            embedder,
            generator,
            rewriter,
            retriever,
            indexer,
            top_k,
        }
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Embedder used for queries.
    pub fn embedder(&self) -> &Arc<dyn TextEmbedder> {
        &self.embedder
    }

    /// Runs the cascade without progress reporting.
    pub async fn run(&self, query: &str) -> Result<CascadeOutcome, RetrievalError> {
        self.run_with_progress(query, &|_, _| {}).await
    }

    /// Runs the cascade, reporting milestones to `progress`.
    ///
    /// # Errors
    ///
    /// Query embedding, sufficiency and generation failures abort the run. A
    /// failed acquisition round does not: the run ends with
    /// [`Phase::AcquisitionFailed`] and no answer.
    #[instrument(skip_all, fields(query = %query))]
    pub async fn run_with_progress(
        &self,
        query: &str,
        progress: &ProgressFn,
    ) -> Result<CascadeOutcome, RetrievalError> {
        let embedding = self.embedder.embed_query(query).await?;
        let bits = quantize(&embedding)?;
        let mut outcome = CascadeOutcome::default();

        progress(CascadeStage::SearchingLocal, &outcome);

        outcome.images = match self.retriever.search_image_space(&embedding, self.top_k).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!("Image search failed: {}", e);
                SpaceHits::default()
            }
        };

        if let Some(answer) = self.try_text(query, &bits, &mut outcome).await? {
            return Ok(finish(outcome, Phase::TextSpace, answer));
        }
        if let Some(answer) = self.try_metadata(query, &bits, &mut outcome).await? {
            return Ok(finish(outcome, Phase::MetadataSpace, answer));
        }

        progress(CascadeStage::SearchingInternet, &outcome);

        let search_query = match self.rewriter.rewrite(query).await {
            Ok(rewritten) if !rewritten.trim().is_empty() => rewritten,
            Ok(_) => query.to_string(),
            Err(e) => {
                warn!("Query rewrite failed, using raw query: {}", e);
                query.to_string()
            }
        };

        match self.indexer.ingest_from_live_sources(&search_query).await {
            Ok(report) => outcome.acquired_documents = Some(report.documents.len()),
            Err(e) => {
                warn!("Live acquisition failed: {}", e);
                outcome.phase = Some(Phase::AcquisitionFailed);
                return Ok(outcome);
            }
        }

        if let Some(answer) = self.try_text(query, &bits, &mut outcome).await? {
            return Ok(finish(outcome, Phase::TextSpaceAfterInternet, answer));
        }

        let metadata = self.retriever.search_metadata_space(&bits, self.top_k).await?;
        let context = format_context(&metadata.contents);
        outcome.metadata = Some(metadata);
        let answer = self.generator.generate(query, &context).await?;
        Ok(finish(outcome, Phase::MetadataSpaceAfterInternet, answer))
    }

    /// Alternative phrasings of `query`.
    pub async fn suggest(&self, query: &str, k: usize) -> Result<Vec<String>, RetrievalError> {
        Ok(self.rewriter.suggest(query, k).await?)
    }

    async fn try_text(
        &self,
        query: &str,
        bits: &BitVector,
        outcome: &mut CascadeOutcome,
    ) -> Result<Option<String>, RetrievalError> {
        let hits = self.retriever.search_text_space(bits, self.top_k).await?;
        let verdict = self.check(query, &hits).await?;
        outcome.text = Some(hits);
        Ok(verdict)
    }

    async fn try_metadata(
        &self,
        query: &str,
        bits: &BitVector,
        outcome: &mut CascadeOutcome,
    ) -> Result<Option<String>, RetrievalError> {
        let hits = self.retriever.search_metadata_space(bits, self.top_k).await?;
        let verdict = self.check(query, &hits).await?;
        outcome.metadata = Some(hits);
        Ok(verdict)
    }

    async fn check(&self, query: &str, hits: &SpaceHits) -> Result<Option<String>, RetrievalError> {
        let context = format_context(&hits.contents);
        match self.generator.check_sufficiency(query, &context).await? {
            Sufficiency::Answer(answer) => Ok(Some(answer)),
            Sufficiency::Insufficient => Ok(None),
        }
    }
}

fn finish(mut outcome: CascadeOutcome, phase: Phase, answer: String) -> CascadeOutcome {
    info!("Cascade answered at {}", phase.name());
    outcome.phase = Some(phase);
    outcome.answer = Some(answer);
    outcome
}
