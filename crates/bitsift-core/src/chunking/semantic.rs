//! Embedding-distance semantic chunker.
//!
//! Splits a document at the points where consecutive paragraph windows drift
//! furthest apart in embedding space.
//!
//! # Algorithm
//!
//! 1. Split the text into paragraph units.
//! 2. For each unit, build a window of `buffer_size` neighbours on each side.
//! 3. Embed every window in one batch.
//! 4. `distance[i] = 1 - cosine(window[i], window[i + 1])`.
//! 5. `threshold = percentile(distance, breakpoint_percentile)`.
//! 6. Break after `i` iff `distance[i] > threshold`, then join the original
//!    (unwindowed) units between breaks.
//!
//! Fewer than two units means no distance can be computed, and the whole text
//! becomes one chunk.

use super::types::TextChunk;
use super::{percentile, split_paragraphs};
use crate::config::ChunkingConfig;
use crate::embedding::{cosine_similarity, TextEmbedder};
use crate::error::ChunkingError;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Semantic chunker driven by a [`TextEmbedder`].
///
/// Deterministic: the same text, embedder outputs and parameters always
/// produce the same boundaries.
pub struct SemanticChunker {
    embedder: Arc<dyn TextEmbedder>,
    config: ChunkingConfig,
}

impl SemanticChunker {
    /// Creates a chunker after validating its parameters.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if the percentile lies outside `[0, 100]`.
    pub fn new(
        embedder: Arc<dyn TextEmbedder>,
        config: ChunkingConfig,
    ) -> Result<Self, ChunkingError> {
        config.validate()?;
        Ok(Self { embedder, config })
    }

    /// Returns the active parameters.
    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// Splits `text` into semantically coherent chunks, in document order.
    #[instrument(skip_all, fields(chars = text.len()))]
    pub async fn chunk(&self, text: &str) -> Result<Vec<TextChunk>, ChunkingError> {
        if text.trim().is_empty() {
            return Ok(vec![]);
        }

        let units = split_paragraphs(text);
        if units.len() < 2 {
            return Ok(vec![TextChunk {
                index: 0,
                text: text.to_string(),
                start_char: 0,
                end_char: text.len(),
            }]);
        }

        let windows = build_windows(&units, self.config.buffer_size);
        let embeddings = self.embedder.embed_batch(&windows).await?;
        if embeddings.len() != windows.len() {
            return Err(ChunkingError::BatchSizeMismatch {
                expected: windows.len(),
                actual: embeddings.len(),
            });
        }

        let distances = window_distances(&embeddings);
        let threshold = percentile(&distances, self.config.breakpoint_percentile);
        let breaks = breakpoints(&distances, threshold);

        debug!(
            "{} paragraphs, threshold {:.4}, {} breakpoints",
            units.len(),
            threshold,
            breaks.len()
        );

        Ok(assemble_chunks(&units, &breaks))
    }
}

/// Builds the context window of every unit: up to `buffer_size` units before,
/// the unit itself, and up to `buffer_size` units after (clipped at the edges).
pub fn build_windows(units: &[&str], buffer_size: usize) -> Vec<String> {
    (0..units.len())
        .map(|i| {
            let start = i.saturating_sub(buffer_size);
            let end = (i + buffer_size + 1).min(units.len());
            units[start..end].concat()
        })
        .collect()
}

/// Cosine distance between each pair of consecutive window embeddings.
pub fn window_distances(embeddings: &[Vec<f32>]) -> Vec<f32> {
    embeddings
        .windows(2)
        .map(|pair| 1.0 - cosine_similarity(&pair[0], &pair[1]))
        .collect()
}

/// Indices `i` after which a chunk boundary falls (`distance[i] > threshold`).
pub fn breakpoints(distances: &[f32], threshold: f32) -> Vec<usize> {
    distances
        .iter()
        .enumerate()
        .filter(|(_, &d)| d > threshold)
        .map(|(i, _)| i)
        .collect()
}

/// Joins the original units between consecutive boundaries.
pub fn assemble_chunks(units: &[&str], breaks: &[usize]) -> Vec<TextChunk> {
    let mut ranges = Vec::with_capacity(breaks.len() + 1);
    let mut start_unit = 0;
    for &b in breaks {
        ranges.push(start_unit..b + 1);
        start_unit = b + 1;
    }
    if start_unit < units.len() {
        ranges.push(start_unit..units.len());
    }

    let mut offset = 0;
    ranges
        .into_iter()
        .enumerate()
        .map(|(index, range)| {
            let text = units[range].concat();
            let start_char = offset;
            offset += text.len();
            TextChunk {
                index,
                text,
                start_char,
                end_char: offset,
            }
        })
        .collect()
}
