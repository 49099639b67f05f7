//! Engine configuration.
//!
//! Constants that define the default engine setup, plus the serde-backed
//! [`EngineConfig`] the CLI loads from TOML.
//!
//! # Usage
//!
//! ```
//! use bitsift_core::config::{EngineConfig, EMBEDDING_DIM};
//!
//! let config = EngineConfig::default();
//! assert_eq!(config.dimension, EMBEDDING_DIM);
//! ```

use crate::error::{ChunkingError, ConfigError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// =============================================================================
// Embedding Configuration
// =============================================================================

/// Embedding vector dimension.
///
/// Text and metadata vectors are quantized to one bit per dimension, so 768
/// dimensions pack into exactly 96 bytes.
pub const EMBEDDING_DIM: usize = 768;

// =============================================================================
// Retrieval Configuration
// =============================================================================

/// Number of nearest neighbours requested from each space.
pub const DEFAULT_TOP_K: usize = 8;

/// Number of documents requested from the crawler in one live-acquisition round.
pub const DEFAULT_LIVE_DOCUMENTS: usize = 8;

// =============================================================================
// Text Chunking Configuration
// =============================================================================

/// Paragraphs of context on each side of a unit when embedding its window.
pub const DEFAULT_BUFFER_SIZE: usize = 1;

/// Distance percentile above which a chunk boundary is placed.
pub const DEFAULT_BREAKPOINT_PERCENTILE: f64 = 75.0;

/// Default on-disk location of the document store, relative to the working
/// directory.
pub const DEFAULT_DATABASE_DIR: &str = "database";

/// Semantic chunker parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Neighbouring paragraphs on each side of a window
    pub buffer_size: usize,
    /// Percentile in `[0, 100]` used as the breakpoint threshold
    pub breakpoint_percentile: f64,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            breakpoint_percentile: DEFAULT_BREAKPOINT_PERCENTILE,
        }
    }
}

impl ChunkingConfig {
    /// Checks the percentile range.
    pub fn validate(&self) -> Result<(), ChunkingError> {
        if !(0.0..=100.0).contains(&self.breakpoint_percentile) {
            return Err(ChunkingError::InvalidConfig(format!(
                "breakpoint_percentile must be within [0, 100], got {}",
                self.breakpoint_percentile
            )));
        }
        Ok(())
    }
}

/// Ingestion parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Register image fragments of uploaded documents in the image space.
    ///
    /// Live-acquired documents always register their images. Uploaded
    /// documents do not unless this is set.
    pub register_upload_images: bool,
    /// Documents requested per live-acquisition round
    pub live_documents: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            register_upload_images: false,
            live_documents: DEFAULT_LIVE_DOCUMENTS,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory holding one JSON file per document
    pub database_path: PathBuf,
    /// Embedding dimension shared by the text and metadata spaces
    pub dimension: usize,
    /// Embedding dimension of the image space
    pub image_dimension: usize,
    /// Neighbours requested from each space
    pub top_k: usize,
    /// Semantic chunker parameters
    pub chunking: ChunkingConfig,
    /// Ingestion parameters
    pub indexer: IndexerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_DIR),
            dimension: EMBEDDING_DIM,
            image_dimension: EMBEDDING_DIM,
            top_k: DEFAULT_TOP_K,
            chunking: ChunkingConfig::default(),
            indexer: IndexerConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parses a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dimension == 0 || self.image_dimension == 0 {
            return Err(ConfigError::Invalid("dimension must be positive".into()));
        }
        if self.top_k == 0 {
            return Err(ConfigError::Invalid("top_k must be positive".into()));
        }
        self.chunking
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}
