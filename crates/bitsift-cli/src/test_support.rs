//! Offline collaborators for CLI tests.

use crate::inbox::InboxCrawler;
use async_trait::async_trait;
use bitsift_core::collaborators::{Generator, QueryRewriter, Sufficiency, TextEmbedder};
use bitsift_core::config::EngineConfig;
use bitsift_core::error::{CollaboratorError, EmbeddingError};
use bitsift_core::{AppContext, Collaborators};
use std::sync::Arc;
use tempfile::TempDir;

pub const DIM: usize = 8;

/// Embeds every text to the same alternating-sign vector.
pub struct ConstantEmbedder;

#[async_trait]
impl TextEmbedder for ConstantEmbedder {
    fn dimension(&self) -> usize {
        DIM
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok((0..DIM).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect())
    }
}

/// Never satisfied by local context; echoes the query when forced.
pub struct StubbornGenerator;

#[async_trait]
impl Generator for StubbornGenerator {
    async fn check_sufficiency(
        &self,
        _query: &str,
        _context: &str,
    ) -> Result<Sufficiency, CollaboratorError> {
        Ok(Sufficiency::Insufficient)
    }

    async fn generate(&self, query: &str, _context: &str) -> Result<String, CollaboratorError> {
        Ok(format!("answer to {query}"))
    }
}

pub struct IdentityRewriter;

#[async_trait]
impl QueryRewriter for IdentityRewriter {
    async fn rewrite(&self, query: &str) -> Result<String, CollaboratorError> {
        Ok(query.to_string())
    }

    async fn suggest(&self, query: &str, k: usize) -> Result<Vec<String>, CollaboratorError> {
        Ok(vec![query.to_string(); k])
    }
}

/// Engine over `dir` with offline collaborators and an empty inbox.
pub async fn offline_context(dir: &TempDir) -> Arc<AppContext> {
    let config = EngineConfig {
        database_path: dir.path().join("database"),
        dimension: DIM,
        image_dimension: DIM,
        ..Default::default()
    };
    let collaborators = Collaborators {
        embedder: Arc::new(ConstantEmbedder),
        generator: Arc::new(StubbornGenerator),
        rewriter: Arc::new(IdentityRewriter),
        crawler: Arc::new(InboxCrawler::new(dir.path().join("inbox"))),
    };
    Arc::new(AppContext::bootstrap(config, collaborators).await.unwrap())
}
