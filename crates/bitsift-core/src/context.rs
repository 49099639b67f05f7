//! Per-process engine wiring.
//!
//! [`AppContext`] is built once at startup from an [`EngineConfig`] and the
//! collaborators, and handed to whatever serves requests. Everything inside is
//! `Arc`-shared.

use crate::chunking::SemanticChunker;
use crate::collaborators::{Crawler, Generator, QueryRewriter};
use crate::config::EngineConfig;
use crate::conversion::TextFileConverter;
use crate::embedding::TextEmbedder;
use crate::error::{BootstrapError, ConfigError};
use crate::indexing::Indexer;
use crate::retrieval::cascade::Cascade;
use crate::retrieval::{Retriever, SpaceSet};
use crate::session::SessionRegistry;
use crate::space::VectorIndex;
use crate::storage::{DocumentStore, JsonDirStore};
use std::sync::Arc;
use tracing::info;

/// External collaborators the engine needs.
#[derive(Clone)]
pub struct Collaborators {
    pub embedder: Arc<dyn TextEmbedder>,
    pub generator: Arc<dyn Generator>,
    pub rewriter: Arc<dyn QueryRewriter>,
    pub crawler: Arc<dyn Crawler>,
}

/// Every shared component of a running engine.
pub struct AppContext {
    pub config: EngineConfig,
    pub store: Arc<dyn DocumentStore>,
    pub spaces: SpaceSet,
    pub retriever: Retriever,
    pub indexer: Arc<Indexer>,
    pub cascade: Arc<Cascade>,
    pub sessions: Arc<SessionRegistry>,
}

impl AppContext {
    /// Opens the JSON store at `config.database_path` and wires the engine.
    pub async fn bootstrap(
        config: EngineConfig,
        collaborators: Collaborators,
    ) -> Result<Self, BootstrapError> {
        config.validate()?;
        let store = Arc::new(JsonDirStore::open(&config.database_path).await?);
        Self::with_store(config, store, collaborators).await
    }

    /// Wires the engine over an already opened store.
    ///
    /// The text embedder must produce vectors of `config.dimension`.
    pub async fn with_store(
        config: EngineConfig,
        store: Arc<dyn DocumentStore>,
        collaborators: Collaborators,
    ) -> Result<Self, BootstrapError> {
        let embedder_dimension = collaborators.embedder.dimension();
        if embedder_dimension != config.dimension {
            return Err(ConfigError::Invalid(format!(
                "embedder produces {} dimensions, spaces expect {}",
                embedder_dimension, config.dimension
            ))
            .into());
        }

        let spaces =
            SpaceSet::build(store.as_ref(), config.dimension, config.image_dimension).await?;

        let chunker =
            SemanticChunker::new(collaborators.embedder.clone(), config.chunking.clone())?;
        let converter = TextFileConverter::new(collaborators.embedder.clone(), chunker);

        let indexer = Arc::new(
            Indexer::new(store.clone(), spaces.clone(), config.indexer.clone())
                .with_crawler(collaborators.crawler)
                .with_converter(Arc::new(converter)),
        );
        let retriever = Retriever::new(spaces.clone(), store.clone());
        let cascade = Arc::new(Cascade::new(
            collaborators.embedder,
            collaborators.generator,
            collaborators.rewriter,
            retriever.clone(),
            indexer.clone(),
            config.top_k,
        ));

        info!(
            "Engine ready: {} text, {} metadata, {} image points",
            spaces.text.len(),
            spaces.metadata.len(),
            spaces.image.len()
        );

        Ok(Self {
            config,
            store,
            spaces,
            retriever,
            indexer,
            cascade,
            sessions: Arc::new(SessionRegistry::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{
        article, CountingCrawler, FixedRewriter, ScriptedGenerator, TableEmbedder,
    };
    use tempfile::TempDir;

    fn collaborators() -> Collaborators {
        Collaborators {
            embedder: Arc::new(TableEmbedder::new(8)),
            generator: Arc::new(ScriptedGenerator::default()),
            rewriter: Arc::new(FixedRewriter::default()),
            crawler: Arc::new(CountingCrawler::default()),
        }
    }

    fn config(dir: &TempDir) -> EngineConfig {
        EngineConfig {
            database_path: dir.path().to_path_buf(),
            dimension: 8,
            image_dimension: 8,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_bootstrap_rebuilds_spaces_from_disk() {
        let dir = TempDir::new().unwrap();
        {
            let store = JsonDirStore::open(dir.path()).await.unwrap();
            let doc = article("doc1", &[("a", &[1.0; 8]), ("b", &[-1.0; 8])], "T", &[1.0; 8]);
            store.put_document(&doc).await.unwrap();
        }

        let ctx = AppContext::bootstrap(config(&dir), collaborators())
            .await
            .unwrap();

        assert_eq!(ctx.spaces.text.len(), 2);
        assert_eq!(ctx.spaces.metadata.len(), 1);
        assert_eq!(ctx.sessions.len(), 0);
    }

    #[tokio::test]
    async fn test_ingest_file_through_context() {
        let dir = TempDir::new().unwrap();
        let ctx = AppContext::bootstrap(config(&dir), collaborators())
            .await
            .unwrap();

        let file = dir.path().join("note.txt");
        std::fs::write(&file, "hello there").unwrap();
        let report = ctx.indexer.ingest_file(&file).await.unwrap();

        assert_eq!(report.text_points, 1);
        assert_eq!(ctx.spaces.text.len(), 1);
        assert!(ctx.store.get_document(&report.document_id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_bootstrap_rejects_invalid_config() {
        let dir = TempDir::new().unwrap();
        let mut bad = config(&dir);
        bad.top_k = 0;
        let result = AppContext::bootstrap(bad, collaborators()).await;
        assert!(matches!(result, Err(BootstrapError::Config(_))));
    }

    #[tokio::test]
    async fn test_bootstrap_rejects_embedder_dimension_mismatch() {
        let dir = TempDir::new().unwrap();
        let mut collab = collaborators();
        collab.embedder = Arc::new(TableEmbedder::new(16));

        let result = AppContext::bootstrap(config(&dir), collab).await;
        assert!(matches!(
            result,
            Err(BootstrapError::Config(ConfigError::Invalid(ref msg))) if msg.contains("16")
        ));
    }
}
