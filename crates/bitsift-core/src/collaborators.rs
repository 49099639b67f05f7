//! Contracts of the external collaborators the engine drives.
//!
//! The core never talks to a model, a crawler or a file converter directly.
//! It calls these traits; the CLI crate plugs in HTTP-backed implementations
//! and tests plug in fixed tables.

use crate::error::{CollaboratorError, ConversionError};
use crate::storage::StoredDocument;
use async_trait::async_trait;
use std::path::Path;

pub use crate::embedding::{ImageEmbedder, TextEmbedder};

/// Converter and crawler output: a complete document with every embedding
/// already computed and transport-encoded. Stored as-is.
pub type RawDocument = StoredDocument;

/// Literal reply of the sufficiency prompt when the context cannot answer.
pub const INSUFFICIENT_SENTINEL: &str = "False";

/// Outcome of asking the generator whether a context answers a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sufficiency {
    /// The context is sufficient; carries the answer
    Answer(String),
    /// The context cannot answer the query
    Insufficient,
}

impl Sufficiency {
    /// Interprets a raw model reply. The bare sentinel `False` (surrounding
    /// whitespace and quotes ignored) means insufficient.
    pub fn from_reply(reply: &str) -> Self {
        let trimmed = reply.trim().trim_matches(|c| c == '"' || c == '\'');
        if trimmed == INSUFFICIENT_SENTINEL {
            Sufficiency::Insufficient
        } else {
            Sufficiency::Answer(reply.trim().to_string())
        }
    }
}

/// Hosted language model used for answering.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Answers from `context` if it suffices, otherwise reports insufficiency.
    async fn check_sufficiency(
        &self,
        query: &str,
        context: &str,
    ) -> Result<Sufficiency, CollaboratorError>;

    /// Answers unconditionally from whatever `context` holds.
    async fn generate(&self, query: &str, context: &str) -> Result<String, CollaboratorError>;
}

/// Rewrites user queries into search-engine queries.
#[async_trait]
pub trait QueryRewriter: Send + Sync {
    /// One search query for the live-acquisition round.
    async fn rewrite(&self, query: &str) -> Result<String, CollaboratorError>;

    /// Up to `k` alternative queries.
    async fn suggest(&self, query: &str, k: usize) -> Result<Vec<String>, CollaboratorError>;
}

/// Turns a user-supplied file into a document.
#[async_trait]
pub trait Converter: Send + Sync {
    async fn to_document(&self, path: &Path) -> Result<RawDocument, ConversionError>;
}

/// Live source of fresh documents.
///
/// A crawler may stage intermediate data while fetching; the indexer calls
/// [`clear_staging`](Crawler::clear_staging) once a round is done, whether or
/// not every document was ingested.
#[async_trait]
pub trait Crawler: Send + Sync {
    /// Fetches up to `n` documents relevant to `query`.
    async fn fetch(&self, query: &str, n: usize) -> Result<Vec<RawDocument>, CollaboratorError>;

    /// Drops staged data from the last fetch.
    async fn clear_staging(&self) -> Result<(), CollaboratorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_means_insufficient() {
        assert_eq!(Sufficiency::from_reply("False"), Sufficiency::Insufficient);
        assert_eq!(Sufficiency::from_reply("  False\n"), Sufficiency::Insufficient);
        assert_eq!(Sufficiency::from_reply("\"False\""), Sufficiency::Insufficient);
    }

    #[test]
    fn test_other_reply_is_answer() {
        assert_eq!(
            Sufficiency::from_reply(" Paris is the capital. "),
            Sufficiency::Answer("Paris is the capital.".into())
        );
        assert!(matches!(
            Sufficiency::from_reply("False positives happen"),
            Sufficiency::Answer(_)
        ));
    }
}
