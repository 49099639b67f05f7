//! Traits for embedding operations.
//!
//! Embedding models are external collaborators: a hosted endpoint, a local
//! inference server, or a fixed table in tests. These traits let the chunker,
//! the converter and the retrieval cascade stay independent of which one is
//! plugged in.

use crate::error::EmbeddingError;
use async_trait::async_trait;

/// Text embedding model.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; a single instance is shared by the
/// chunker, the converter and every query handler.
///
/// # Examples
///
/// ```ignore
/// let embedder: Arc<dyn TextEmbedder> = Arc::new(OpenAiEmbedder::new(client, config));
///
/// let vectors = embedder.embed_batch(&["first paragraph".into(), "second".into()]).await?;
/// assert_eq!(vectors[0].len(), embedder.dimension());
/// ```
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    /// Returns the embedding dimension (vector size).
    fn dimension(&self) -> usize;

    /// Embeds a document passage.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embeds several passages in one call.
    ///
    /// The default implementation calls [`embed`](Self::embed) sequentially.
    /// Returns exactly one vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Embeds a search query.
    ///
    /// Asymmetric models embed queries and passages differently; the default
    /// treats them alike.
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed(query).await
    }
}

/// Image embedding model sharing a latent space with the text query embedder.
#[async_trait]
pub trait ImageEmbedder: Send + Sync {
    /// Returns the embedding dimension.
    fn dimension(&self) -> usize;

    /// Embeds the image found at `url`.
    async fn embed_image_url(&self, url: &str) -> Result<Vec<f32>, EmbeddingError>;
}
