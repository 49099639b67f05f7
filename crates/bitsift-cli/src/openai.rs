//! Collaborators backed by an OpenAI-compatible HTTP API.
//!
//! - [`OpenAiEmbedder`] - `POST /embeddings`, nomic task prefixes
//! - [`OpenAiGenerator`] - question answering and sufficiency checks
//! - [`OpenAiQueryRewriter`] - query normalization and suggestions

use crate::config::OpenAiSettings;
use async_trait::async_trait;
use bitsift_core::collaborators::{
    Generator, ImageEmbedder, QueryRewriter, Sufficiency, TextEmbedder,
};
use bitsift_core::error::{CollaboratorError, EmbeddingError};
use serde_json::{json, Value};
use tracing::debug;

/// Task prefix for passages.
const DOCUMENT_PREFIX: &str = "search_document: ";

/// Task prefix for queries.
const QUERY_PREFIX: &str = "search_query: ";

/// Prefix of an edit suggestion line in a rewriter reply.
const SUGGESTION_PREFIX: &str = "Suggestion:";

const ANSWER_PROMPT: &str = "You answer questions using documents gathered from news and \
blog sources. The user provides a query and the documents. Answer from the documents. \
If they do not hold enough information, say that the documents do not provide enough \
information.";

const SUFFICIENCY_PROMPT: &str = "You answer questions using documents gathered from news \
and blog sources. The user provides a query and the documents. Answer from the documents. \
If they do not hold enough information, reply with the single word 'False'.";

const REWRITE_PROMPT: &str = "You rewrite search queries. Translate the query to English if \
needed, fix typos, drop punctuation and stopwords, and prefer common vocabulary. \
The input has the form:\nQuery: <query>\nK: <k>\n\
Return <k> rewritten queries, one per line. If the intended query is unclear, you may add \
one line of the form:\nSuggestion: <edit>\nwhere <edit> is the query you think the user meant.";

/// Thin JSON client for one OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    settings: OpenAiSettings,
}

impl OpenAiClient {
    pub fn new(settings: OpenAiSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &OpenAiSettings {
        &self.settings
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, CollaboratorError> {
        let url = format!("{}{}", self.settings.base_url, path);
        let mut req = self.http.post(&url).json(body);
        if !self.settings.api_key.is_empty() {
            req = req.bearer_auth(&self.settings.api_key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| CollaboratorError::Unavailable(format!("{url}: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(CollaboratorError::RequestFailed(format!(
                "{url} returned {status}: {text}"
            )));
        }

        resp.json::<Value>()
            .await
            .map_err(|e| CollaboratorError::MalformedResponse(e.to_string()))
    }

    /// One chat completion; returns the first choice's message content.
    async fn chat(&self, system: &str, user: &str) -> Result<String, CollaboratorError> {
        let body = json!({
            "model": self.settings.chat_model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });
        let reply = self.post("/chat/completions", &body).await?;
        reply["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| CollaboratorError::MalformedResponse("no choices in response".into()))
    }

    async fn embeddings(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let expected = inputs.len();
        let body = json!({
            "model": self.settings.embed_model,
            "input": inputs,
        });
        let reply = self.post("/embeddings", &body).await?;
        let vectors = parse_embeddings(&reply)?;
        if vectors.len() != expected {
            return Err(EmbeddingError::MalformedResponse(format!(
                "expected {expected} embeddings, got {}",
                vectors.len()
            )));
        }
        Ok(vectors)
    }
}

/// Extracts `data[*].embedding`, ordered by each entry's `index`.
fn parse_embeddings(reply: &Value) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let data = reply["data"]
        .as_array()
        .ok_or_else(|| EmbeddingError::MalformedResponse("missing data array".into()))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, entry) in data.iter().enumerate() {
        let index = entry["index"].as_u64().map(|i| i as usize).unwrap_or(position);
        let vector = entry["embedding"]
            .as_array()
            .ok_or_else(|| EmbeddingError::MalformedResponse("missing embedding".into()))?
            .iter()
            .map(|x| {
                x.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| EmbeddingError::MalformedResponse("non-numeric component".into()))
            })
            .collect::<Result<Vec<f32>, _>>()?;
        indexed.push((index, vector));
    }
    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

/// Rejects vectors whose length is not the configured dimension.
fn check_dimension(
    vectors: Vec<Vec<f32>>,
    dimension: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    match vectors.iter().find(|v| v.len() != dimension) {
        Some(v) => Err(EmbeddingError::MalformedResponse(format!(
            "expected {dimension}-dimensional embeddings, got {}",
            v.len()
        ))),
        None => Ok(vectors),
    }
}

/// Text and image embedder using the nomic task-prefix convention.
pub struct OpenAiEmbedder {
    client: OpenAiClient,
    dimension: usize,
}

impl OpenAiEmbedder {
    pub fn new(client: OpenAiClient, dimension: usize) -> Self {
        Self { client, dimension }
    }

    async fn embed_many(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        check_dimension(self.client.embeddings(inputs).await?, self.dimension)
    }

    async fn embed_one(&self, text: String) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_many(vec![text])
            .await?
            .pop()
            .ok_or_else(|| EmbeddingError::MalformedResponse("empty embedding list".into()))
    }
}

#[async_trait]
impl TextEmbedder for OpenAiEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_one(format!("{DOCUMENT_PREFIX}{text}")).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        debug!("Embedding batch of {}", texts.len());
        let inputs = texts.iter().map(|t| format!("{DOCUMENT_PREFIX}{t}")).collect();
        self.embed_many(inputs).await
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_one(format!("{QUERY_PREFIX}{query}")).await
    }
}

#[async_trait]
impl ImageEmbedder for OpenAiEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_image_url(&self, url: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_one(url.to_string()).await
    }
}

/// Chat-completion generator.
pub struct OpenAiGenerator {
    client: OpenAiClient,
}

impl OpenAiGenerator {
    pub fn new(client: OpenAiClient) -> Self {
        Self { client }
    }
}

fn qa_message(query: &str, context: &str) -> String {
    format!("Query: {query}\nDocuments:\n{context}")
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn check_sufficiency(
        &self,
        query: &str,
        context: &str,
    ) -> Result<Sufficiency, CollaboratorError> {
        let reply = self
            .client
            .chat(SUFFICIENCY_PROMPT, &qa_message(query, context))
            .await?;
        Ok(Sufficiency::from_reply(&reply))
    }

    async fn generate(&self, query: &str, context: &str) -> Result<String, CollaboratorError> {
        self.client
            .chat(ANSWER_PROMPT, &qa_message(query, context))
            .await
    }
}

/// A parsed rewriter reply.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RewriterReply {
    pub suggestion: Option<String>,
    pub queries: Vec<String>,
}

impl RewriterReply {
    pub fn parse(reply: &str) -> Self {
        let mut parsed = Self::default();
        for line in reply.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match line.strip_prefix(SUGGESTION_PREFIX) {
                Some(edit) => {
                    let edit = edit.trim();
                    if parsed.suggestion.is_none() && !edit.is_empty() {
                        parsed.suggestion = Some(edit.to_string());
                    }
                }
                None => parsed.queries.push(line.to_string()),
            }
        }
        parsed
    }
}

/// Chat-completion query rewriter.
pub struct OpenAiQueryRewriter {
    client: OpenAiClient,
}

impl OpenAiQueryRewriter {
    pub fn new(client: OpenAiClient) -> Self {
        Self { client }
    }

    async fn ask(&self, query: &str, k: usize) -> Result<RewriterReply, CollaboratorError> {
        let reply = self
            .client
            .chat(REWRITE_PROMPT, &format!("Query: {query}\nK: {k}"))
            .await?;
        Ok(RewriterReply::parse(&reply))
    }
}

#[async_trait]
impl QueryRewriter for OpenAiQueryRewriter {
    async fn rewrite(&self, query: &str) -> Result<String, CollaboratorError> {
        self.ask(query, 1)
            .await?
            .queries
            .into_iter()
            .next()
            .ok_or_else(|| {
                CollaboratorError::MalformedResponse("rewriter returned no query".into())
            })
    }

    /// The edit suggestion, if any, comes first.
    async fn suggest(&self, query: &str, k: usize) -> Result<Vec<String>, CollaboratorError> {
        let reply = self.ask(query, k).await?;
        Ok(reply
            .suggestion
            .into_iter()
            .chain(reply.queries)
            .take(k)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_embeddings_orders_by_index() {
        let reply = json!({
            "data": [
                {"index": 1, "embedding": [0.5, -0.5]},
                {"index": 0, "embedding": [1.0, 2.0]},
            ]
        });
        assert_eq!(
            parse_embeddings(&reply).unwrap(),
            vec![vec![1.0, 2.0], vec![0.5, -0.5]]
        );
    }

    #[test]
    fn test_parse_embeddings_rejects_bad_shape() {
        assert!(matches!(
            parse_embeddings(&json!({"error": "nope"})),
            Err(EmbeddingError::MalformedResponse(_))
        ));
        assert!(parse_embeddings(&json!({"data": [{"embedding": ["x"]}]})).is_err());
    }

    #[test]
    fn test_check_dimension() {
        assert!(check_dimension(vec![vec![0.0; 4], vec![1.0; 4]], 4).is_ok());
        assert!(matches!(
            check_dimension(vec![vec![0.0; 4], vec![1.0; 3]], 4),
            Err(EmbeddingError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_rewriter_reply_strips_suggestions() {
        let reply = RewriterReply::parse(
            "Suggestion: weather in hanoi\n\nweather hanoi today\n  hanoi forecast  \n",
        );
        assert_eq!(reply.suggestion.as_deref(), Some("weather in hanoi"));
        assert_eq!(reply.queries, vec!["weather hanoi today", "hanoi forecast"]);
    }

    #[test]
    fn test_rewriter_reply_without_suggestion() {
        let reply = RewriterReply::parse("one\ntwo");
        assert_eq!(reply.suggestion, None);
        assert_eq!(reply.queries.len(), 2);
    }

    #[test]
    fn test_qa_message_layout() {
        assert_eq!(
            qa_message("q", "Document 0:\nx\n\n"),
            "Query: q\nDocuments:\nDocument 0:\nx\n\n"
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint() {
        let client = OpenAiClient::new(OpenAiSettings {
            base_url: "http://127.0.0.1:9".to_string(),
            ..Default::default()
        });
        let embedder = OpenAiEmbedder::new(client, 768);
        let result = embedder.embed("hello").await;
        assert!(matches!(result, Err(EmbeddingError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_unreachable_generator() {
        let client = OpenAiClient::new(OpenAiSettings {
            base_url: "http://127.0.0.1:9".to_string(),
            ..Default::default()
        });
        let result = OpenAiGenerator::new(client).generate("q", "").await;
        assert!(matches!(result, Err(CollaboratorError::Unavailable(_))));
    }
}
