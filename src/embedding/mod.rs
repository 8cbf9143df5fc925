//! Embedding client abstraction and provider adapters.
//!
//! Passages and questions are vectorized through [`EmbeddingClient`]. The Google and Ollama
//! adapters issue HTTP requests directly; the hashing client is a deterministic in-process
//! fallback for offline runs.

use crate::config::{Config, EmbeddingProvider};
use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt, stream};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const GOOGLE_MAX_BATCH: usize = 100;
const GOOGLE_CONCURRENT_BATCHES: usize = 4;
const DEFAULT_HASHING_DIMENSION: usize = 256;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider could not be reached.
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider response could not be decoded.
    #[error("Malformed embedding response: {0}")]
    InvalidResponse(String),
    /// Provider returned vectors of an unexpected size.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension configured on the server.
        expected: usize,
        /// Dimension produced by the provider.
        actual: usize,
    },
}

/// Retrieval role of the text being embedded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmbeddingTask {
    /// A passage stored in the index, optionally tagged with its document title.
    Document {
        /// Display name of the source document.
        title: Option<String>,
    },
    /// A question matched against stored passages.
    Query,
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce one embedding vector per supplied text, in input order.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
        task: EmbeddingTask,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// Build an embedding client for an explicit configuration.
pub fn build_embedding_client(
    config: &Config,
) -> Result<Arc<dyn EmbeddingClient>, EmbeddingClientError> {
    let timeout = Duration::from_secs(config.embedding_timeout_secs);
    tracing::info!(
        provider = ?config.embedding_provider,
        model = %config.embedding_model,
        "Initializing embedding client"
    );
    match config.embedding_provider {
        EmbeddingProvider::Google => {
            let api_key = config.google_api_key.clone().ok_or_else(|| {
                EmbeddingClientError::ProviderUnavailable("GOOGLE_API_KEY is not set".into())
            })?;
            Ok(Arc::new(GoogleEmbeddingClient::new(
                config.google_api_base_url.clone(),
                api_key,
                config.embedding_model.clone(),
                timeout,
            )?))
        }
        EmbeddingProvider::Ollama => Ok(Arc::new(OllamaEmbeddingClient::new(
            config.ollama_url.clone(),
            config.embedding_model.clone(),
            timeout,
        )?)),
        EmbeddingProvider::Hashing => Ok(Arc::new(HashingEmbeddingClient::new(
            config
                .embedding_dimension
                .unwrap_or(DEFAULT_HASHING_DIMENSION),
        ))),
    }
}

/// Reject vectors whose size differs from the configured dimension.
pub fn ensure_dimension(
    vectors: &[Vec<f32>],
    expected: Option<usize>,
) -> Result<(), EmbeddingClientError> {
    let Some(expected) = expected else {
        return Ok(());
    };
    match vectors.iter().find(|vector| vector.len() != expected) {
        Some(vector) => Err(EmbeddingClientError::DimensionMismatch {
            expected,
            actual: vector.len(),
        }),
        None => Ok(()),
    }
}

fn http_client(timeout: Duration) -> Result<Client, EmbeddingClientError> {
    Client::builder()
        .user_agent("rusty-rag/embedding")
        .timeout(timeout)
        .build()
        .map_err(|error| EmbeddingClientError::ProviderUnavailable(error.to_string()))
}

async fn error_for_status(response: reqwest::Response) -> EmbeddingClientError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    EmbeddingClientError::GenerationFailed(format!("provider returned {status}: {body}"))
}

/// Google Generative Language `batchEmbedContents` adapter.
pub struct GoogleEmbeddingClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct GoogleBatchResponse {
    #[serde(default)]
    embeddings: Vec<GoogleEmbedding>,
}

#[derive(Debug, Deserialize)]
struct GoogleEmbedding {
    values: Vec<f32>,
}

impl GoogleEmbeddingClient {
    /// Construct a client against `base_url`, normally
    /// `https://generativelanguage.googleapis.com`.
    pub fn new(
        base_url: String,
        api_key: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self, EmbeddingClientError> {
        Ok(Self {
            http: http_client(timeout)?,
            base_url,
            api_key,
            model,
        })
    }

    fn model_path(&self) -> String {
        if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/{}:batchEmbedContents",
            self.base_url.trim_end_matches('/'),
            self.model_path()
        )
    }

    async fn embed_batch(
        &self,
        texts: Vec<String>,
        task: &EmbeddingTask,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let model = self.model_path();
        let requests: Vec<_> = texts
            .iter()
            .map(|text| {
                let mut request = json!({
                    "model": model,
                    "content": { "parts": [{ "text": text }] },
                });
                match task {
                    EmbeddingTask::Document { title } => {
                        request["taskType"] = json!("RETRIEVAL_DOCUMENT");
                        if let Some(title) = title {
                            request["title"] = json!(title);
                        }
                    }
                    EmbeddingTask::Query => {
                        request["taskType"] = json!("RETRIEVAL_QUERY");
                    }
                }
                request
            })
            .collect();

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&json!({ "requests": requests }))
            .send()
            .await
            .map_err(|error| {
                EmbeddingClientError::ProviderUnavailable(format!(
                    "failed to reach {}: {error}",
                    self.base_url
                ))
            })?;

        if !response.status().is_success() {
            return Err(error_for_status(response).await);
        }

        let body: GoogleBatchResponse = response.json().await.map_err(|error| {
            EmbeddingClientError::InvalidResponse(format!("failed to decode response: {error}"))
        })?;

        if body.embeddings.len() != texts.len() {
            return Err(EmbeddingClientError::InvalidResponse(format!(
                "expected {} embeddings, received {}",
                texts.len(),
                body.embeddings.len()
            )));
        }

        Ok(body
            .embeddings
            .into_iter()
            .map(|embedding| embedding.values)
            .collect())
    }
}

#[async_trait]
impl EmbeddingClient for GoogleEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
        task: EmbeddingTask,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!(model = %self.model, count = texts.len(), ?task, "Requesting embeddings");

        let batches: Vec<Vec<String>> = texts
            .chunks(GOOGLE_MAX_BATCH)
            .map(<[String]>::to_vec)
            .collect();
        let task = &task;
        let results: Vec<Vec<Vec<f32>>> = stream::iter(batches)
            .map(|batch| self.embed_batch(batch, task))
            .buffered(GOOGLE_CONCURRENT_BATCHES)
            .try_collect()
            .await?;

        Ok(results.into_iter().flatten().collect())
    }
}

/// Ollama `/api/embed` adapter.
pub struct OllamaEmbeddingClient {
    http: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

impl OllamaEmbeddingClient {
    /// Construct a client against a running Ollama instance.
    pub fn new(
        base_url: String,
        model: String,
        timeout: Duration,
    ) -> Result<Self, EmbeddingClientError> {
        Ok(Self {
            http: http_client(timeout)?,
            base_url,
            model,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embed", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
        _task: EmbeddingTask,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let expected = texts.len();
        let response = self
            .http
            .post(self.endpoint())
            .json(&json!({ "model": self.model, "input": texts }))
            .send()
            .await
            .map_err(|error| {
                EmbeddingClientError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if !response.status().is_success() {
            return Err(error_for_status(response).await);
        }

        let body: OllamaEmbedResponse = response.json().await.map_err(|error| {
            EmbeddingClientError::InvalidResponse(format!(
                "failed to decode Ollama response: {error}"
            ))
        })?;
        if body.embeddings.len() != expected {
            return Err(EmbeddingClientError::InvalidResponse(format!(
                "expected {expected} embeddings, received {}",
                body.embeddings.len()
            )));
        }
        Ok(body.embeddings)
    }
}

/// Deterministic embedding client that hashes words into a normalized vector.
pub struct HashingEmbeddingClient {
    dimension: usize,
}

impl HashingEmbeddingClient {
    /// Construct a hashing client producing vectors of `dimension` slots.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(text: &str, dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; dimension];

        for word in text.split_whitespace() {
            let normalized = word
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if normalized.is_empty() {
                continue;
            }
            // FNV-1a keeps slot assignment stable across runs and platforms.
            let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
            for byte in normalized.bytes() {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(0x0100_0000_01b3);
            }
            embedding[(hash % dimension as u64) as usize] += 1.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();
        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }
        embedding
    }
}

#[async_trait]
impl EmbeddingClient for HashingEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
        _task: EmbeddingTask,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }
        Ok(texts
            .iter()
            .map(|text| Self::encode(text, self.dimension))
            .collect())
    }
}
