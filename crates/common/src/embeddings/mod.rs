//! Embedding service abstraction
//!
//! Provides a unified interface for query-time embedding providers:
//! - OpenAI-compatible HTTP APIs (text-embedding-3-small, hosted proxies)
//! - A deterministic local mock for development and tests
//!
//! Providers are stateless translation boundaries: no retries, no caching.
//! Callers cancel an in-flight request by dropping its future.

use crate::config::EmbeddingConfig;
use crate::metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Inputs per provider request
pub const EMBEDDING_BATCH_SIZE: usize = 100;

/// Result type alias for embedding calls
pub type EmbeddingResult<T> = std::result::Result<T, EmbeddingError>;

/// Reportable embedding failures
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Embedding request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Embedding provider rate limited the request")]
    RateLimited,

    #[error("Embedding request failed: {message}")]
    Request { message: String },

    #[error("Embedding provider returned {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("Malformed embedding response: {message}")]
    MalformedResponse { message: String },

    #[error("Embedding provider misconfigured: {message}")]
    Configuration { message: String },
}

/// Trait for embedding generation
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate embedding for a single text
    async fn embed_one(&self, text: &str) -> EmbeddingResult<Vec<f32>>;

    /// Generate embeddings for multiple texts, one per input, same order
    async fn embed_many(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>>;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;
}

/// OpenAI-compatible embedding client
pub struct HttpEmbeddingClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimension: usize,
    base_url: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a [String],
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

impl HttpEmbeddingClient {
    /// Create a new client from configuration
    pub fn new(config: &EmbeddingConfig) -> EmbeddingResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| EmbeddingError::Configuration {
                message: "embedding.api_key is required for the openai provider".to_string(),
            })?;

        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmbeddingError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            model: config.model.clone(),
            dimension: config.dimension,
            base_url: config
                .api_base
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
                .trim_end_matches('/')
                .to_string(),
            timeout,
        })
    }

    async fn make_request(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);

        let request = EmbeddingRequest {
            input: texts,
            model: &self.model,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify_transport_error(e))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(EmbeddingError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| self.classify_transport_error(e))?;

        parse_response(&body, texts.len())
    }

    fn classify_transport_error(&self, err: reqwest::Error) -> EmbeddingError {
        if err.is_timeout() {
            EmbeddingError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }
        } else {
            EmbeddingError::Request {
                message: err.to_string(),
            }
        }
    }

    async fn timed_request(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let start = Instant::now();
        let result = self.make_request(texts).await;

        metrics::record_embedding(
            start.elapsed().as_secs_f64(),
            &self.model,
            texts.len(),
            result.is_ok(),
        );
        if let Err(e) = &result {
            tracing::warn!(model = %self.model, batch = texts.len(), error = %e, "Embedding request failed");
        }

        result
    }
}

/// Decode a provider body into one vector per input, in input order
fn parse_response(body: &[u8], expected: usize) -> EmbeddingResult<Vec<Vec<f32>>> {
    let parsed: EmbeddingResponse =
        serde_json::from_slice(body).map_err(|e| EmbeddingError::MalformedResponse {
            message: format!("Failed to parse response: {}", e),
        })?;

    if parsed.data.len() != expected {
        return Err(EmbeddingError::MalformedResponse {
            message: format!("expected {} embeddings, got {}", expected, parsed.data.len()),
        });
    }

    let mut items = parsed.data;
    // Providers may return items out of order; `index` is authoritative when present
    if items.iter().any(|item| item.index.is_some()) {
        items.sort_by_key(|item| item.index);
        let is_permutation = items
            .iter()
            .enumerate()
            .all(|(position, item)| item.index == Some(position));
        if !is_permutation {
            return Err(EmbeddingError::MalformedResponse {
                message: format!("indices are not a permutation of 0..{}", expected),
            });
        }
    }

    let vectors: Vec<Vec<f32>> = items.into_iter().map(|item| item.embedding).collect();
    if vectors.iter().any(|v| v.is_empty()) {
        return Err(EmbeddingError::MalformedResponse {
            message: "provider returned an empty embedding".to_string(),
        });
    }

    Ok(vectors)
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingClient {
    async fn embed_one(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        let embeddings = self.timed_request(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::MalformedResponse {
                message: "Empty response".to_string(),
            })
    }

    async fn embed_many(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBEDDING_BATCH_SIZE) {
            embeddings.extend(self.timed_request(batch).await?);
        }
        Ok(embeddings)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Deterministic embedder for local runs and tests.
///
/// Hashes lowercase word tokens into `dimension` buckets and L2-normalises the
/// result, so texts sharing vocabulary land close under cosine similarity.
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        if self.dimension == 0 {
            return vector;
        }

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let digest = Sha256::digest(token.to_lowercase().as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        } else {
            // Token-free input still needs a usable direction
            vector[0] = 1.0;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedder {
    async fn embed_one(&self, text: &str) -> EmbeddingResult<Vec<f32>> {
        Ok(self.vector_for(text))
    }

    async fn embed_many(&self, texts: &[String]) -> EmbeddingResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn model_name(&self) -> &str {
        "mock-embedding"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Create an embedder based on configuration
pub fn create_embedder(config: &EmbeddingConfig) -> EmbeddingResult<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(HttpEmbeddingClient::new(config)?)),
        "mock" => Ok(Arc::new(MockEmbedder::new(config.dimension))),
        other => Err(EmbeddingError::Configuration {
            message: format!("unknown embedding provider '{}'", other),
        }),
    }
}
