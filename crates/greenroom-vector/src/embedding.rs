//! Embedding services for chunk and query vectorization.
//!
//! The embedding model itself is an external collaborator. This module
//! defines the service trait plus two implementations: a deterministic
//! in-process embedder for tests and local runs, and an HTTP client for a
//! remote inference endpoint.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use greenroom_core::error::{GreenroomError, Result};

/// Trait for services that turn text into fixed-dimension vectors.
///
/// `embed_batch` is one-to-one and order-preserving: the i-th output vector
/// embeds the i-th input text. Implementations must be Send-compatible for
/// use in async contexts.
pub trait EmbeddingService {
    /// Embed a batch of texts, one vector per input, in input order.
    fn embed_batch(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Vec<f32>>>> + Send;

    /// The dimensionality of vectors produced by this service.
    fn dimensions(&self) -> usize;
}

/// Object-safe companion to [`EmbeddingService`].
///
/// The primary trait uses `impl Future` return types, which prevents
/// `dyn EmbeddingService`. This trait boxes the future so services can be
/// stored as trait objects; a blanket impl covers every `EmbeddingService`.
pub trait DynEmbeddingService: Send + Sync {
    /// Embed a batch of texts, returning a boxed future.
    fn embed_batch_boxed<'a>(
        &'a self,
        texts: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Vec<f32>>>> + Send + 'a>>;

    /// The dimensionality of vectors produced by this service.
    fn dimensions(&self) -> usize;
}

impl<T> DynEmbeddingService for T
where
    T: EmbeddingService + Send + Sync,
{
    fn embed_batch_boxed<'a>(
        &'a self,
        texts: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<Vec<Vec<f32>>>> + Send + 'a>> {
        Box::pin(self.embed_batch(texts))
    }

    fn dimensions(&self) -> usize {
        EmbeddingService::dimensions(self)
    }
}

// ============================================================================
// Remote HTTP embedder
// ============================================================================

const MAX_RETRIES: usize = 3;

/// Embedding client for a remote inference endpoint.
///
/// Sends `{"model": ..., "input": [...]}` and accepts either the
/// `{"data": [{"embedding": [...], "index": n}]}` response shape or a bare
/// `{"embeddings": [[...]]}` array. Transient failures (429 and 5xx, plus
/// connect/timeout errors) are retried with exponential backoff.
#[derive(Clone)]
pub struct HttpEmbedding {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dimensions: usize,
}

impl HttpEmbedding {
    /// Build a client for the given inference endpoint.
    ///
    /// `dimensions` is the expected vector size; responses with a different
    /// dimensionality are rejected rather than silently indexed.
    pub fn new(endpoint: &str, model: &str, dimensions: usize, timeout: Duration) -> Result<Self> {
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(GreenroomError::Config(format!(
                "embedding endpoint must be an http(s) URL: {}",
                endpoint
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GreenroomError::Embedding(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            dimensions,
        })
    }

    async fn request_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut attempt = 0usize;
        loop {
            let request = EmbedRequest {
                model: &self.model,
                input: texts,
            };
            match self.client.post(&self.endpoint).json(&request).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let payload: EmbedResponse = resp.json().await.map_err(|e| {
                            GreenroomError::Embedding(format!(
                                "failed to parse embedding response: {}",
                                e
                            ))
                        })?;
                        let vectors = payload.into_vectors(texts.len())?;
                        for vector in &vectors {
                            if vector.len() != self.dimensions {
                                return Err(GreenroomError::Embedding(format!(
                                    "expected {}-dimensional vectors, got {}",
                                    self.dimensions,
                                    vector.len()
                                )));
                            }
                        }
                        return Ok(vectors);
                    }
                    let body = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if should_retry(status) && attempt + 1 < MAX_RETRIES {
                        attempt += 1;
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(GreenroomError::Embedding(format!(
                        "embedding request failed ({}): {}",
                        status, body
                    )));
                }
                Err(err) => {
                    if (err.is_connect() || err.is_timeout()) && attempt + 1 < MAX_RETRIES {
                        attempt += 1;
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(GreenroomError::Embedding(format!(
                        "embedding request failed: {}",
                        err
                    )));
                }
            }
        }
    }
}

impl EmbeddingService for HttpEmbedding {
    fn embed_batch(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Vec<f32>>>> + Send {
        async move {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            self.request_batch(texts).await
        }
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(250 * (1 << capped))
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    data: Vec<EmbedData>,
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

impl EmbedResponse {
    fn into_vectors(self, expected_len: usize) -> Result<Vec<Vec<f32>>> {
        if !self.data.is_empty() {
            if self.data.len() != expected_len {
                return Err(GreenroomError::Embedding(format!(
                    "endpoint returned {} embeddings for {} inputs",
                    self.data.len(),
                    expected_len
                )));
            }
            let mut data = self.data;
            data.sort_by_key(|d| d.index.unwrap_or(0));
            return Ok(data.into_iter().map(|d| d.embedding).collect());
        }
        if !self.embeddings.is_empty() {
            if self.embeddings.len() != expected_len {
                return Err(GreenroomError::Embedding(format!(
                    "endpoint returned {} embeddings for {} inputs",
                    self.embeddings.len(),
                    expected_len
                )));
            }
            return Ok(self.embeddings);
        }
        Err(GreenroomError::Embedding(
            "embedding response missing vector payloads".to_string(),
        ))
    }
}

// ============================================================================
// Deterministic in-process embedder
// ============================================================================

/// Deterministic embedding service for tests and local runs.
///
/// Hashes the input text into a pseudo-random but stable vector: the same
/// text always produces the same embedding, and different texts produce
/// different embeddings with high probability. Vectors are L2-normalized so
/// cosine similarity behaves like the real thing.
#[derive(Debug, Clone)]
pub struct MockEmbedding {
    dimensions: usize,
}

impl MockEmbedding {
    /// Create a mock embedding service with the given output dimension.
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn hash_to_vector(&self, text: &str) -> Vec<f32> {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut vector = Vec::with_capacity(self.dimensions);
        for i in 0..self.dimensions {
            let mut hasher = DefaultHasher::new();
            text.hash(&mut hasher);
            i.hash(&mut hasher);
            let hash = hasher.finish();
            // Scale into [-1.0, 1.0].
            let value = (hash % 10_000) as f32 / 5_000.0 - 1.0;
            vector.push(value);
        }

        // L2-normalize so dot products are cosine similarities.
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vector.iter_mut() {
                *v /= norm;
            }
        }

        vector
    }
}

impl Default for MockEmbedding {
    fn default() -> Self {
        Self::new(384)
    }
}

impl EmbeddingService for MockEmbedding {
    fn embed_batch(
        &self,
        texts: &[String],
    ) -> impl Future<Output = Result<Vec<Vec<f32>>>> + Send {
        let result = if let Some(pos) = texts.iter().position(|t| t.is_empty()) {
            Err(GreenroomError::Embedding(format!(
                "cannot embed empty text (batch position {})",
                pos
            )))
        } else {
            Ok(texts.iter().map(|t| self.hash_to_vector(t)).collect())
        };
        async move { result }
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
