//! Embedding providers: the collaborator that maps text to vectors.
//!
//! The pipeline only depends on [`EmbeddingProvider`]. The HTTP
//! implementation batches inputs, bounds concurrent in-flight requests with
//! a semaphore, applies a timeout to every call, and retries transient
//! failures with exponential backoff. A whole request fails if any item
//! fails; partial results are never returned.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::debug;

use crate::config::EmbeddingConfig;
use crate::types::RagError;

/// Order-preserving batch embedding: one vector per input text.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds every text, or fails as a whole. An empty input yields an
    /// empty output.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;

    /// Length of every vector this provider produces.
    fn dimension(&self) -> usize;

    /// Human-readable provider name for logs.
    fn name(&self) -> &str;
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    index: usize,
    embedding: Vec<f32>,
}

/// Client for OpenAI-compatible `/embeddings` endpoints.
#[derive(Clone)]
pub struct OpenAiEmbeddingProvider {
    client: reqwest::Client,
    config: Arc<EmbeddingConfig>,
}

impl OpenAiEmbeddingProvider {
    pub fn new(config: EmbeddingConfig) -> Result<Self, RagError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| {
                RagError::Configuration(format!("unable to build http client: {err}"))
            })?;
        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    /// Builds a provider from `OPENAI_API_KEY` and related variables.
    pub fn from_env() -> Result<Self, RagError> {
        Self::new(EmbeddingConfig::from_env()?)
    }

    async fn embed_with_retry(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut attempt: u32 = 0;
        loop {
            match self.request_embeddings(batch).await {
                Ok(vectors) => return Ok(vectors),
                Err(err) if err.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let delay = self.config.retry_base_delay * 2u32.saturating_pow(attempt - 1);
                    debug!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying embedding request"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn request_embeddings(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let endpoint = self.config.endpoint()?;
        let request = EmbeddingRequest {
            model: &self.config.model,
            input: batch,
        };
        let send = self
            .client
            .post(endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send();
        let response = timeout(self.config.timeout, send)
            .await
            .map_err(|_| RagError::embedding_transient("embedding request timed out"))?
            .map_err(|err| {
                RagError::embedding_transient(format!("embedding request failed: {err}"))
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(RagError::embedding_transient(format!(
                "embedding endpoint returned {status}"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::embedding_permanent(format!(
                "embedding endpoint returned {status}: {body}"
            )));
        }

        let payload: EmbeddingResponse = response.json().await.map_err(|err| {
            RagError::embedding_permanent(format!("malformed embedding response: {err}"))
        })?;
        if payload.data.len() != batch.len() {
            return Err(RagError::embedding_permanent(format!(
                "embedding endpoint returned {} vectors for {} inputs",
                payload.data.len(),
                batch.len()
            )));
        }

        let mut rows = payload.data;
        rows.sort_by_key(|row| row.index);
        for row in &rows {
            if row.embedding.len() != self.config.dimension {
                return Err(RagError::embedding_permanent(format!(
                    "embedding dimension {} does not match configured {}",
                    row.embedding.len(),
                    self.config.dimension
                )));
            }
        }
        Ok(rows.into_iter().map(|row| row.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency));
        let mut handles = Vec::new();
        for batch in texts.chunks(self.config.batch_size) {
            let provider = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let batch: Vec<String> = batch.to_vec();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| RagError::embedding_permanent("embedding pool closed"))?;
                provider.embed_with_retry(&batch).await
            }));
        }

        // Join in submission order so results line up with inputs; the
        // first failure wins and the whole call fails.
        let mut vectors = Vec::with_capacity(texts.len());
        let mut failure: Option<RagError> = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(mut batch_vectors)) => {
                    if failure.is_none() {
                        vectors.append(&mut batch_vectors);
                    }
                }
                Ok(Err(err)) => {
                    failure.get_or_insert(err);
                }
                Err(err) => {
                    failure.get_or_insert(RagError::embedding_permanent(format!(
                        "embedding task failed: {err}"
                    )));
                }
            }
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(vectors),
        }
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Deterministic provider for tests: the vector is a pure function of the
/// input text, unit-length, and stable across calls.
#[derive(Clone, Copy, Debug)]
pub struct MockEmbeddingProvider {
    dimension: usize,
}

impl MockEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new(1536)
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        Ok(texts
            .iter()
            .map(|text| hash_vector(text, self.dimension))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// FNV-1a seed expanded through splitmix64 into a unit vector.
fn hash_vector(text: &str, dimension: usize) -> Vec<f32> {
    let mut seed: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in text.as_bytes() {
        seed ^= u64::from(*byte);
        seed = seed.wrapping_mul(0x0000_0100_0000_01b3);
    }

    let mut state = seed;
    let mut values: Vec<f32> = (0..dimension)
        .map(|_| {
            state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
            let mut z = state;
            z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
            z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
            z ^= z >> 31;
            // Map to [-1, 1).
            (z as f64 / u64::MAX as f64 * 2.0 - 1.0) as f32
        })
        .collect();

    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut values {
            *value /= norm;
        }
    }
    values
}
