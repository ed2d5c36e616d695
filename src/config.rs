//! Configuration for the segmenter, vector index, and embedding provider.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::types::RagError;

/// Parameters for the overlapping text segmenter.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct SegmenterConfig {
    /// Window length in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    pub overlap: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
        }
    }
}

impl SegmenterConfig {
    pub fn validate(&self) -> Result<(), RagError> {
        if self.chunk_size == 0 {
            return Err(RagError::Configuration(
                "chunk_size must be greater than zero".into(),
            ));
        }
        if self.overlap >= self.chunk_size {
            return Err(RagError::Configuration(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Identity of the vector index: table name and vector dimension.
///
/// The similarity metric is cosine and is not configurable.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexConfig {
    pub table: String,
    pub dimension: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            table: "document_vectors".into(),
            dimension: 1536,
        }
    }
}

impl IndexConfig {
    pub fn validate(&self) -> Result<(), RagError> {
        if self.dimension == 0 {
            return Err(RagError::Configuration(
                "index dimension must be greater than zero".into(),
            ));
        }
        let mut chars = self.table.chars();
        let head_ok = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        if !head_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(RagError::Configuration(format!(
                "index table name '{}' is not a valid identifier",
                self.table
            )));
        }
        Ok(())
    }
}

/// Connection and batching knobs for the HTTP embedding provider.
#[derive(Clone, Debug)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimension: usize,
    pub base_url: Url,
    pub api_key: String,
    /// Applied to every HTTP call; a timeout maps to a retryable failure.
    pub timeout: Duration,
    /// Inputs sent per request.
    pub batch_size: usize,
    /// Concurrent in-flight requests.
    pub max_concurrency: usize,
    /// Retries per request on transient failures.
    pub max_retries: u32,
    /// Base delay for exponential backoff between retries.
    pub retry_base_delay: Duration,
}

impl EmbeddingConfig {
    /// Defaults matching the `text-embedding-ada-002` deployment.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            model: "text-embedding-ada-002".into(),
            dimension: 1536,
            base_url: Url::parse("https://api.openai.com/v1/").expect("static url"),
            api_key: api_key.into(),
            timeout: Duration::from_secs(30),
            batch_size: 16,
            max_concurrency: 4,
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
        }
    }

    /// Reads credentials and optional overrides from the environment.
    ///
    /// Requires `OPENAI_API_KEY`; honors `RAGDOC_EMBEDDING_MODEL`,
    /// `RAGDOC_EMBEDDING_DIMENSION`, and `RAGDOC_EMBEDDING_BASE_URL`.
    pub fn from_env() -> Result<Self, RagError> {
        dotenvy::dotenv().ok();
        let api_key = env::var("OPENAI_API_KEY")
            .map_err(|_| RagError::Configuration("OPENAI_API_KEY is not set".into()))?;
        let mut config = Self::new(api_key);
        if let Ok(model) = env::var("RAGDOC_EMBEDDING_MODEL") {
            config.model = model;
        }
        if let Ok(dimension) = env::var("RAGDOC_EMBEDDING_DIMENSION") {
            config.dimension = dimension.parse().map_err(|_| {
                RagError::Configuration(format!(
                    "RAGDOC_EMBEDDING_DIMENSION '{dimension}' is not a number"
                ))
            })?;
        }
        if let Ok(base_url) = env::var("RAGDOC_EMBEDDING_BASE_URL") {
            config.base_url = Url::parse(&base_url).map_err(|err| {
                RagError::Configuration(format!("invalid RAGDOC_EMBEDDING_BASE_URL: {err}"))
            })?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RagError> {
        if self.dimension == 0 {
            return Err(RagError::Configuration(
                "embedding dimension must be greater than zero".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(RagError::Configuration(
                "batch_size must be greater than zero".into(),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(RagError::Configuration(
                "max_concurrency must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Resolves the `/embeddings` endpoint relative to `base_url`.
    pub(crate) fn endpoint(&self) -> Result<Url, RagError> {
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.join("embeddings")
            .map_err(|err| RagError::Configuration(format!("invalid embedding base url: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_segmenter_is_valid() {
        assert!(SegmenterConfig::default().validate().is_ok());
    }

    #[test]
    fn overlap_must_stay_below_chunk_size() {
        let config = SegmenterConfig {
            chunk_size: 100,
            overlap: 100,
        };
        assert!(matches!(
            config.validate(),
            Err(RagError::Configuration(_))
        ));
    }

    #[test]
    fn zero_chunk_size_rejected() {
        let config = SegmenterConfig {
            chunk_size: 0,
            overlap: 0,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn index_table_name_must_be_identifier() {
        let bad = IndexConfig {
            table: "vectors; drop table".into(),
            dimension: 8,
        };
        assert!(bad.validate().is_err());
        assert!(IndexConfig::default().validate().is_ok());
    }

    #[test]
    fn endpoint_preserves_base_path() {
        let mut config = EmbeddingConfig::new("key");
        config.base_url = Url::parse("https://example.com/v1").unwrap();
        assert_eq!(
            config.endpoint().unwrap().as_str(),
            "https://example.com/v1/embeddings"
        );
    }
}
