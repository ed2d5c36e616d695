//! Vector storage backends.
//!
//! The [`VectorStore`] trait abstracts a metadata-filterable
//! nearest-neighbor index. Every query carries a [`UserFilter`]; the
//! `user_id` equality predicate is the sole per-user isolation mechanism,
//! so there is no unfiltered query path.
//!
//! ```text
//!                  ┌──────────────────┐
//!                  │ VectorStore trait│
//!                  └────────┬─────────┘
//!                           │
//!              ┌────────────┴────────────┐
//!              ▼                         ▼
//!      ┌───────────────┐        ┌────────────────┐
//!      │ MemoryVector  │        │ SqliteVector   │
//!      │ Store (tests) │        │ Store (vec ext)│
//!      └───────────────┘        └────────────────┘
//! ```

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::RagError;

pub use memory::MemoryVectorStore;
pub use sqlite::{SqliteDocumentStore, SqliteVectorStore};

/// Metadata carried alongside every stored vector.
///
/// Retrieval reads answers straight from this bag, so no secondary lookup
/// is needed. Every field defaults when absent: legacy records with partial
/// metadata map instead of failing the query.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub document_id: String,
    #[serde(default)]
    pub document_name: String,
    #[serde(default)]
    pub document_type: String,
    #[serde(default)]
    pub chunk_index: usize,
    #[serde(default)]
    pub text_content: String,
    #[serde(default)]
    pub source: String,
}

/// A vector ready for storage, keyed by a deterministic identifier.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// One similarity match, highest score first in query results.
#[derive(Clone, Debug)]
pub struct VectorMatch {
    pub id: String,
    /// Cosine similarity in `[-1, 1]`, larger is closer.
    pub score: f32,
    pub metadata: ChunkMetadata,
}

/// Mandatory per-user isolation predicate for queries.
#[derive(Clone, Debug)]
pub struct UserFilter {
    pub user_id: String,
}

impl UserFilter {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// Distinguishes "nothing to store" from "stored n records".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// Empty input; zero effect on the index.
    NoOp,
    Stored(usize),
}

/// Diagnostic summary of the index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexStats {
    pub records: usize,
    pub dimension: usize,
}

/// A metadata-filterable nearest-neighbor index over cosine similarity.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Idempotent provisioning: creates the backing index if absent,
    /// otherwise reuses it. Safe under concurrent first use; the check runs
    /// against the backend, not a local guard.
    async fn ensure_ready(&self) -> Result<(), RagError>;

    /// Inserts or overwrites records by id. Empty input is a successful
    /// no-op ([`UpsertOutcome::NoOp`]); any backend error fails the whole
    /// call. Records whose dimension does not match the index are rejected.
    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<UpsertOutcome, RagError>;

    /// Top-`top_k` matches by descending similarity among records whose
    /// metadata `user_id` equals the filter value.
    async fn query(
        &self,
        values: &[f32],
        top_k: usize,
        filter: &UserFilter,
    ) -> Result<Vec<VectorMatch>, RagError>;

    /// Removes the given ids; absent ids are not an error.
    async fn delete(&self, ids: &[String]) -> Result<(), RagError>;

    /// Diagnostics only.
    async fn stats(&self) -> Result<IndexStats, RagError>;
}
