//! ```text
//! DocumentSource ──► extract::TextExtractor ──► extracted text
//!                                     │
//! extracted text ──► segmenter::segment ──► chunks
//!                                     │
//! chunks ──► embeddings::EmbeddingProvider ──► vectors
//!                                     │
//! vectors ──► ingestion::IngestionPipeline ──┬─► stores::VectorStore
//!                                            └─► documents::DocumentStore
//!
//! question ──► retrieval::Retriever ──► retrieval::grounding_context
//! ```
//!
pub mod config;
pub mod documents;
pub mod embeddings;
pub mod extract;
pub mod ingestion;
pub mod retrieval;
pub mod segmenter;
pub mod stores;
pub mod types;

pub use config::{EmbeddingConfig, IndexConfig, SegmenterConfig};
pub use documents::{
    ChunkRow, Document, DocumentKind, DocumentStatus, DocumentStore, MemoryDocumentStore,
};
pub use embeddings::{EmbeddingProvider, MockEmbeddingProvider, OpenAiEmbeddingProvider};
pub use extract::{DocumentSource, PlainTextExtractor, TextExtractor};
pub use ingestion::{IngestionPipeline, vector_id};
pub use retrieval::{DEFAULT_TOP_K, RetrievedChunk, Retriever, grounding_context};
pub use stores::{
    ChunkMetadata, MemoryVectorStore, SqliteDocumentStore, SqliteVectorStore, UserFilter,
    VectorMatch, VectorRecord, VectorStore,
};
pub use types::RagError;
