//! Ingestion pipeline: extract → segment → embed → store.
//!
//! The pipeline owns the document lifecycle. Documents are created in
//! `Processing`; they reach `Completed` only after every chunk is embedded,
//! the vectors are upserted in one call, the chunk rows are persisted, and
//! the terminal status is written together with the vector ids. Any failure
//! after the document row exists triggers a compensating delete of the
//! vectors derived for that document before the `Failed` write, so a failed
//! document never leaves orphaned vectors behind.

use std::sync::Arc;

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::SegmenterConfig;
use crate::documents::{ChunkRow, Document, DocumentKind, DocumentStatus, DocumentStore};
use crate::embeddings::EmbeddingProvider;
use crate::extract::{DocumentSource, TextExtractor};
use crate::segmenter::segment;
use crate::stores::{ChunkMetadata, VectorRecord, VectorStore};
use crate::types::RagError;

/// Metadata tag distinguishing pipeline-written vectors from other sources.
const VECTOR_SOURCE: &str = "user_document";

/// Deterministic vector identifier for a chunk.
///
/// This string is the externally observable contract that makes
/// re-ingestion idempotent and lets deletions correlate vectors with their
/// document.
pub fn vector_id(document_id: &Uuid, chunk_index: usize, user_id: &str) -> String {
    format!("doc_{document_id}_chunk_{chunk_index}_user_{user_id}")
}

/// Orchestrates the ingestion state machine over injected collaborators.
pub struct IngestionPipeline {
    extractor: Arc<dyn TextExtractor>,
    provider: Arc<dyn EmbeddingProvider>,
    vectors: Arc<dyn VectorStore>,
    documents: Arc<dyn DocumentStore>,
    segmenter: SegmenterConfig,
}

impl IngestionPipeline {
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        provider: Arc<dyn EmbeddingProvider>,
        vectors: Arc<dyn VectorStore>,
        documents: Arc<dyn DocumentStore>,
        segmenter: SegmenterConfig,
    ) -> Result<Self, RagError> {
        segmenter.validate()?;
        Ok(Self {
            extractor,
            provider,
            vectors,
            documents,
            segmenter,
        })
    }

    /// Runs the full pipeline for one document.
    ///
    /// `user_id` is a verified identity supplied by the caller; it is
    /// trusted as-is and scopes every stored vector and row.
    pub async fn ingest(
        &self,
        user_id: &str,
        source: &DocumentSource,
        document_name: &str,
        kind: DocumentKind,
    ) -> Result<Document, RagError> {
        let text = self.extractor.extract(source).await?;
        let chunks = segment(&text, &self.segmenter)?;
        info!(
            user_id,
            document_name,
            chunk_count = chunks.len(),
            provider = self.provider.name(),
            "ingesting document"
        );

        let mut document = Document::new(user_id, document_name, kind, text);

        // No chunks is a valid outcome: the document completes with an
        // empty vector id list and nothing reaches the index.
        if chunks.is_empty() {
            document.status = DocumentStatus::Completed;
            self.documents.insert(&document).await?;
            return Ok(document);
        }

        self.vectors.ensure_ready().await?;
        self.documents.insert(&document).await?;

        match self.embed_and_store(&document, &chunks).await {
            Ok(ids) => {
                document.vector_ids = ids;
                document.status = DocumentStatus::Completed;
                info!(document_id = %document.id, chunks = chunks.len(), "document ingested");
                Ok(document)
            }
            Err(err) => {
                self.compensate(&document, chunks.len()).await;
                document.status = DocumentStatus::Failed;
                Err(err)
            }
        }
    }

    /// Stage-and-commit tail of the pipeline: embed everything, then one
    /// upsert, then chunk rows, then the single terminal status write.
    async fn embed_and_store(
        &self,
        document: &Document,
        chunks: &[String],
    ) -> Result<Vec<String>, RagError> {
        let embeddings = self.provider.embed_batch(chunks).await?;
        if embeddings.len() != chunks.len() {
            return Err(RagError::embedding_permanent(format!(
                "provider returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let mut records = Vec::with_capacity(chunks.len());
        let mut rows = Vec::with_capacity(chunks.len());
        let mut ids = Vec::with_capacity(chunks.len());
        for (chunk_index, (chunk, values)) in chunks.iter().zip(embeddings).enumerate() {
            let id = vector_id(&document.id, chunk_index, &document.user_id);
            records.push(VectorRecord {
                id: id.clone(),
                values,
                metadata: ChunkMetadata {
                    user_id: document.user_id.clone(),
                    document_id: document.id.to_string(),
                    document_name: document.name.clone(),
                    document_type: document.kind.as_str().to_string(),
                    chunk_index,
                    text_content: chunk.clone(),
                    source: VECTOR_SOURCE.to_string(),
                },
            });
            rows.push(ChunkRow {
                document_id: document.id,
                chunk_index,
                text_content: chunk.clone(),
                vector_id: id.clone(),
            });
            ids.push(id);
        }

        self.vectors.upsert(records).await?;
        self.documents.insert_chunks(&rows).await?;
        self.documents
            .update_outcome(document.id, DocumentStatus::Completed, &ids)
            .await?;
        Ok(ids)
    }

    /// Removes any vectors and chunk rows already written for a failing
    /// document and records the terminal `Failed` state. Cleanup failures
    /// are logged, not propagated; the original ingestion error is what the
    /// caller sees.
    async fn compensate(&self, document: &Document, chunk_count: usize) {
        let ids: Vec<String> = (0..chunk_count)
            .map(|chunk_index| vector_id(&document.id, chunk_index, &document.user_id))
            .collect();
        if let Err(err) = self.vectors.delete(&ids).await {
            warn!(
                document_id = %document.id,
                error = %err,
                "failed to remove vectors while compensating a failed ingest"
            );
        }
        if let Err(err) = self.documents.delete_chunks(document.id).await {
            warn!(
                document_id = %document.id,
                error = %err,
                "failed to remove chunk rows while compensating a failed ingest"
            );
        }
        if let Err(err) = self
            .documents
            .update_outcome(document.id, DocumentStatus::Failed, &[])
            .await
        {
            error!(
                document_id = %document.id,
                error = %err,
                "failed to mark document as failed"
            );
        }
    }

    /// Completed documents for a user, newest first.
    pub async fn list_documents(&self, user_id: &str) -> Result<Vec<Document>, RagError> {
        self.documents.list_completed(user_id).await
    }

    /// Deletes a user's document along with its chunks and vectors.
    ///
    /// Vectors go first so a failure leaves the document row in place for a
    /// retry; fails with [`RagError::NotFound`] when the document does not
    /// belong to this user.
    pub async fn delete_document(
        &self,
        user_id: &str,
        document_id: Uuid,
    ) -> Result<(), RagError> {
        let document = self
            .documents
            .get(user_id, document_id)
            .await?
            .ok_or_else(|| RagError::NotFound {
                user_id: user_id.to_string(),
                document_id: document_id.to_string(),
            })?;
        if !document.vector_ids.is_empty() {
            self.vectors.delete(&document.vector_ids).await?;
        }
        self.documents.delete(user_id, document_id).await?;
        info!(user_id, document_id = %document_id, "document deleted");
        Ok(())
    }
}
