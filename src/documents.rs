//! Document and chunk data model plus the persistence collaborator seam.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::RagError;

/// Category tag attached to every document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    LabResult,
    Prescription,
    Imaging,
    MedicalReport,
    #[default]
    Other,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::LabResult => "lab_result",
            DocumentKind::Prescription => "prescription",
            DocumentKind::Imaging => "imaging",
            DocumentKind::MedicalReport => "medical_report",
            DocumentKind::Other => "other",
        }
    }

    /// Unknown tags map to [`DocumentKind::Other`].
    pub fn parse(value: &str) -> Self {
        match value {
            "lab_result" => DocumentKind::LabResult,
            "prescription" => DocumentKind::Prescription,
            "imaging" => DocumentKind::Imaging,
            "medical_report" => DocumentKind::MedicalReport,
            _ => DocumentKind::Other,
        }
    }

    /// Best-effort category guess from a filename, for callers with no
    /// better signal. First keyword group that matches wins.
    pub fn from_filename(filename: &str) -> Self {
        let name = filename.to_lowercase();
        let matches_any = |keywords: &[&str]| keywords.iter().any(|k| name.contains(k));
        if matches_any(&["blood", "lab", "test", "result"]) {
            DocumentKind::LabResult
        } else if matches_any(&["prescription", "medication", "rx"]) {
            DocumentKind::Prescription
        } else if matches_any(&["xray", "mri", "ct", "imaging", "scan"]) {
            DocumentKind::Imaging
        } else if matches_any(&["report", "medical", "health"]) {
            DocumentKind::MedicalReport
        } else {
            DocumentKind::Other
        }
    }
}

impl std::fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a document inside the ingestion pipeline.
///
/// Documents are created in `Processing`; `Completed` and `Failed` are
/// terminal. Re-ingestion creates a new document instead of retrying in
/// place.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Result<Self, RagError> {
        match value {
            "processing" => Ok(DocumentStatus::Processing),
            "completed" => Ok(DocumentStatus::Completed),
            "failed" => Ok(DocumentStatus::Failed),
            other => Err(RagError::Store(format!("unknown document status '{other}'"))),
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user-owned document with its extracted text and vector references.
///
/// Invariant: `vector_ids` holds the stored vector identifiers in chunk
/// order exactly when `status` is `Completed` (empty for documents whose
/// text produced no chunks).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub kind: DocumentKind,
    pub extracted_text: String,
    pub vector_ids: Vec<String>,
    pub status: DocumentStatus,
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// New document in `Processing` with no stored vectors yet.
    pub fn new(
        user_id: impl Into<String>,
        name: impl Into<String>,
        kind: DocumentKind,
        extracted_text: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            name: name.into(),
            kind,
            extracted_text: extracted_text.into(),
            vector_ids: Vec::new(),
            status: DocumentStatus::Processing,
            created_at: Utc::now(),
        }
    }
}

/// One chunk row; owned by its document and cascade-deleted with it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkRow {
    pub document_id: Uuid,
    /// Zero-based, contiguous, in segmenter order.
    pub chunk_index: usize,
    pub text_content: String,
    /// Globally unique; mirrors the id stored in the vector index.
    pub vector_id: String,
}

/// Durable storage for documents and their chunk rows.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert(&self, document: &Document) -> Result<(), RagError>;

    /// Writes the terminal status and vector ids in a single update so
    /// concurrent readers never observe a half-finished transition.
    async fn update_outcome(
        &self,
        id: Uuid,
        status: DocumentStatus,
        vector_ids: &[String],
    ) -> Result<(), RagError>;

    async fn get(&self, user_id: &str, id: Uuid) -> Result<Option<Document>, RagError>;

    /// Completed documents for a user, newest first.
    async fn list_completed(&self, user_id: &str) -> Result<Vec<Document>, RagError>;

    async fn insert_chunks(&self, chunks: &[ChunkRow]) -> Result<(), RagError>;

    async fn chunks_for(&self, document_id: Uuid) -> Result<Vec<ChunkRow>, RagError>;

    /// Removes every chunk row of a document while keeping the document
    /// itself; a document without chunks is not an error.
    async fn delete_chunks(&self, document_id: Uuid) -> Result<(), RagError>;

    /// Removes the document and its chunks; fails with
    /// [`RagError::NotFound`] when the document does not exist for this
    /// user. Returns the deleted document.
    async fn delete(&self, user_id: &str, id: Uuid) -> Result<Document, RagError>;
}

#[derive(Default)]
struct MemoryDocumentState {
    documents: HashMap<Uuid, Document>,
    chunks: HashMap<Uuid, Vec<ChunkRow>>,
}

/// In-memory document store for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryDocumentStore {
    state: RwLock<MemoryDocumentState>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn insert(&self, document: &Document) -> Result<(), RagError> {
        let mut state = self.state.write();
        state.documents.insert(document.id, document.clone());
        Ok(())
    }

    async fn update_outcome(
        &self,
        id: Uuid,
        status: DocumentStatus,
        vector_ids: &[String],
    ) -> Result<(), RagError> {
        let mut state = self.state.write();
        let document = state
            .documents
            .get_mut(&id)
            .ok_or_else(|| RagError::Store(format!("document {id} missing during update")))?;
        document.status = status;
        document.vector_ids = vector_ids.to_vec();
        Ok(())
    }

    async fn get(&self, user_id: &str, id: Uuid) -> Result<Option<Document>, RagError> {
        let state = self.state.read();
        Ok(state
            .documents
            .get(&id)
            .filter(|document| document.user_id == user_id)
            .cloned())
    }

    async fn list_completed(&self, user_id: &str) -> Result<Vec<Document>, RagError> {
        let state = self.state.read();
        let mut documents: Vec<Document> = state
            .documents
            .values()
            .filter(|document| {
                document.user_id == user_id && document.status == DocumentStatus::Completed
            })
            .cloned()
            .collect();
        documents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(documents)
    }

    async fn insert_chunks(&self, chunks: &[ChunkRow]) -> Result<(), RagError> {
        let mut state = self.state.write();
        for chunk in chunks {
            state
                .chunks
                .entry(chunk.document_id)
                .or_default()
                .push(chunk.clone());
        }
        Ok(())
    }

    async fn chunks_for(&self, document_id: Uuid) -> Result<Vec<ChunkRow>, RagError> {
        let state = self.state.read();
        let mut chunks = state.chunks.get(&document_id).cloned().unwrap_or_default();
        chunks.sort_by_key(|chunk| chunk.chunk_index);
        Ok(chunks)
    }

    async fn delete_chunks(&self, document_id: Uuid) -> Result<(), RagError> {
        self.state.write().chunks.remove(&document_id);
        Ok(())
    }

    async fn delete(&self, user_id: &str, id: Uuid) -> Result<Document, RagError> {
        let mut state = self.state.write();
        let owned = state
            .documents
            .get(&id)
            .is_some_and(|document| document.user_id == user_id);
        if !owned {
            return Err(RagError::NotFound {
                user_id: user_id.to_string(),
                document_id: id.to_string(),
            });
        }
        state.chunks.remove(&id);
        state
            .documents
            .remove(&id)
            .ok_or_else(|| RagError::Store(format!("document {id} vanished during delete")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn outcome_update_is_a_single_write() {
        let store = MemoryDocumentStore::new();
        let document = Document::new("user-1", "labs.pdf", DocumentKind::LabResult, "text");
        store.insert(&document).await.unwrap();

        let ids = vec!["v0".to_string(), "v1".to_string()];
        store
            .update_outcome(document.id, DocumentStatus::Completed, &ids)
            .await
            .unwrap();

        let stored = store.get("user-1", document.id).await.unwrap().unwrap();
        assert_eq!(stored.status, DocumentStatus::Completed);
        assert_eq!(stored.vector_ids, ids);
    }

    #[tokio::test]
    async fn get_is_scoped_to_the_owning_user() {
        let store = MemoryDocumentStore::new();
        let document = Document::new("user-1", "doc", DocumentKind::Other, "text");
        store.insert(&document).await.unwrap();

        assert!(store.get("user-2", document.id).await.unwrap().is_none());
        assert!(store.get("user-1", document.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn list_completed_filters_and_orders() {
        let store = MemoryDocumentStore::new();
        let mut older = Document::new("user-1", "older", DocumentKind::Other, "a");
        older.status = DocumentStatus::Completed;
        older.created_at = Utc::now() - chrono::Duration::minutes(5);
        let mut newer = Document::new("user-1", "newer", DocumentKind::Other, "b");
        newer.status = DocumentStatus::Completed;
        let failed = Document::new("user-1", "failed", DocumentKind::Other, "c");
        store.insert(&older).await.unwrap();
        store.insert(&newer).await.unwrap();
        store.insert(&failed).await.unwrap();

        let listed = store.list_completed("user-1").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].name, "newer");
        assert_eq!(listed[1].name, "older");
    }

    #[tokio::test]
    async fn delete_cascades_chunks_and_checks_ownership() {
        let store = MemoryDocumentStore::new();
        let document = Document::new("user-1", "doc", DocumentKind::Other, "text");
        store.insert(&document).await.unwrap();
        store
            .insert_chunks(&[ChunkRow {
                document_id: document.id,
                chunk_index: 0,
                text_content: "text".into(),
                vector_id: "v0".into(),
            }])
            .await
            .unwrap();

        let err = store.delete("user-2", document.id).await.unwrap_err();
        assert!(matches!(err, RagError::NotFound { .. }));

        store.delete("user-1", document.id).await.unwrap();
        assert!(store.chunks_for(document.id).await.unwrap().is_empty());
        assert!(store.get("user-1", document.id).await.unwrap().is_none());
    }

    #[test]
    fn kind_round_trips_and_defaults_unknown_to_other() {
        assert_eq!(DocumentKind::parse("lab_result"), DocumentKind::LabResult);
        assert_eq!(DocumentKind::parse("mystery"), DocumentKind::Other);
        assert_eq!(
            DocumentKind::parse(DocumentKind::MedicalReport.as_str()),
            DocumentKind::MedicalReport
        );
    }

    #[test]
    fn kind_is_guessed_from_filename_keywords() {
        assert_eq!(
            DocumentKind::from_filename("Blood_Panel_2024.pdf"),
            DocumentKind::LabResult
        );
        assert_eq!(
            DocumentKind::from_filename("rx-refill.pdf"),
            DocumentKind::Prescription
        );
        assert_eq!(
            DocumentKind::from_filename("chest_xray.png"),
            DocumentKind::Imaging
        );
        assert_eq!(
            DocumentKind::from_filename("annual_health_summary.pdf"),
            DocumentKind::MedicalReport
        );
        assert_eq!(DocumentKind::from_filename("notes.txt"), DocumentKind::Other);
        // Earlier keyword groups win on ambiguous names.
        assert_eq!(
            DocumentKind::from_filename("lab_report.pdf"),
            DocumentKind::LabResult
        );
    }
}
