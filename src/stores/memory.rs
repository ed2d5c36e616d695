//! In-memory vector store for tests and single-process deployments.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{IndexStats, UpsertOutcome, UserFilter, VectorMatch, VectorRecord, VectorStore};
use crate::types::RagError;

/// Map-backed [`VectorStore`] with brute-force cosine scoring.
pub struct MemoryVectorStore {
    dimension: usize,
    records: RwLock<HashMap<String, VectorRecord>>,
}

impl MemoryVectorStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            records: RwLock::new(HashMap::new()),
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn ensure_ready(&self) -> Result<(), RagError> {
        Ok(())
    }

    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<UpsertOutcome, RagError> {
        if records.is_empty() {
            return Ok(UpsertOutcome::NoOp);
        }
        for record in &records {
            if record.values.len() != self.dimension {
                return Err(RagError::Store(format!(
                    "record '{}' has dimension {} but the index expects {}",
                    record.id,
                    record.values.len(),
                    self.dimension
                )));
            }
        }
        let stored = records.len();
        let mut guard = self.records.write();
        for record in records {
            guard.insert(record.id.clone(), record);
        }
        Ok(UpsertOutcome::Stored(stored))
    }

    async fn query(
        &self,
        values: &[f32],
        top_k: usize,
        filter: &UserFilter,
    ) -> Result<Vec<VectorMatch>, RagError> {
        if values.len() != self.dimension {
            return Err(RagError::Store(format!(
                "query vector has dimension {} but the index expects {}",
                values.len(),
                self.dimension
            )));
        }
        let guard = self.records.read();
        let mut matches: Vec<VectorMatch> = guard
            .values()
            .filter(|record| record.metadata.user_id == filter.user_id)
            .map(|record| VectorMatch {
                id: record.id.clone(),
                score: cosine_similarity(values, &record.values),
                metadata: record.metadata.clone(),
            })
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn delete(&self, ids: &[String]) -> Result<(), RagError> {
        let mut guard = self.records.write();
        for id in ids {
            guard.remove(id);
        }
        Ok(())
    }

    async fn stats(&self) -> Result<IndexStats, RagError> {
        Ok(IndexStats {
            records: self.records.read().len(),
            dimension: self.dimension,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::ChunkMetadata;

    fn record(id: &str, user_id: &str, values: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: id.into(),
            values,
            metadata: ChunkMetadata {
                user_id: user_id.into(),
                text_content: format!("text for {id}"),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn empty_upsert_is_a_distinguishable_noop() {
        let store = MemoryVectorStore::new(2);
        assert_eq!(store.upsert(Vec::new()).await.unwrap(), UpsertOutcome::NoOp);
        assert_eq!(store.stats().await.unwrap().records, 0);
    }

    #[tokio::test]
    async fn double_upsert_converges_to_single_state() {
        let store = MemoryVectorStore::new(2);
        let records = vec![record("a", "u1", vec![1.0, 0.0])];
        store.upsert(records.clone()).await.unwrap();
        store.upsert(records).await.unwrap();
        assert_eq!(store.stats().await.unwrap().records, 1);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let store = MemoryVectorStore::new(3);
        let err = store
            .upsert(vec![record("a", "u1", vec![1.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Store(_)));
    }

    #[tokio::test]
    async fn query_never_crosses_users() {
        let store = MemoryVectorStore::new(2);
        store
            .upsert(vec![
                record("a", "u1", vec![1.0, 0.0]),
                record("b", "u2", vec![1.0, 0.0]),
                record("c", "u1", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let matches = store
            .query(&[1.0, 0.0], 10, &UserFilter::new("u1"))
            .await
            .unwrap();
        assert_eq!(matches.len(), 2);
        assert!(matches.iter().all(|m| m.metadata.user_id == "u1"));
        // Descending similarity.
        assert_eq!(matches[0].id, "a");
        assert!(matches[0].score >= matches[1].score);
    }

    #[tokio::test]
    async fn deleting_absent_ids_is_not_an_error() {
        let store = MemoryVectorStore::new(2);
        store.upsert(vec![record("a", "u1", vec![1.0, 0.0])]).await.unwrap();
        store
            .delete(&["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(store.stats().await.unwrap().records, 0);
    }

    #[tokio::test]
    async fn top_k_truncates() {
        let store = MemoryVectorStore::new(2);
        store
            .upsert(vec![
                record("a", "u1", vec![1.0, 0.0]),
                record("b", "u1", vec![0.9, 0.1]),
                record("c", "u1", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();
        let matches = store
            .query(&[1.0, 0.0], 2, &UserFilter::new("u1"))
            .await
            .unwrap();
        assert_eq!(matches.len(), 2);
    }
}
