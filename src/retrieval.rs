//! Query-time retrieval: embed the question, search the user's vectors,
//! assemble a grounding context string for the answering model.

use std::sync::Arc;

use tracing::{debug, error};

use crate::embeddings::EmbeddingProvider;
use crate::stores::{UserFilter, VectorStore};
use crate::types::RagError;

/// Match count used when the caller has no better number.
pub const DEFAULT_TOP_K: usize = 5;

/// One retrieved chunk, carrying everything the prompt assembler needs.
#[derive(Clone, Debug, PartialEq)]
pub struct RetrievedChunk {
    pub document_name: String,
    pub document_type: String,
    pub text_content: String,
    /// Cosine similarity, larger is closer.
    pub score: f32,
    pub chunk_index: usize,
}

/// Embeds queries and searches the vector index on behalf of one request.
pub struct Retriever {
    provider: Arc<dyn EmbeddingProvider>,
    vectors: Arc<dyn VectorStore>,
}

impl Retriever {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, vectors: Arc<dyn VectorStore>) -> Self {
        Self { provider, vectors }
    }

    /// Top-`top_k` chunks for `query_text` among the caller's documents,
    /// ordered by descending similarity.
    pub async fn retrieve(
        &self,
        user_id: &str,
        query_text: &str,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>, RagError> {
        let mut embeddings = self
            .provider
            .embed_batch(&[query_text.to_string()])
            .await?;
        if embeddings.len() != 1 {
            return Err(RagError::embedding_permanent(format!(
                "expected one query embedding, provider returned {}",
                embeddings.len()
            )));
        }
        let values = embeddings.remove(0);

        let matches = self
            .vectors
            .query(&values, top_k, &UserFilter::new(user_id))
            .await?;
        debug!(user_id, matches = matches.len(), top_k, "retrieval query");

        Ok(matches
            .into_iter()
            .map(|m| RetrievedChunk {
                document_name: m.metadata.document_name,
                document_type: m.metadata.document_type,
                text_content: m.metadata.text_content,
                score: m.score,
                chunk_index: m.metadata.chunk_index,
            })
            .collect())
    }

    /// Degraded variant for answer paths that must not fail outright: any
    /// retrieval error is logged and mapped to an empty result, letting the
    /// caller answer without grounding context.
    pub async fn retrieve_lenient(
        &self,
        user_id: &str,
        query_text: &str,
        top_k: usize,
    ) -> Vec<RetrievedChunk> {
        match self.retrieve(user_id, query_text, top_k).await {
            Ok(chunks) => chunks,
            Err(err) => {
                error!(user_id, error = %err, "retrieval failed, continuing without context");
                Vec::new()
            }
        }
    }
}

/// Renders retrieved chunks into the block handed to the answering model.
///
/// Entries are numbered from 1 in the order given and joined with a blank
/// line; empty input yields an empty string.
pub fn grounding_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            format!(
                "Document {}: {} (Relevance: {:.2})\n{}\n",
                i + 1,
                chunk.document_name,
                chunk.score,
                chunk.text_content
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::MockEmbeddingProvider;
    use crate::stores::{ChunkMetadata, MemoryVectorStore, VectorRecord};

    fn chunk(name: &str, score: f32, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            document_name: name.into(),
            document_type: "other".into(),
            text_content: text.into(),
            score,
            chunk_index: 0,
        }
    }

    #[test]
    fn context_numbers_from_one_and_formats_scores() {
        let rendered = grounding_context(&[
            chunk("labs.pdf", 0.91234, "Hemoglobin 13.5"),
            chunk("rx.pdf", 0.5, "Take twice daily"),
        ]);
        assert_eq!(
            rendered,
            "Document 1: labs.pdf (Relevance: 0.91)\nHemoglobin 13.5\n\n\
             Document 2: rx.pdf (Relevance: 0.50)\nTake twice daily\n"
        );
    }

    #[test]
    fn empty_context_is_empty() {
        assert_eq!(grounding_context(&[]), "");
    }

    #[tokio::test]
    async fn lenient_retrieval_degrades_to_empty() {
        // Store dimension disagrees with the provider, so every query fails.
        let provider = Arc::new(MockEmbeddingProvider::new(8));
        let vectors = Arc::new(MemoryVectorStore::new(4));
        let retriever = Retriever::new(provider, vectors);

        assert!(retriever.retrieve("u1", "anything", 3).await.is_err());
        assert!(retriever.retrieve_lenient("u1", "anything", 3).await.is_empty());
    }

    #[tokio::test]
    async fn retrieve_maps_metadata_and_respects_the_filter() {
        let provider = Arc::new(MockEmbeddingProvider::new(8));
        let vectors = Arc::new(MemoryVectorStore::new(8));

        let mine = provider.embed_batch(&["my note".to_string()]).await.unwrap();
        vectors
            .upsert(vec![
                VectorRecord {
                    id: "v-mine".into(),
                    values: mine[0].clone(),
                    metadata: ChunkMetadata {
                        user_id: "u1".into(),
                        document_name: "mine.txt".into(),
                        document_type: "other".into(),
                        chunk_index: 3,
                        text_content: "my note".into(),
                        ..Default::default()
                    },
                },
                VectorRecord {
                    id: "v-theirs".into(),
                    values: mine[0].clone(),
                    metadata: ChunkMetadata {
                        user_id: "u2".into(),
                        text_content: "someone else's note".into(),
                        ..Default::default()
                    },
                },
            ])
            .await
            .unwrap();

        let retriever = Retriever::new(provider, vectors);
        let chunks = retriever.retrieve("u1", "my note", 5).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].document_name, "mine.txt");
        assert_eq!(chunks[0].chunk_index, 3);
        assert!(chunks[0].score > 0.99);
    }
}
