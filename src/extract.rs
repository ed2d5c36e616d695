//! Text extraction collaborator seam.
//!
//! The pipeline consumes already-extracted text through [`TextExtractor`];
//! PDF or OCR extraction lives behind this trait in the embedding
//! application. [`PlainTextExtractor`] covers inline text, UTF-8 byte
//! buffers, and files on disk.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;

use crate::types::RagError;

/// A document handed to the ingestion pipeline.
#[derive(Clone, Debug)]
pub enum DocumentSource {
    /// Text extracted upstream.
    Inline(String),
    /// Raw bytes expected to decode as UTF-8.
    Bytes(Vec<u8>),
    /// Path to a text file.
    File(PathBuf),
}

/// Converts a [`DocumentSource`] into plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Fails with [`RagError::Extraction`] on unreadable or corrupt input.
    async fn extract(&self, source: &DocumentSource) -> Result<String, RagError>;
}

/// Extractor for sources that are already plain text.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainTextExtractor;

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    async fn extract(&self, source: &DocumentSource) -> Result<String, RagError> {
        match source {
            DocumentSource::Inline(text) => Ok(text.clone()),
            DocumentSource::Bytes(data) => String::from_utf8(data.clone())
                .map_err(|_| RagError::Extraction("document bytes are not valid UTF-8".into())),
            DocumentSource::File(path) => fs::read_to_string(path).await.map_err(|err| {
                RagError::Extraction(format!("unable to read {}: {err}", path.display()))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inline_text_passes_through() {
        let text = PlainTextExtractor
            .extract(&DocumentSource::Inline("lab results".into()))
            .await
            .unwrap();
        assert_eq!(text, "lab results");
    }

    #[tokio::test]
    async fn invalid_utf8_is_an_extraction_error() {
        let err = PlainTextExtractor
            .extract(&DocumentSource::Bytes(vec![0xff, 0xfe, 0x00]))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Extraction(_)));
    }

    #[tokio::test]
    async fn missing_file_is_an_extraction_error() {
        let err = PlainTextExtractor
            .extract(&DocumentSource::File("/definitely/not/here.txt".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Extraction(_)));
    }
}
