//! SQLite-backed stores: vectors via the `sqlite-vec` extension, documents
//! and chunks in plain tables with cascade deletes.

use std::mem::transmute;
use std::os::raw::c_char;
use std::path::Path;
use std::sync::Once;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_rusqlite::{Connection, OptionalExtension, ffi};
use uuid::Uuid;

use super::{
    ChunkMetadata, IndexStats, UpsertOutcome, UserFilter, VectorMatch, VectorRecord, VectorStore,
};
use crate::config::IndexConfig;
use crate::documents::{ChunkRow, Document, DocumentKind, DocumentStatus, DocumentStore};
use crate::types::RagError;

/// Registers the sqlite-vec extension for every future connection.
///
/// `sqlite3_auto_extension` is process-wide, so registration happens once;
/// the first failure is cached and re-reported to later callers.
fn register_sqlite_vec() -> Result<(), RagError> {
    use std::sync::Mutex;

    static INIT: Once = Once::new();
    static INIT_RESULT: Mutex<Option<Result<(), String>>> = Mutex::new(None);

    INIT.call_once(|| {
        let result = unsafe {
            type SqliteExtensionInit = unsafe extern "C" fn(
                *mut ffi::sqlite3,
                *mut *mut c_char,
                *const ffi::sqlite3_api_routines,
            ) -> i32;

            let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
            let init_fn: SqliteExtensionInit =
                transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
            let rc = ffi::sqlite3_auto_extension(Some(init_fn));
            if rc != 0 {
                Err(format!(
                    "failed to register sqlite-vec extension (code {rc})"
                ))
            } else {
                Ok(())
            }
        };
        *INIT_RESULT.lock().expect("init result mutex poisoned") = Some(result);
    });

    INIT_RESULT
        .lock()
        .expect("init result mutex poisoned")
        .clone()
        .expect("init was called but result not set")
        .map_err(RagError::Store)
}

fn store_err(err: impl std::fmt::Display) -> RagError {
    RagError::Store(err.to_string())
}

/// [`VectorStore`] over a sqlite-vec table.
///
/// Embeddings are persisted as `vec_f32` blobs and ranked with
/// `vec_distance_cosine`; similarity is reported as `1 - distance`. The
/// `user_id` filter is a dedicated indexed column.
#[derive(Clone)]
pub struct SqliteVectorStore {
    conn: Connection,
    index: IndexConfig,
}

impl SqliteVectorStore {
    /// Opens (or creates) the database file and validates the extension.
    pub async fn open(path: impl AsRef<Path>, index: IndexConfig) -> Result<Self, RagError> {
        index.validate()?;
        register_sqlite_vec()?;
        let conn = Connection::open(path).await.map_err(store_err)?;
        conn.call(|conn| {
            conn.query_row("select vec_version()", [], |row| row.get::<_, String>(0))
                .map_err(tokio_rusqlite::Error::Rusqlite)
        })
        .await
        .map_err(store_err)?;
        Ok(Self { conn, index })
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn ensure_ready(&self) -> Result<(), RagError> {
        let table = self.index.table.clone();
        self.conn
            .call(move |conn| {
                conn.execute_batch(&format!(
                    "CREATE TABLE IF NOT EXISTS {table} (
                         id TEXT PRIMARY KEY,
                         user_id TEXT NOT NULL,
                         metadata TEXT NOT NULL,
                         embedding BLOB NOT NULL
                     );
                     CREATE INDEX IF NOT EXISTS {table}_user_idx ON {table}(user_id);"
                ))
                .map_err(tokio_rusqlite::Error::Rusqlite)
            })
            .await
            .map_err(store_err)
    }

    async fn upsert(&self, records: Vec<VectorRecord>) -> Result<UpsertOutcome, RagError> {
        if records.is_empty() {
            return Ok(UpsertOutcome::NoOp);
        }
        for record in &records {
            if record.values.len() != self.index.dimension {
                return Err(RagError::Store(format!(
                    "record '{}' has dimension {} but the index expects {}",
                    record.id,
                    record.values.len(),
                    self.index.dimension
                )));
            }
        }

        let table = self.index.table.clone();
        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let metadata = serde_json::to_string(&record.metadata).map_err(store_err)?;
            let embedding = serde_json::to_string(&record.values).map_err(store_err)?;
            rows.push((record.id, record.metadata.user_id, metadata, embedding));
        }
        let stored = rows.len();

        self.conn
            .call(move |conn| {
                let tx = conn
                    .transaction()
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                {
                    let mut stmt = tx
                        .prepare(&format!(
                            "INSERT OR REPLACE INTO {table} (id, user_id, metadata, embedding)
                             VALUES (?1, ?2, ?3, vec_f32(?4))"
                        ))
                        .map_err(tokio_rusqlite::Error::Rusqlite)?;
                    for (id, user_id, metadata, embedding) in &rows {
                        stmt.execute((id, user_id, metadata, embedding))
                            .map_err(tokio_rusqlite::Error::Rusqlite)?;
                    }
                }
                tx.commit().map_err(tokio_rusqlite::Error::Rusqlite)
            })
            .await
            .map_err(store_err)?;
        Ok(UpsertOutcome::Stored(stored))
    }

    async fn query(
        &self,
        values: &[f32],
        top_k: usize,
        filter: &UserFilter,
    ) -> Result<Vec<VectorMatch>, RagError> {
        if values.len() != self.index.dimension {
            return Err(RagError::Store(format!(
                "query vector has dimension {} but the index expects {}",
                values.len(),
                self.index.dimension
            )));
        }
        let table = self.index.table.clone();
        let embedding = serde_json::to_string(values).map_err(store_err)?;
        let user_id = filter.user_id.clone();

        self.conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT id, metadata,
                                vec_distance_cosine(embedding, vec_f32(?1)) AS distance
                         FROM {table}
                         WHERE user_id = ?2
                         ORDER BY distance ASC
                         LIMIT {top_k}"
                    ))
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let rows = stmt
                    .query_map((embedding, user_id), |row| {
                        let id: String = row.get(0)?;
                        let metadata: String = row.get(1)?;
                        let distance: f32 = row.get(2)?;
                        Ok((id, metadata, distance))
                    })
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;

                let mut matches = Vec::new();
                for row in rows {
                    let (id, metadata, distance) =
                        row.map_err(tokio_rusqlite::Error::Rusqlite)?;
                    let metadata: ChunkMetadata =
                        serde_json::from_str(&metadata).unwrap_or_default();
                    matches.push(VectorMatch {
                        id,
                        score: 1.0 - distance,
                        metadata,
                    });
                }
                Ok(matches)
            })
            .await
            .map_err(store_err)
    }

    async fn delete(&self, ids: &[String]) -> Result<(), RagError> {
        if ids.is_empty() {
            return Ok(());
        }
        let table = self.index.table.clone();
        let ids = ids.to_vec();
        self.conn
            .call(move |conn| {
                let tx = conn
                    .transaction()
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                {
                    let mut stmt = tx
                        .prepare(&format!("DELETE FROM {table} WHERE id = ?1"))
                        .map_err(tokio_rusqlite::Error::Rusqlite)?;
                    for id in &ids {
                        stmt.execute((id,))
                            .map_err(tokio_rusqlite::Error::Rusqlite)?;
                    }
                }
                tx.commit().map_err(tokio_rusqlite::Error::Rusqlite)
            })
            .await
            .map_err(store_err)
    }

    async fn stats(&self) -> Result<IndexStats, RagError> {
        let table = self.index.table.clone();
        let records = self
            .conn
            .call(move |conn| {
                conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                    row.get::<_, i64>(0)
                })
                .map_err(tokio_rusqlite::Error::Rusqlite)
            })
            .await
            .map_err(store_err)?;
        Ok(IndexStats {
            records: records as usize,
            dimension: self.index.dimension,
        })
    }
}

type DocumentRowRaw = (
    String, // id
    String, // user_id
    String, // document_name
    String, // document_type
    String, // extracted_text
    String, // vector_ids (json)
    String, // status
    String, // created_at (rfc3339)
);

fn document_from_row(raw: DocumentRowRaw) -> Result<Document, RagError> {
    let (id, user_id, name, kind, extracted_text, vector_ids, status, created_at) = raw;
    Ok(Document {
        id: Uuid::parse_str(&id)
            .map_err(|err| RagError::Store(format!("invalid document id '{id}': {err}")))?,
        user_id,
        name,
        kind: DocumentKind::parse(&kind),
        extracted_text,
        vector_ids: serde_json::from_str(&vector_ids).map_err(store_err)?,
        status: DocumentStatus::parse(&status)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map_err(store_err)?
            .with_timezone(&Utc),
    })
}

const DOCUMENT_COLUMNS: &str = "id, user_id, document_name, document_type, extracted_text, \
                                vector_ids, status, created_at";

/// [`DocumentStore`] over two SQLite tables with `ON DELETE CASCADE` from
/// chunks to their document.
#[derive(Clone)]
pub struct SqliteDocumentStore {
    conn: Connection,
}

impl SqliteDocumentStore {
    /// Opens the database file and provisions the schema idempotently.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, RagError> {
        let conn = Connection::open(path).await.map_err(store_err)?;
        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA foreign_keys = ON;
                 CREATE TABLE IF NOT EXISTS documents (
                     id TEXT PRIMARY KEY,
                     user_id TEXT NOT NULL,
                     document_name TEXT NOT NULL,
                     document_type TEXT NOT NULL,
                     extracted_text TEXT NOT NULL,
                     vector_ids TEXT NOT NULL,
                     status TEXT NOT NULL,
                     created_at TEXT NOT NULL
                 );
                 CREATE INDEX IF NOT EXISTS documents_user_idx ON documents(user_id);
                 CREATE TABLE IF NOT EXISTS document_chunks (
                     vector_id TEXT PRIMARY KEY,
                     document_id TEXT NOT NULL
                         REFERENCES documents(id) ON DELETE CASCADE,
                     chunk_index INTEGER NOT NULL,
                     text_content TEXT NOT NULL,
                     UNIQUE(document_id, chunk_index)
                 );
                 CREATE INDEX IF NOT EXISTS document_chunks_doc_idx
                     ON document_chunks(document_id);",
            )
            .map_err(tokio_rusqlite::Error::Rusqlite)
        })
        .await
        .map_err(store_err)?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn insert(&self, document: &Document) -> Result<(), RagError> {
        let row = (
            document.id.to_string(),
            document.user_id.clone(),
            document.name.clone(),
            document.kind.as_str().to_string(),
            document.extracted_text.clone(),
            serde_json::to_string(&document.vector_ids).map_err(store_err)?,
            document.status.as_str().to_string(),
            document.created_at.to_rfc3339(),
        );
        self.conn
            .call(move |conn| {
                conn.execute(
                    &format!("INSERT INTO documents ({DOCUMENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
                    (row.0, row.1, row.2, row.3, row.4, row.5, row.6, row.7),
                )
                .map_err(tokio_rusqlite::Error::Rusqlite)
            })
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn update_outcome(
        &self,
        id: Uuid,
        status: DocumentStatus,
        vector_ids: &[String],
    ) -> Result<(), RagError> {
        let id = id.to_string();
        let status = status.as_str().to_string();
        let vector_ids = serde_json::to_string(vector_ids).map_err(store_err)?;
        let updated = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE documents SET status = ?2, vector_ids = ?3 WHERE id = ?1",
                    (id, status, vector_ids),
                )
                .map_err(tokio_rusqlite::Error::Rusqlite)
            })
            .await
            .map_err(store_err)?;
        if updated != 1 {
            return Err(RagError::Store(
                "document missing during status update".into(),
            ));
        }
        Ok(())
    }

    async fn get(&self, user_id: &str, id: Uuid) -> Result<Option<Document>, RagError> {
        let id = id.to_string();
        let user_id = user_id.to_string();
        let raw = self
            .conn
            .call(move |conn| {
                conn.query_row(
                    &format!(
                        "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1 AND user_id = ?2"
                    ),
                    (id, user_id),
                    |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                            row.get(6)?,
                            row.get(7)?,
                        ))
                    },
                )
                .optional()
                .map_err(tokio_rusqlite::Error::Rusqlite)
            })
            .await
            .map_err(store_err)?;
        raw.map(document_from_row).transpose()
    }

    async fn list_completed(&self, user_id: &str) -> Result<Vec<Document>, RagError> {
        let user_id = user_id.to_string();
        let raw_rows: Vec<DocumentRowRaw> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(&format!(
                        "SELECT {DOCUMENT_COLUMNS} FROM documents
                         WHERE user_id = ?1 AND status = 'completed'
                         ORDER BY created_at DESC"
                    ))
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let rows = stmt
                    .query_map((user_id,), |row| {
                        Ok((
                            row.get(0)?,
                            row.get(1)?,
                            row.get(2)?,
                            row.get(3)?,
                            row.get(4)?,
                            row.get(5)?,
                            row.get(6)?,
                            row.get(7)?,
                        ))
                    })
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let mut collected = Vec::new();
                for row in rows {
                    collected.push(row.map_err(tokio_rusqlite::Error::Rusqlite)?);
                }
                Ok(collected)
            })
            .await
            .map_err(store_err)?;
        raw_rows.into_iter().map(document_from_row).collect()
    }

    async fn insert_chunks(&self, chunks: &[ChunkRow]) -> Result<(), RagError> {
        if chunks.is_empty() {
            return Ok(());
        }
        let rows: Vec<(String, String, i64, String)> = chunks
            .iter()
            .map(|chunk| {
                (
                    chunk.vector_id.clone(),
                    chunk.document_id.to_string(),
                    chunk.chunk_index as i64,
                    chunk.text_content.clone(),
                )
            })
            .collect();
        self.conn
            .call(move |conn| {
                let tx = conn
                    .transaction()
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                {
                    let mut stmt = tx
                        .prepare(
                            "INSERT OR REPLACE INTO document_chunks
                                 (vector_id, document_id, chunk_index, text_content)
                             VALUES (?1, ?2, ?3, ?4)",
                        )
                        .map_err(tokio_rusqlite::Error::Rusqlite)?;
                    for (vector_id, document_id, chunk_index, text_content) in &rows {
                        stmt.execute((vector_id, document_id, chunk_index, text_content))
                            .map_err(tokio_rusqlite::Error::Rusqlite)?;
                    }
                }
                tx.commit().map_err(tokio_rusqlite::Error::Rusqlite)
            })
            .await
            .map_err(store_err)
    }

    async fn chunks_for(&self, document_id: Uuid) -> Result<Vec<ChunkRow>, RagError> {
        let document_id_raw = document_id.to_string();
        let rows: Vec<(String, i64, String)> = self
            .conn
            .call(move |conn| {
                let mut stmt = conn
                    .prepare(
                        "SELECT vector_id, chunk_index, text_content
                         FROM document_chunks
                         WHERE document_id = ?1
                         ORDER BY chunk_index ASC",
                    )
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let rows = stmt
                    .query_map((document_id_raw,), |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                    })
                    .map_err(tokio_rusqlite::Error::Rusqlite)?;
                let mut collected = Vec::new();
                for row in rows {
                    collected.push(row.map_err(tokio_rusqlite::Error::Rusqlite)?);
                }
                Ok(collected)
            })
            .await
            .map_err(store_err)?;
        Ok(rows
            .into_iter()
            .map(|(vector_id, chunk_index, text_content)| ChunkRow {
                document_id,
                chunk_index: chunk_index as usize,
                text_content,
                vector_id,
            })
            .collect())
    }

    async fn delete_chunks(&self, document_id: Uuid) -> Result<(), RagError> {
        let raw_id = document_id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM document_chunks WHERE document_id = ?1",
                    (raw_id,),
                )
                .map_err(tokio_rusqlite::Error::Rusqlite)
            })
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn delete(&self, user_id: &str, id: Uuid) -> Result<Document, RagError> {
        let document = self
            .get(user_id, id)
            .await?
            .ok_or_else(|| RagError::NotFound {
                user_id: user_id.to_string(),
                document_id: id.to_string(),
            })?;
        let raw_id = id.to_string();
        self.conn
            .call(move |conn| {
                // Cascade removes the chunk rows.
                conn.execute("DELETE FROM documents WHERE id = ?1", (raw_id,))
                    .map_err(tokio_rusqlite::Error::Rusqlite)
            })
            .await
            .map_err(store_err)?;
        Ok(document)
    }
}
