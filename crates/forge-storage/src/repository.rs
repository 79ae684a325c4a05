//! Named vector-store persistence.
//!
//! A store is a snapshot of a retrieval index: every chunk with its
//! embedding, kept in insertion order, plus the label of the embedding
//! backend that produced the vectors. Saving under an existing name
//! replaces the previous snapshot in a single transaction.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::OptionalExtension;
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use forge_core::error::ForgeError;
use forge_core::{DocumentChunk, IndexedChunk, SourceKind};

use crate::db::Database;

/// Suffixes accepted on store names and dropped before use.
const STRIPPED_SUFFIXES: [&str; 2] = [".pkl", ".db"];

/// One row of `list()`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreSummary {
    pub name: String,
    /// Empty for stores saved before the label was recorded.
    pub embedder: String,
    pub dimensions: usize,
    pub chunk_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A loaded store.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedStore {
    pub embedder: String,
    pub chunks: Vec<IndexedChunk>,
}

/// Repository for saved retrieval indexes.
pub struct VectorStoreRepository {
    db: Arc<Database>,
}

impl VectorStoreRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Save `chunks` under `name`, replacing any store with that name.
    ///
    /// Returns the normalized name. All embeddings must share one dimension.
    pub fn save(
        &self,
        name: &str,
        embedder: &str,
        chunks: &[IndexedChunk],
    ) -> Result<String, ForgeError> {
        let name = normalize_store_name(name)?;
        let dimensions = uniform_dimension(chunks)?;
        let now = Utc::now().timestamp();

        self.db.with_conn(|conn| {
            let tx = conn
                .unchecked_transaction()
                .map_err(|e| ForgeError::Storage(format!("Failed to begin transaction: {}", e)))?;

            tx.execute(
                "INSERT INTO vector_stores (name, embedder, dimensions, chunk_count, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)
                 ON CONFLICT(name) DO UPDATE SET
                     embedder = excluded.embedder,
                     dimensions = excluded.dimensions,
                     chunk_count = excluded.chunk_count,
                     updated_at = excluded.updated_at",
                rusqlite::params![name, embedder, dimensions as i64, chunks.len() as i64, now],
            )
            .map_err(|e| ForgeError::Storage(format!("Failed to save store: {}", e)))?;

            tx.execute(
                "DELETE FROM store_chunks WHERE store_name = ?1",
                rusqlite::params![name],
            )
            .map_err(|e| ForgeError::Storage(e.to_string()))?;

            {
                let mut stmt = tx
                    .prepare(
                        "INSERT INTO store_chunks (store_name, position, chunk_id, chunk_index, text,
                                                   start_offset, end_offset, source, kind, embedding)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    )
                    .map_err(|e| ForgeError::Storage(e.to_string()))?;

                for (position, item) in chunks.iter().enumerate() {
                    let chunk = &item.chunk;
                    stmt.execute(rusqlite::params![
                        name,
                        position as i64,
                        chunk.id.to_string(),
                        chunk.index as i64,
                        chunk.text,
                        chunk.start as i64,
                        chunk.end as i64,
                        chunk.source,
                        chunk.kind.as_str(),
                        embedding_to_blob(&item.embedding),
                    ])
                    .map_err(|e| ForgeError::Storage(format!("Failed to save chunk: {}", e)))?;
                }
            }

            tx.commit()
                .map_err(|e| ForgeError::Storage(format!("Failed to commit store: {}", e)))?;
            Ok(())
        })?;

        info!(store = %name, embedder, chunks = chunks.len(), dimensions, "Vector store saved");
        Ok(name)
    }

    /// Load a store's chunks in the order they were saved.
    pub fn load(&self, name: &str) -> Result<Option<SavedStore>, ForgeError> {
        let name = normalize_store_name(name)?;
        self.db.with_conn(|conn| {
            let embedder: Option<String> = conn
                .query_row(
                    "SELECT embedder FROM vector_stores WHERE name = ?1",
                    rusqlite::params![name],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| ForgeError::Storage(e.to_string()))?;
            let Some(embedder) = embedder else {
                return Ok(None);
            };

            let mut stmt = conn
                .prepare(
                    "SELECT chunk_id, chunk_index, text, start_offset, end_offset, source, kind, embedding
                     FROM store_chunks
                     WHERE store_name = ?1
                     ORDER BY position",
                )
                .map_err(|e| ForgeError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(rusqlite::params![name], |row| Ok(row_to_indexed_chunk(row)))
                .map_err(|e| ForgeError::Storage(e.to_string()))?;

            let mut chunks = Vec::new();
            for row in rows {
                let chunk = row.map_err(|e| ForgeError::Storage(e.to_string()))??;
                chunks.push(chunk);
            }
            debug!(store = %name, chunks = chunks.len(), "Vector store loaded");
            Ok(Some(SavedStore { embedder, chunks }))
        })
    }

    /// All stores, most recently updated first.
    pub fn list(&self) -> Result<Vec<StoreSummary>, ForgeError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT name, embedder, dimensions, chunk_count, created_at, updated_at
                     FROM vector_stores
                     ORDER BY updated_at DESC, name ASC",
                )
                .map_err(|e| ForgeError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map([], |row| {
                    let dimensions: i64 = row.get(2)?;
                    let chunk_count: i64 = row.get(3)?;
                    let created: i64 = row.get(4)?;
                    let updated: i64 = row.get(5)?;
                    Ok(StoreSummary {
                        name: row.get(0)?,
                        embedder: row.get(1)?,
                        dimensions: dimensions.max(0) as usize,
                        chunk_count: chunk_count.max(0) as usize,
                        created_at: timestamp_to_datetime(created),
                        updated_at: timestamp_to_datetime(updated),
                    })
                })
                .map_err(|e| ForgeError::Storage(e.to_string()))?;

            rows.collect::<Result<Vec<_>, _>>()
                .map_err(|e| ForgeError::Storage(e.to_string()))
        })
    }

    /// Delete a store and its chunks. Returns whether it existed.
    pub fn delete(&self, name: &str) -> Result<bool, ForgeError> {
        let name = normalize_store_name(name)?;
        let deleted = self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM vector_stores WHERE name = ?1",
                rusqlite::params![name],
            )
            .map_err(|e| ForgeError::Storage(format!("Failed to delete store: {}", e)))
        })?;
        if deleted > 0 {
            info!(store = %name, "Vector store deleted");
        }
        Ok(deleted > 0)
    }
}

/// Trim a store name and drop a trailing `.pkl` or `.db`.
pub fn normalize_store_name(name: &str) -> Result<String, ForgeError> {
    let mut name = name.trim();
    for suffix in STRIPPED_SUFFIXES {
        if let Some(stem) = name.strip_suffix(suffix) {
            name = stem.trim_end();
            break;
        }
    }
    if name.is_empty() {
        return Err(ForgeError::Config("store name must not be empty".into()));
    }
    Ok(name.to_string())
}

fn uniform_dimension(chunks: &[IndexedChunk]) -> Result<usize, ForgeError> {
    let Some(first) = chunks.first() else {
        return Ok(0);
    };
    let expected = first.embedding.len();
    for item in chunks {
        if item.embedding.len() != expected {
            return Err(ForgeError::DimensionMismatch {
                expected,
                actual: item.embedding.len(),
            });
        }
    }
    Ok(expected)
}

fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn blob_to_embedding(blob: &[u8]) -> Result<Vec<f32>, ForgeError> {
    if blob.len() % 4 != 0 {
        return Err(ForgeError::Storage(format!(
            "Embedding blob length {} is not a multiple of 4",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn timestamp_to_datetime(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

fn row_to_indexed_chunk(row: &rusqlite::Row<'_>) -> Result<IndexedChunk, ForgeError> {
    let storage = |e: rusqlite::Error| ForgeError::Storage(e.to_string());

    let id_str: String = row.get(0).map_err(storage)?;
    let index: i64 = row.get(1).map_err(storage)?;
    let text: String = row.get(2).map_err(storage)?;
    let start: i64 = row.get(3).map_err(storage)?;
    let end: i64 = row.get(4).map_err(storage)?;
    let source: String = row.get(5).map_err(storage)?;
    let kind_str: String = row.get(6).map_err(storage)?;
    let blob: Vec<u8> = row.get(7).map_err(storage)?;

    let id = Uuid::parse_str(&id_str)
        .map_err(|e| ForgeError::Storage(format!("Invalid chunk id '{}': {}", id_str, e)))?;
    let kind = SourceKind::parse(&kind_str)
        .ok_or_else(|| ForgeError::Storage(format!("Unknown chunk kind: {}", kind_str)))?;

    Ok(IndexedChunk {
        chunk: DocumentChunk {
            id,
            index: index.max(0) as usize,
            text,
            start: start.max(0) as usize,
            end: end.max(0) as usize,
            source,
            kind,
        },
        embedding: blob_to_embedding(&blob)?,
    })
}
