use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::params;

use crate::db::{
    connection::Database,
    helpers::{blob_to_f32_vec, f32_vec_to_blob, format_datetime, parse_datetime, to_u64},
};

/// Raw embedding row. The vector is decoded by the caller so a malformed blob
/// only drops that one row from a search.
#[derive(Debug, Clone)]
pub struct EmbeddingRow {
    pub seq: i64,
    pub snapshot_id: String,
    pub text: String,
    pub vector_blob: Vec<u8>,
    pub inserted_at: String,
}

impl EmbeddingRow {
    pub fn decode(self) -> Result<crate::db::EmbeddingRecord> {
        Ok(crate::db::EmbeddingRecord {
            vector: blob_to_f32_vec(&self.vector_blob)?,
            inserted_at: parse_datetime(&self.inserted_at, "inserted_at")?,
            snapshot_id: self.snapshot_id,
            text: self.text,
            seq: self.seq,
        })
    }
}

impl Database {
    /// Idempotent. The embeddings table is owned by the vector store, which may
    /// live in the snapshot database or a file of its own.
    pub async fn ensure_embedding_schema(&self) -> Result<()> {
        self.execute(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS embeddings (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    snapshot_id TEXT NOT NULL UNIQUE,
                    text TEXT NOT NULL,
                    vector BLOB NOT NULL,
                    dimensions INTEGER NOT NULL,
                    inserted_at TEXT NOT NULL
                );",
            )
            .context("failed to create embeddings table")?;
            Ok(())
        })
        .await
    }

    /// Replace-by-id. A replaced record takes a fresh insertion sequence.
    pub async fn upsert_embedding(
        &self,
        snapshot_id: &str,
        text: &str,
        vector: &[f32],
    ) -> Result<()> {
        let snapshot_id = snapshot_id.to_string();
        let text = text.to_string();
        let blob = f32_vec_to_blob(vector);
        let dimensions = vector.len() as i64;
        let inserted_at = format_datetime(&Utc::now());

        self.execute(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM embeddings WHERE snapshot_id = ?1",
                params![snapshot_id],
            )?;
            tx.execute(
                "INSERT INTO embeddings (snapshot_id, text, vector, dimensions, inserted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![snapshot_id, text, blob, dimensions, inserted_at],
            )
            .with_context(|| format!("failed to upsert embedding for {snapshot_id}"))?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// The `limit` most recently inserted rows, oldest first.
    pub async fn recent_embeddings(&self, limit: usize) -> Result<Vec<EmbeddingRow>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT seq, snapshot_id, text, vector, inserted_at
                 FROM (
                     SELECT seq, snapshot_id, text, vector, inserted_at
                     FROM embeddings
                     ORDER BY seq DESC
                     LIMIT ?1
                 )
                 ORDER BY seq ASC",
            )?;
            let rows = stmt
                .query_map(params![limit as i64], |row| {
                    Ok(EmbeddingRow {
                        seq: row.get(0)?,
                        snapshot_id: row.get(1)?,
                        text: row.get(2)?,
                        vector_blob: row.get(3)?,
                        inserted_at: row.get(4)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    pub async fn count_embeddings(&self) -> Result<u64> {
        self.execute(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))?;
            to_u64(count, "embedding count")
        })
        .await
    }

    pub async fn has_embedding(&self, snapshot_id: &str) -> Result<bool> {
        let snapshot_id = snapshot_id.to_string();
        self.execute(move |conn| {
            let exists: i64 = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM embeddings WHERE snapshot_id = ?1)",
                params![snapshot_id],
                |row| row.get(0),
            )?;
            Ok(exists != 0)
        })
        .await
    }

    pub async fn delete_embeddings(&self, snapshot_ids: &[String]) -> Result<usize> {
        let snapshot_ids = snapshot_ids.to_vec();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let mut deleted = 0;
            {
                let mut stmt = tx.prepare("DELETE FROM embeddings WHERE snapshot_id = ?1")?;
                for id in &snapshot_ids {
                    deleted += stmt.execute(params![id])?;
                }
            }
            tx.commit()?;
            Ok(deleted)
        })
        .await
    }

    pub async fn delete_all_embeddings(&self) -> Result<usize> {
        self.execute(|conn| Ok(conn.execute("DELETE FROM embeddings", [])?))
            .await
    }
}
