use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{conversion_error, format_datetime, parse_datetime, to_u32, to_u64},
    models::Snapshot,
};

const SNAPSHOT_COLUMNS: &str = "id, captured_at, display_id, image_path, extracted_text, \
     app_name, window_title, category, ai_note, redacted_regions";

fn row_to_snapshot(row: &Row) -> Result<Snapshot, rusqlite::Error> {
    let captured_at: String = row.get("captured_at")?;
    let display_id: i64 = row.get("display_id")?;
    let redacted_regions: i64 = row.get("redacted_regions")?;

    Ok(Snapshot {
        id: row.get("id")?,
        captured_at: parse_datetime(&captured_at, "captured_at").map_err(conversion_error)?,
        display_id: to_u32(display_id, "display_id").map_err(conversion_error)?,
        image_path: row.get("image_path")?,
        extracted_text: row.get("extracted_text")?,
        app_name: row.get("app_name")?,
        window_title: row.get("window_title")?,
        category: row.get("category")?,
        ai_note: row.get("ai_note")?,
        redacted_regions: to_u32(redacted_regions, "redacted_regions")
            .map_err(conversion_error)?,
    })
}

/// A snapshot row removed or trimmed by a bulk operation.
#[derive(Debug, Clone)]
pub struct RemovedSnapshot {
    pub id: String,
    pub image_path: Option<String>,
}

impl Database {
    pub async fn insert_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        let record = snapshot.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO snapshots (
                    id,
                    captured_at,
                    display_id,
                    image_path,
                    extracted_text,
                    app_name,
                    window_title,
                    category,
                    ai_note,
                    redacted_regions
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    record.id,
                    format_datetime(&record.captured_at),
                    i64::from(record.display_id),
                    record.image_path,
                    record.extracted_text,
                    record.app_name,
                    record.window_title,
                    record.category,
                    record.ai_note,
                    i64::from(record.redacted_regions),
                ],
            )
            .with_context(|| format!("failed to insert snapshot {}", record.id))?;
            Ok(())
        })
        .await
    }

    pub async fn get_snapshot(&self, id: &str) -> Result<Option<Snapshot>> {
        let id = id.to_string();
        self.execute(move |conn| {
            let sql = format!("SELECT {SNAPSHOT_COLUMNS} FROM snapshots WHERE id = ?1");
            conn.query_row(&sql, params![id], row_to_snapshot)
                .optional()
                .map_err(Into::into)
        })
        .await
    }

    /// Snapshots captured in `[start, end)`, oldest first.
    pub async fn get_snapshots_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Snapshot>> {
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {SNAPSHOT_COLUMNS}
                 FROM snapshots
                 WHERE captured_at >= ?1 AND captured_at < ?2
                 ORDER BY captured_at ASC, rowid ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let snapshots = stmt
                .query_map(
                    params![format_datetime(&start), format_datetime(&end)],
                    row_to_snapshot,
                )?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(snapshots)
        })
        .await
    }

    /// Most recent snapshots that carry extracted text, newest first.
    pub async fn get_recent_snapshots_with_text(&self, limit: usize) -> Result<Vec<Snapshot>> {
        self.execute(move |conn| {
            let sql = format!(
                "SELECT {SNAPSHOT_COLUMNS}
                 FROM snapshots
                 WHERE TRIM(extracted_text) <> ''
                 ORDER BY captured_at DESC
                 LIMIT ?1"
            );
            let mut stmt = conn.prepare(&sql)?;
            let snapshots = stmt
                .query_map(params![limit as i64], row_to_snapshot)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(snapshots)
        })
        .await
    }

    pub async fn count_snapshots(&self) -> Result<u64> {
        self.execute(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM snapshots", [], |row| row.get(0))?;
            to_u64(count, "snapshot count")
        })
        .await
    }

    /// Bulk purge. Returns what was removed so callers can drop image files
    /// and embedding records.
    pub async fn delete_all_snapshots(&self) -> Result<Vec<RemovedSnapshot>> {
        self.execute(|conn| {
            let tx = conn.transaction()?;
            let removed = {
                let mut stmt = tx.prepare("SELECT id, image_path FROM snapshots")?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok(RemovedSnapshot {
                            id: row.get(0)?,
                            image_path: row.get(1)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            };
            tx.execute("DELETE FROM snapshots", [])?;
            tx.commit()?;
            Ok(removed)
        })
        .await
    }

    /// Clear `image_path` on snapshots captured before `cutoff`, returning the
    /// paths that were cleared.
    pub async fn clear_image_paths_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<RemovedSnapshot>> {
        self.execute(move |conn| {
            let cutoff = format_datetime(&cutoff);
            let tx = conn.transaction()?;
            let cleared = {
                let mut stmt = tx.prepare(
                    "SELECT id, image_path FROM snapshots
                     WHERE captured_at < ?1 AND image_path IS NOT NULL",
                )?;
                let rows = stmt
                    .query_map(params![cutoff], |row| {
                        Ok(RemovedSnapshot {
                            id: row.get(0)?,
                            image_path: row.get(1)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            };
            tx.execute(
                "UPDATE snapshots SET image_path = NULL
                 WHERE captured_at < ?1 AND image_path IS NOT NULL",
                params![cutoff],
            )?;
            tx.commit()?;
            Ok(cleared)
        })
        .await
    }

    pub async fn delete_snapshots_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<RemovedSnapshot>> {
        self.execute(move |conn| {
            let cutoff = format_datetime(&cutoff);
            let tx = conn.transaction()?;
            let removed = {
                let mut stmt =
                    tx.prepare("SELECT id, image_path FROM snapshots WHERE captured_at < ?1")?;
                let rows = stmt
                    .query_map(params![cutoff], |row| {
                        Ok(RemovedSnapshot {
                            id: row.get(0)?,
                            image_path: row.get(1)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            };
            tx.execute("DELETE FROM snapshots WHERE captured_at < ?1", params![cutoff])?;
            tx.commit()?;
            Ok(removed)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn snapshot(id: &str) -> Snapshot {
        Snapshot {
            id: id.into(),
            captured_at: Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap(),
            display_id: 2,
            image_path: None,
            extracted_text: "notes".into(),
            app_name: "Notes".into(),
            window_title: String::new(),
            category: None,
            ai_note: None,
            redacted_regions: 1,
        }
    }

    #[tokio::test]
    async fn oversized_display_id_is_rejected_on_read() {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("glimpse.db")).unwrap();
        db.insert_snapshot(&snapshot("a")).await.unwrap();
        assert_eq!(db.get_snapshot("a").await.unwrap().unwrap().display_id, 2);

        db.execute(|conn| {
            conn.execute(
                "UPDATE snapshots SET display_id = ?1 WHERE id = 'a'",
                params![i64::from(u32::MAX) + 2],
            )?;
            Ok(())
        })
        .await
        .unwrap();

        assert!(db.get_snapshot("a").await.is_err());
    }
}
