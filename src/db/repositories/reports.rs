use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use crate::db::{
    connection::Database,
    helpers::format_datetime,
    models::AggregateReport,
};

impl Database {
    /// Store a report for its exact period, replacing any earlier computation
    /// of the same range.
    pub async fn upsert_report(&self, report: &AggregateReport) -> Result<()> {
        let report_json =
            serde_json::to_string(report).context("failed to serialize aggregate report")?;
        let period_start = format_datetime(&report.period_start);
        let period_end = format_datetime(&report.period_end);
        let computed_at = format_datetime(&Utc::now());

        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO reports (period_start, period_end, report_json, computed_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(period_start, period_end) DO UPDATE SET
                     report_json = excluded.report_json,
                     computed_at = excluded.computed_at",
                params![period_start, period_end, report_json, computed_at],
            )
            .context("failed to upsert report")?;
            Ok(())
        })
        .await
    }

    pub async fn get_report(
        &self,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> Result<Option<AggregateReport>> {
        let period_start = format_datetime(&period_start);
        let period_end = format_datetime(&period_end);

        self.execute(move |conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT report_json FROM reports WHERE period_start = ?1 AND period_end = ?2",
                    params![period_start, period_end],
                    |row| row.get(0),
                )
                .optional()?;

            raw.map(|json| {
                serde_json::from_str::<AggregateReport>(&json)
                    .context("failed to deserialize cached report")
            })
            .transpose()
        })
        .await
    }

    pub async fn delete_all_reports(&self) -> Result<usize> {
        self.execute(|conn| Ok(conn.execute("DELETE FROM reports", [])?))
            .await
    }
}
