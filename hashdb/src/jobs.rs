use chrono::Utc;
use sqlx::Row;

use crate::error::{Error, Result};
use crate::store::HashDb;
use crate::types::JobSummary;

impl HashDb {
    /// Persists a job's terminal state, so `job_status` survives a restart
    /// (SPEC_FULL.md C.1).
    pub async fn record_job_summary(&self, summary: &JobSummary) -> Result<()> {
        sqlx::query(
            "INSERT INTO job_summaries
                 (id, filename, size, state, bytes_downloaded, completed_chunks,
                  total_chunks, error_kind, error_message, finished_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET
                 state = ?4, bytes_downloaded = ?5, completed_chunks = ?6,
                 total_chunks = ?7, error_kind = ?8, error_message = ?9, finished_at = ?10",
        )
        .bind(&summary.id)
        .bind(&summary.filename)
        .bind(summary.size as i64)
        .bind(&summary.state)
        .bind(summary.bytes_downloaded as i64)
        .bind(summary.completed_chunks)
        .bind(summary.total_chunks)
        .bind(&summary.error_kind)
        .bind(&summary.error_message)
        .bind(summary.finished_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_job_summary(&self, id: &str) -> Result<JobSummary> {
        let row = sqlx::query(
            "SELECT id, filename, size, state, bytes_downloaded, completed_chunks,
                 total_chunks, error_kind, error_message, finished_at
             FROM job_summaries WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::InventoryNotFound(id.to_string()))?;
        row_to_summary(row)
    }

    pub async fn list_recent_jobs(&self, limit: u32) -> Result<Vec<JobSummary>> {
        let rows = sqlx::query(
            "SELECT id, filename, size, state, bytes_downloaded, completed_chunks,
                 total_chunks, error_kind, error_message, finished_at
             FROM job_summaries ORDER BY finished_at DESC LIMIT ?1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_summary).collect()
    }
}

fn row_to_summary(row: sqlx::sqlite::SqliteRow) -> Result<JobSummary> {
    let finished_at: String = row.try_get("finished_at")?;
    Ok(JobSummary {
        id: row.try_get("id")?,
        filename: row.try_get("filename")?,
        size: row.try_get::<i64, _>("size")? as u64,
        state: row.try_get("state")?,
        bytes_downloaded: row.try_get::<i64, _>("bytes_downloaded")? as u64,
        completed_chunks: row.try_get::<i64, _>("completed_chunks")? as u32,
        total_chunks: row.try_get::<i64, _>("total_chunks")? as u32,
        error_kind: row.try_get("error_kind")?,
        error_message: row.try_get("error_message")?,
        finished_at: chrono::DateTime::parse_from_rfc3339(&finished_at)
            .map_err(|e| Error::CorruptRow(e.to_string()))?
            .with_timezone(&Utc),
    })
}
