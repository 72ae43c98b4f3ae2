//! Upload history backed by SQLite.

use crate::models::record::UploadRecord;
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");
const MAX_LISTED: usize = 100;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type HistoryResult<T> = Result<T, HistoryError>;

#[derive(Clone)]
pub struct UploadHistory {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

impl UploadHistory {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Apply the embedded schema. Every statement is idempotent.
    pub async fn migrate(&self) -> HistoryResult<usize> {
        let statements = SCHEMA
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        for stmt in &statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(statements.len())
    }

    pub async fn record(&self, record: &UploadRecord) -> HistoryResult<()> {
        sqlx::query(
            "INSERT INTO uploads (
                id, video_id, video_url, title, topic, language, privacy,
                status, error, video_md5, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id)
        .bind(&record.video_id)
        .bind(&record.video_url)
        .bind(&record.title)
        .bind(&record.topic)
        .bind(&record.language)
        .bind(&record.privacy)
        .bind(&record.status)
        .bind(&record.error)
        .bind(&record.video_md5)
        .bind(record.created_at)
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    /// Most recent uploads first. `limit` is clamped to 1..=100.
    pub async fn recent(&self, limit: usize) -> HistoryResult<Vec<UploadRecord>> {
        let limit = limit.clamp(1, MAX_LISTED) as i64;
        let rows = sqlx::query_as::<_, UploadRecord>(
            "SELECT id, video_id, video_url, title, topic, language, privacy,
                    status, error, video_md5, created_at
             FROM uploads
             ORDER BY created_at DESC
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&*self.db)
        .await?;
        Ok(rows)
    }

    /// Liveness check used by the readiness probe.
    pub async fn ping(&self) -> HistoryResult<i64> {
        Ok(sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use sqlx::sqlite::SqlitePoolOptions;
    use uuid::Uuid;

    /// In-memory database with the schema applied. One connection, since
    /// every `:memory:` connection is its own database.
    pub(crate) async fn memory_history() -> UploadHistory {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let history = UploadHistory::new(Arc::new(pool));
        history.migrate().await.unwrap();
        history
    }

    fn record(title: &str, minutes_ago: i64, status: &str) -> UploadRecord {
        UploadRecord {
            id: Uuid::new_v4(),
            video_id: (status == "uploaded").then(|| "vid".to_string()),
            video_url: None,
            title: title.into(),
            topic: "topic".into(),
            language: "en".into(),
            privacy: "public".into(),
            status: status.into(),
            error: (status == "failed").then(|| "quota exceeded".to_string()),
            video_md5: "d41d8cd98f00b204e9800998ecf8427e".into(),
            created_at: Utc::now() - Duration::minutes(minutes_ago),
        }
    }

    #[tokio::test]
    async fn migrate_is_idempotent() {
        let history = memory_history().await;
        assert_eq!(history.migrate().await.unwrap(), 2);
        assert_eq!(history.ping().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn recent_lists_newest_first_and_clamps_limit() {
        let history = memory_history().await;
        history.record(&record("old", 30, "uploaded")).await.unwrap();
        history.record(&record("new", 1, "failed")).await.unwrap();
        history.record(&record("mid", 10, "uploaded")).await.unwrap();

        let rows = history.recent(10).await.unwrap();
        let titles: Vec<_> = rows.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["new", "mid", "old"]);
        assert_eq!(rows[0].error.as_deref(), Some("quota exceeded"));

        assert_eq!(history.recent(0).await.unwrap().len(), 1);
    }
}
