use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use crate::db::Database;
use crate::sentiment::ScoreStore;

impl Database {
    pub async fn get_score(&self, comment: &str) -> Result<Option<f64>> {
        let comment = comment.to_string();
        self.execute(move |conn| {
            conn.query_row(
                "SELECT sentiment FROM comments WHERE comment = ?1",
                params![comment],
                |row| row.get(0),
            )
            .optional()
            .context("failed to look up comment score")
        })
        .await
    }

    /// Inserts or replaces the score for `comment`.
    pub async fn put_score(&self, comment: &str, sentiment: f64) -> Result<()> {
        let comment = comment.to_string();
        self.execute(move |conn| {
            let now = Utc::now().to_rfc3339();
            conn.execute(
                "INSERT INTO comments (comment, sentiment, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)
                 ON CONFLICT(comment) DO UPDATE SET
                    sentiment = excluded.sentiment,
                    updated_at = excluded.updated_at",
                params![comment, sentiment, now],
            )
            .context("failed to store comment score")?;
            Ok(())
        })
        .await
    }

    pub async fn score_count(&self) -> Result<u64> {
        self.execute(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM comments", [], |row| row.get(0))
                .context("failed to count stored scores")?;
            Ok(u64::try_from(count).unwrap_or_default())
        })
        .await
    }
}

#[async_trait]
impl ScoreStore for Database {
    async fn get(&self, text: &str) -> Result<Option<f64>> {
        self.get_score(text).await
    }

    async fn put(&self, text: &str, score: f64) -> Result<()> {
        self.put_score(text, score).await
    }
}
