// Processed topic rows.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::info;

use reviewpulse_common::TopicRecord;

use crate::error::Result;
use crate::reviews::ReviewStore;

/// A row from the processed_topics table.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct StoredTopic {
    pub id: i64,
    pub review_id: String,
    pub topic_name: String,
    pub topic_category: String,
    pub date: NaiveDate,
    pub batch_date: NaiveDate,
    pub is_seed_topic: bool,
    pub is_new_topic: bool,
    pub original_topic: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ReviewStore {
    /// Replace every topic filed under `batch_date` with `topics`, in one
    /// transaction. Returns rows written.
    pub async fn replace_topics(
        &self,
        batch_date: NaiveDate,
        topics: &[TopicRecord],
    ) -> Result<u64> {
        let now = Utc::now();
        let mut tx = self.pool().begin().await?;

        let removed = sqlx::query("DELETE FROM processed_topics WHERE batch_date = ?1")
            .bind(batch_date)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let mut written = 0u64;

        for topic in topics {
            let result = sqlx::query(
                r#"
                INSERT INTO processed_topics
                    (review_id, topic_name, topic_category, date, batch_date,
                     is_seed_topic, is_new_topic, original_topic, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(topic.review_id.as_str())
            .bind(&topic.topic_name)
            .bind(topic.category.as_str())
            .bind(topic.date)
            .bind(topic.batch_date)
            .bind(topic.is_seed_topic)
            .bind(topic.is_new_topic)
            .bind(&topic.original_topic)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }

        tx.commit().await?;
        info!(%batch_date, written, removed, "Stored processed topics");
        Ok(written)
    }

    pub async fn topics_by_batch_date(&self, batch_date: NaiveDate) -> Result<Vec<StoredTopic>> {
        let rows = sqlx::query_as::<_, StoredTopic>(
            "SELECT * FROM processed_topics WHERE batch_date = ?1 ORDER BY id",
        )
        .bind(batch_date)
        .fetch_all(self.pool())
        .await?;

        Ok(rows)
    }

    pub async fn has_topics_for(&self, batch_date: NaiveDate) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM processed_topics WHERE batch_date = ?1)",
        )
        .bind(batch_date)
        .fetch_one(self.pool())
        .await?;

        Ok(exists)
    }
}
