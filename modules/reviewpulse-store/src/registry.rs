// SQLite-backed canonical topic registry.
//
// Entries are loaded once and searched in memory; registrations are written
// through before they become visible to `nearest`.

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tokio::sync::RwLock;
use tracing::{debug, info};

use reviewpulse_common::{cosine_distance, Neighbor, TopicRegistry};

use crate::error::{Result, StoreError};

struct Entry {
    text: String,
    embedding: Vec<f32>,
}

pub struct SqliteTopicRegistry {
    pool: SqlitePool,
    entries: RwLock<Vec<Entry>>,
}

impl SqliteTopicRegistry {
    /// Load every registered topic, oldest first.
    pub async fn load(pool: SqlitePool) -> Result<Self> {
        let rows: Vec<(String, Vec<u8>)> =
            sqlx::query_as("SELECT topic, embedding FROM canonical_topics ORDER BY rowid")
                .fetch_all(&pool)
                .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for (text, blob) in rows {
            let embedding = decode_embedding(&text, &blob)?;
            entries.push(Entry { text, embedding });
        }

        info!(count = entries.len(), "Loaded canonical topic registry");
        Ok(Self {
            pool,
            entries: RwLock::new(entries),
        })
    }

    pub async fn topics(&self) -> Vec<String> {
        self.entries
            .read()
            .await
            .iter()
            .map(|e| e.text.clone())
            .collect()
    }
}

#[async_trait]
impl TopicRegistry for SqliteTopicRegistry {
    async fn nearest(&self, embedding: &[f32], k: usize) -> AnyResult<Vec<Neighbor>> {
        let entries = self.entries.read().await;
        let mut scored: Vec<Neighbor> = entries
            .iter()
            .map(|e| Neighbor {
                text: e.text.clone(),
                distance: cosine_distance(embedding, &e.embedding),
            })
            .collect();
        // Stable sort: ties go to the earlier registration.
        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        scored.truncate(k);
        Ok(scored)
    }

    async fn register(&self, text: &str, embedding: &[f32]) -> AnyResult<bool> {
        let mut entries = self.entries.write().await;

        let result = sqlx::query(
            "INSERT OR IGNORE INTO canonical_topics (topic, embedding, created_at) VALUES (?1, ?2, ?3)",
        )
        .bind(text)
        .bind(encode_embedding(embedding))
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        entries.push(Entry {
            text: text.to_string(),
            embedding: embedding.to_vec(),
        });
        debug!(topic = text, "Registered canonical topic");
        Ok(true)
    }

    async fn count(&self) -> AnyResult<usize> {
        Ok(self.entries.read().await.len())
    }
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_embedding(topic: &str, blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(StoreError::InvalidEmbedding {
            topic: topic.to_string(),
            len: blob.len(),
        });
    }
    Ok(blob
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}
