// SQLite persistence for raw reviews and daily batch metadata.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info};

use reviewpulse_common::{Rating, Review, ReviewId, ReviewPulseError};

use crate::error::Result;

/// Owner of the SQLite pool. One connection: the pipeline is a single writer.
#[derive(Clone)]
pub struct ReviewStore {
    pool: SqlitePool,
}

/// A row from the raw_reviews table.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct StoredReview {
    pub review_id: String,
    pub content: String,
    pub score: i64,
    pub date: NaiveDate,
    pub at: DateTime<Utc>,
    pub app_id: String,
    pub thumbs_up_count: i64,
    pub batch_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl StoredReview {
    /// Rebuild the domain review. Fails only if the stored score is out of range.
    pub fn into_review(self) -> std::result::Result<Review, ReviewPulseError> {
        Ok(Review {
            id: ReviewId::new(self.review_id),
            content: self.content,
            rating: Rating::try_from(self.score)?,
            at: self.at,
            date: self.date,
            thumbs_up_count: self.thumbs_up_count.clamp(0, u32::MAX as i64) as u32,
        })
    }
}

/// A row from the batch_processing table.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct BatchRecord {
    pub batch_date: NaiveDate,
    /// Rows filed under this batch date after the latest write.
    pub review_count: i64,
    /// Rows the latest write actually inserted. Zero on replay.
    pub inserted_count: i64,
    pub processed_at: DateTime<Utc>,
    pub status: String,
}

/// Outcome of [`ReviewStore::store_batch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchWrite {
    pub attempted: usize,
    pub inserted: u64,
    /// Rows filed under the batch date once the write committed.
    pub filed: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreStats {
    pub total_reviews: i64,
    pub total_batches: i64,
    pub min_date: Option<NaiveDate>,
    pub max_date: Option<NaiveDate>,
    pub reviews_per_app: BTreeMap<String, i64>,
}

impl ReviewStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `url` and run migrations.
    pub async fn connect(url: &str) -> Result<Self> {
        if let Some(path) = file_path_of(url) {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self::new(pool);
        store.migrate().await?;
        info!(url, "Review store ready");
        Ok(store)
    }

    /// Private in-memory database, mostly for tests and dry runs.
    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:").await
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Persist one daily batch: insert-or-ignore every review, then upsert
    /// the batch row, in a single transaction. An error means nothing from
    /// this call is durable.
    pub async fn store_batch(
        &self,
        reviews: &[Review],
        app_id: &str,
        batch_date: NaiveDate,
    ) -> Result<BatchWrite> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let mut inserted = 0u64;
        for review in reviews {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO raw_reviews
                    (review_id, content, score, date, at, app_id,
                     thumbs_up_count, batch_date, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(review.id.as_str())
            .bind(&review.content)
            .bind(i64::from(review.rating))
            .bind(review.date)
            .bind(review.at)
            .bind(app_id)
            .bind(review.thumbs_up_count as i64)
            .bind(batch_date)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }

        let filed: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM raw_reviews WHERE batch_date = ?1")
                .bind(batch_date)
                .fetch_one(&mut *tx)
                .await?;

        sqlx::query(
            r#"
            INSERT INTO batch_processing
                (batch_date, review_count, inserted_count, processed_at, status)
            VALUES (?1, ?2, ?3, ?4, 'completed')
            ON CONFLICT(batch_date) DO UPDATE SET
                review_count = excluded.review_count,
                inserted_count = excluded.inserted_count,
                processed_at = excluded.processed_at,
                status = excluded.status
            "#,
        )
        .bind(batch_date)
        .bind(filed)
        .bind(inserted as i64)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            %batch_date,
            attempted = reviews.len(),
            inserted,
            filed,
            "Stored daily batch"
        );

        Ok(BatchWrite {
            attempted: reviews.len(),
            inserted,
            filed: filed as u64,
        })
    }

    /// Reviews whose own date lies in `start..=end`, newest first.
    pub async fn read_by_date_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        app_id: Option<&str>,
    ) -> Result<Vec<StoredReview>> {
        let rows = match app_id {
            Some(app_id) => {
                sqlx::query_as::<_, StoredReview>(
                    r#"
                    SELECT * FROM raw_reviews
                    WHERE date BETWEEN ?1 AND ?2 AND app_id = ?3
                    ORDER BY date DESC, at DESC
                    "#,
                )
                .bind(start)
                .bind(end)
                .bind(app_id)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, StoredReview>(
                    r#"
                    SELECT * FROM raw_reviews
                    WHERE date BETWEEN ?1 AND ?2
                    ORDER BY date DESC, at DESC
                    "#,
                )
                .bind(start)
                .bind(end)
                .fetch_all(&self.pool)
                .await?
            }
        };

        debug!(%start, %end, count = rows.len(), "Read reviews by date range");
        Ok(rows)
    }

    /// Reviews filed under `batch_date`, newest first.
    pub async fn read_by_batch_date(&self, batch_date: NaiveDate) -> Result<Vec<StoredReview>> {
        let rows = sqlx::query_as::<_, StoredReview>(
            r#"
            SELECT * FROM raw_reviews
            WHERE batch_date = ?1
            ORDER BY at DESC
            "#,
        )
        .bind(batch_date)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn batch_record(&self, batch_date: NaiveDate) -> Result<Option<BatchRecord>> {
        let row = sqlx::query_as::<_, BatchRecord>(
            "SELECT * FROM batch_processing WHERE batch_date = ?1",
        )
        .bind(batch_date)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn review_ids(&self) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar("SELECT review_id FROM raw_reviews ORDER BY review_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        let total_reviews: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM raw_reviews")
            .fetch_one(&self.pool)
            .await?;

        let (min_date, max_date): (Option<NaiveDate>, Option<NaiveDate>) =
            sqlx::query_as("SELECT MIN(date), MAX(date) FROM raw_reviews")
                .fetch_one(&self.pool)
                .await?;

        let total_batches: i64 =
            sqlx::query_scalar("SELECT COUNT(DISTINCT batch_date) FROM raw_reviews")
                .fetch_one(&self.pool)
                .await?;

        let per_app: Vec<(String, i64)> =
            sqlx::query_as("SELECT app_id, COUNT(*) FROM raw_reviews GROUP BY app_id")
                .fetch_all(&self.pool)
                .await?;

        Ok(StoreStats {
            total_reviews,
            total_batches,
            min_date,
            max_date,
            reviews_per_app: per_app.into_iter().collect(),
        })
    }

    /// Write every stored review as one JSON object per line, newest first.
    pub async fn export_jsonl(&self, path: &Path) -> Result<usize> {
        let rows = sqlx::query_as::<_, StoredReview>(
            "SELECT * FROM raw_reviews ORDER BY date DESC, at DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = String::new();
        for row in &rows {
            out.push_str(&serde_json::to_string(row)?);
            out.push('\n');
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, out).await?;

        info!(path = %path.display(), count = rows.len(), "Exported reviews");
        Ok(rows.len())
    }
}

/// Filesystem path behind a `sqlite:` URL, if it names a file.
fn file_path_of(url: &str) -> Option<&Path> {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() || path == ":memory:" {
        return None;
    }
    Some(Path::new(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};
    use reviewpulse_common::Rating;

    fn review(id: &str, day: u32, hour: u32) -> Review {
        let at = Utc.with_ymd_and_hms(2025, 6, day, hour, 0, 0).unwrap();
        Review::new(
            Some(id.to_string()),
            format!("review {id}"),
            Rating::try_from(3).unwrap(),
            at,
            FixedOffset::east_opt(0).unwrap(),
        )
        .with_thumbs_up(2)
    }

    fn june(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, day).unwrap()
    }

    #[test]
    fn file_path_parsing() {
        assert_eq!(
            file_path_of("sqlite://data/database/reviews.db"),
            Some(Path::new("data/database/reviews.db"))
        );
        assert_eq!(
            file_path_of("sqlite:reviews.db?mode=rwc"),
            Some(Path::new("reviews.db"))
        );
        assert_eq!(file_path_of("sqlite::memory:"), None);
        assert_eq!(file_path_of("postgres://x"), None);
    }

    #[tokio::test]
    async fn store_batch_inserts_and_records_metadata() {
        let store = ReviewStore::in_memory().await.unwrap();
        let batch = vec![review("a", 1, 10), review("b", 1, 12)];

        let write = store.store_batch(&batch, "app", june(1)).await.unwrap();
        assert_eq!(
            write,
            BatchWrite {
                attempted: 2,
                inserted: 2,
                filed: 2
            }
        );

        let record = store.batch_record(june(1)).await.unwrap().unwrap();
        assert_eq!(record.review_count, 2);
        assert_eq!(record.inserted_count, 2);
        assert_eq!(record.status, "completed");
    }

    #[tokio::test]
    async fn replay_inserts_nothing_and_keeps_count() {
        let store = ReviewStore::in_memory().await.unwrap();
        let batch = vec![review("a", 1, 10), review("b", 1, 12)];

        store.store_batch(&batch, "app", june(1)).await.unwrap();
        let replay = store.store_batch(&batch, "app", june(1)).await.unwrap();

        assert_eq!(replay.inserted, 0);
        assert_eq!(replay.filed, 2);
        let record = store.batch_record(june(1)).await.unwrap().unwrap();
        assert_eq!(record.inserted_count, 0);
        assert_eq!(record.review_count, 2);
        assert_eq!(store.review_ids().await.unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn empty_batch_still_writes_metadata() {
        let store = ReviewStore::in_memory().await.unwrap();
        let write = store.store_batch(&[], "app", june(3)).await.unwrap();
        assert_eq!(write.filed, 0);
        assert!(store.batch_record(june(3)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn date_range_reads_newest_first() {
        let store = ReviewStore::in_memory().await.unwrap();
        store
            .store_batch(&[review("a", 1, 8), review("b", 1, 20)], "app", june(1))
            .await
            .unwrap();
        store
            .store_batch(&[review("c", 2, 9)], "other", june(2))
            .await
            .unwrap();

        let rows = store.read_by_date_range(june(1), june(2), None).await.unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r.review_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);

        let rows = store
            .read_by_date_range(june(1), june(2), Some("app"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].thumbs_up_count, 2);
        assert_eq!(rows[0].score, 3);
        assert_eq!(rows[0].date, june(1));

        let rebuilt = rows[0].clone().into_review().unwrap();
        assert_eq!(rebuilt, review("b", 1, 20));

        let rows = store.read_by_batch_date(june(2)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].app_id, "other");
    }

    #[tokio::test]
    async fn stats_summarize_store() {
        let store = ReviewStore::in_memory().await.unwrap();
        let empty = store.stats().await.unwrap();
        assert_eq!(empty.total_reviews, 0);
        assert_eq!(empty.min_date, None);

        store
            .store_batch(&[review("a", 1, 8), review("b", 1, 20)], "app", june(1))
            .await
            .unwrap();
        store
            .store_batch(&[review("c", 4, 9)], "other", june(4))
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_reviews, 3);
        assert_eq!(stats.total_batches, 2);
        assert_eq!(stats.min_date, Some(june(1)));
        assert_eq!(stats.max_date, Some(june(4)));
        assert_eq!(stats.reviews_per_app.get("app"), Some(&2));
        assert_eq!(stats.reviews_per_app.get("other"), Some(&1));
    }

    #[tokio::test]
    async fn export_writes_json_lines() {
        let store = ReviewStore::in_memory().await.unwrap();
        store
            .store_batch(&[review("a", 1, 8), review("b", 2, 8)], "app", june(1))
            .await
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export").join("reviews.jsonl");
        let count = store.export_jsonl(&path).await.unwrap();
        assert_eq!(count, 2);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["review_id"], "b");
        assert_eq!(lines[1]["date"], "2025-06-01");
    }
}
