// Seams between the ingest run and its collaborators, so runs can be driven
// by ScriptedFeed and FailingSink in tests.

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;

use review_feed_client::{PageRequest, ReviewFeedClient, ReviewPage};
use reviewpulse_common::Review;
use reviewpulse_store::{BatchWrite, ReviewStore};

// ---------------------------------------------------------------------------
// ReviewFeed
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ReviewFeed: Send + Sync {
    /// Fetch one page of reviews.
    async fn page(&self, request: &PageRequest) -> Result<ReviewPage>;
}

#[async_trait]
impl ReviewFeed for ReviewFeedClient {
    async fn page(&self, request: &PageRequest) -> Result<ReviewPage> {
        Ok(self.fetch_page(request).await?)
    }
}

// ---------------------------------------------------------------------------
// ReviewSink
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ReviewSink: Send + Sync {
    /// Durably write one day's reviews. Nothing is durable if this errors.
    async fn store_batch(
        &self,
        reviews: &[Review],
        app_id: &str,
        batch_date: NaiveDate,
    ) -> Result<BatchWrite>;
}

#[async_trait]
impl ReviewSink for ReviewStore {
    async fn store_batch(
        &self,
        reviews: &[Review],
        app_id: &str,
        batch_date: NaiveDate,
    ) -> Result<BatchWrite> {
        Ok(ReviewStore::store_batch(self, reviews, app_id, batch_date).await?)
    }
}
