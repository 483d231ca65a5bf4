pub mod error;
pub mod types;

pub use error::{FeedError, Result};
pub use types::{ContinuationToken, FeedReview, PageRequest, ReviewPage};

use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for a paginated review feed.
///
/// Expects `GET {base_url}/apps/{app_id}/reviews?lang=..&country=..&sort=..&count=..[&token=..]`
/// to answer with a [`ReviewPage`] JSON body.
pub struct ReviewFeedClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl ReviewFeedClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Fetch one page. No retries; the caller decides what a failure means.
    pub async fn fetch_page(&self, request: &PageRequest) -> Result<ReviewPage> {
        let url = format!("{}/apps/{}/reviews", self.base_url, request.app_id);

        let mut builder = self.client.get(&url).query(&request.query_pairs());
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let resp = builder.send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(FeedError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = resp.text().await?;
        let page: ReviewPage = serde_json::from_str(&body)?;
        tracing::debug!(
            app_id = %request.app_id,
            count = page.reviews.len(),
            has_next = page.next_token.is_some(),
            "Fetched review page"
        );

        Ok(page)
    }
}
