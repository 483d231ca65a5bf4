//! Paginated fetch of recent reviews under a per-day quota.
//!
//! The feed is walked newest-first with its continuation token. Each record
//! is accepted only if its date falls inside the trailing window and that
//! date still has quota left. The walk stops when the feed runs out, when
//! every day in the window is full, or at the page cap.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{FixedOffset, NaiveDate, Utc};
use tracing::{debug, info, warn};

use review_feed_client::{FeedReview, PageRequest};
use reviewpulse_common::{Config, Rating, Review, ReviewPulseError};

use crate::traits::ReviewFeed;

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub app_id: String,
    pub lang: String,
    pub country: String,
    pub page_size: u32,
    pub page_delay: Duration,
    pub max_pages: u32,
    /// Reporting timezone of the feed; review dates and "today" use it.
    pub utc_offset: FixedOffset,
}

impl FetchSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            app_id: config.app_id.clone(),
            lang: config.lang.clone(),
            country: config.country.clone(),
            page_size: config.feed_page_size,
            page_delay: config.feed_page_delay,
            max_pages: config.feed_max_pages,
            utc_offset: config.feed_utc_offset()?,
        })
    }
}

pub struct ReviewFetcher {
    feed: Arc<dyn ReviewFeed>,
    settings: FetchSettings,
    today: Option<NaiveDate>,
}

impl ReviewFetcher {
    pub fn new(feed: Arc<dyn ReviewFeed>, settings: FetchSettings) -> Self {
        Self {
            feed,
            settings,
            today: None,
        }
    }

    /// Pin the last day of the window instead of reading the clock.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    pub fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| today_in(self.settings.utc_offset))
    }

    pub fn window(&self, day_count: u32) -> Vec<NaiveDate> {
        trailing_window(self.today(), day_count)
    }

    /// Collect up to `per_day_quota` reviews for each of the last `day_count`
    /// days. Page errors end the walk early with whatever was collected.
    pub async fn fetch(&self, day_count: u32, per_day_quota: usize) -> Vec<Review> {
        let window = self.window(day_count);
        let (Some(&start), Some(&end)) = (window.first(), window.last()) else {
            return Vec::new();
        };
        if per_day_quota == 0 {
            return Vec::new();
        }

        let s = &self.settings;
        let mut request = PageRequest::newest(&s.app_id, &s.lang, &s.country, s.page_size);
        let mut per_day: HashMap<NaiveDate, usize> = HashMap::new();
        let mut full_days = 0usize;
        let mut collected = Vec::new();
        let mut pages = 0u32;
        let mut invalid = 0usize;

        info!(
            app_id = %s.app_id,
            %start,
            %end,
            per_day_quota,
            "Fetching reviews"
        );

        loop {
            if pages >= s.max_pages {
                warn!(max_pages = s.max_pages, "Stopped at page cap");
                break;
            }
            if pages > 0 && !s.page_delay.is_zero() {
                tokio::time::sleep(s.page_delay).await;
            }

            let page = match self.feed.page(&request).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(page = pages + 1, error = %e, "Page fetch failed, treating feed as exhausted");
                    break;
                }
            };
            pages += 1;

            let received = page.reviews.len();
            for raw in page.reviews {
                let review = match to_review(raw, s.utc_offset) {
                    Ok(review) => review,
                    Err(e) => {
                        invalid += 1;
                        warn!(error = %e, "Dropping invalid review");
                        continue;
                    }
                };
                if review.date < start || review.date > end {
                    continue;
                }
                let count = per_day.entry(review.date).or_default();
                if *count >= per_day_quota {
                    continue;
                }
                *count += 1;
                if *count == per_day_quota {
                    full_days += 1;
                }
                collected.push(review);
            }

            debug!(
                page = pages,
                received,
                collected = collected.len(),
                full_days,
                "Processed page"
            );

            if full_days >= window.len() {
                debug!("Every day in the window reached its quota");
                break;
            }
            match page.next_token {
                Some(token) => request = request.continue_from(Some(token)),
                None => break,
            }
        }

        info!(
            pages,
            collected = collected.len(),
            days = per_day.len(),
            invalid,
            "Fetch complete"
        );
        collected
    }
}

/// Today's date in the feed's reporting timezone.
pub fn today_in(offset: FixedOffset) -> NaiveDate {
    Utc::now().with_timezone(&offset).date_naive()
}

/// The `day_count` dates ending at `today`, oldest first.
pub fn trailing_window(today: NaiveDate, day_count: u32) -> Vec<NaiveDate> {
    (0..day_count as i64)
        .rev()
        .filter_map(|back| today.checked_sub_signed(chrono::Duration::days(back)))
        .collect()
}

/// Validate an upstream record.
pub fn to_review(raw: FeedReview, offset: FixedOffset) -> Result<Review, ReviewPulseError> {
    let name = raw.review_id.as_deref().unwrap_or("<unnamed>");
    let invalid = |what: &str| ReviewPulseError::Validation(format!("review {name} {what}"));

    let content = raw.content.as_deref().unwrap_or_default().trim();
    if content.is_empty() {
        return Err(invalid("has no content"));
    }
    let score = raw.score.ok_or_else(|| invalid("has no score"))?;
    let at = raw.at.ok_or_else(|| invalid("has no timestamp"))?;
    let rating = Rating::try_from(score)?;
    let thumbs_up = raw.thumbs_up_count.unwrap_or(0).clamp(0, u32::MAX as i64) as u32;

    Ok(Review::new(raw.review_id.clone(), content, rating, at, offset).with_thumbs_up(thumbs_up))
}
