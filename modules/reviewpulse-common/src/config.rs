use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::FixedOffset;
use tracing::info;

use crate::error::ReviewPulseError;

/// Application configuration loaded from environment variables (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    // Storage
    pub database_url: String,
    pub progress_path: PathBuf,

    // Upstream feed
    pub app_id: String,
    pub lang: String,
    pub country: String,
    pub feed_base_url: String,
    pub feed_api_key: Option<String>,
    pub feed_page_size: u32,
    pub feed_page_delay: Duration,
    pub feed_max_pages: u32,
    pub feed_timeout: Duration,
    pub feed_utc_offset_minutes: i32,

    // Batching
    pub days_range: u32,
    pub reviews_per_day: usize,

    // Extraction / consolidation
    pub llm_base_url: Option<String>,
    pub llm_api_key: String,
    pub llm_model: String,
    pub llm_max_tokens: u32,
    pub llm_timeout: Duration,
    pub embedding_model: String,
    pub similarity_threshold: f64,
    pub extraction_chunk_size: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ReviewPulseError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Missing keys fall back to defaults;
    /// present but unparseable values are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ReviewPulseError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let config = Self {
            database_url: get("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://data/database/reviews.db".to_string()),
            progress_path: get("PROGRESS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/batch_status/processing_status.json")),
            app_id: get("APP_ID").unwrap_or_else(|| "in.swiggy.android".to_string()),
            lang: get("REVIEW_LANG").unwrap_or_else(|| "en".to_string()),
            country: get("REVIEW_COUNTRY").unwrap_or_else(|| "in".to_string()),
            feed_base_url: get("FEED_BASE_URL")
                .unwrap_or_else(|| "http://localhost:8080".to_string()),
            feed_api_key: get("FEED_API_KEY"),
            feed_page_size: parsed(&get, "FEED_PAGE_SIZE", 200)?,
            feed_page_delay: Duration::from_millis(parsed(&get, "FEED_PAGE_DELAY_MS", 1000)?),
            feed_max_pages: parsed(&get, "FEED_MAX_PAGES", 500)?,
            feed_timeout: Duration::from_secs(parsed(&get, "FEED_TIMEOUT_SECS", 30)?),
            feed_utc_offset_minutes: parsed(&get, "FEED_UTC_OFFSET_MINUTES", 0)?,
            days_range: parsed(&get, "DAYS_RANGE", 60)?,
            reviews_per_day: parsed(&get, "REVIEWS_PER_DAY", 100)?,
            llm_base_url: get("LLM_BASE_URL"),
            llm_api_key: get("LLM_API_KEY")
                .or_else(|| get("OPENAI_API_KEY"))
                .unwrap_or_default(),
            llm_model: get("LLM_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            llm_max_tokens: parsed(&get, "LLM_MAX_TOKENS", 500)?,
            llm_timeout: Duration::from_secs(parsed(&get, "LLM_TIMEOUT_SECS", 120)?),
            embedding_model: get("EMBEDDING_MODEL")
                .unwrap_or_else(|| "text-embedding-3-small".to_string()),
            similarity_threshold: parsed(&get, "SIMILARITY_THRESHOLD", 0.8)?,
            extraction_chunk_size: parsed(&get, "EXTRACTION_CHUNK_SIZE", 5)?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ReviewPulseError> {
        if self.days_range == 0 {
            return Err(ReviewPulseError::Config("DAYS_RANGE must be at least 1".into()));
        }
        if self.reviews_per_day == 0 {
            return Err(ReviewPulseError::Config(
                "REVIEWS_PER_DAY must be at least 1".into(),
            ));
        }
        if self.feed_page_size == 0 {
            return Err(ReviewPulseError::Config(
                "FEED_PAGE_SIZE must be at least 1".into(),
            ));
        }
        if self.extraction_chunk_size == 0 {
            return Err(ReviewPulseError::Config(
                "EXTRACTION_CHUNK_SIZE must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(ReviewPulseError::Config(
                "SIMILARITY_THRESHOLD must be within 0.0..=1.0".into(),
            ));
        }
        self.feed_utc_offset()?;
        Ok(())
    }

    /// The feed's reporting timezone.
    pub fn feed_utc_offset(&self) -> Result<FixedOffset, ReviewPulseError> {
        self.feed_utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                ReviewPulseError::Config(format!(
                    "FEED_UTC_OFFSET_MINUTES out of range: {}",
                    self.feed_utc_offset_minutes
                ))
            })
    }

    /// Log the effective configuration without secrets.
    pub fn log_redacted(&self) {
        info!(
            database_url = %self.database_url,
            progress_path = %self.progress_path.display(),
            app_id = %self.app_id,
            lang = %self.lang,
            country = %self.country,
            feed_base_url = %self.feed_base_url,
            feed_api_key_set = self.feed_api_key.is_some(),
            feed_page_size = self.feed_page_size,
            feed_page_delay_ms = self.feed_page_delay.as_millis() as u64,
            feed_max_pages = self.feed_max_pages,
            days_range = self.days_range,
            reviews_per_day = self.reviews_per_day,
            llm_base_url = self.llm_base_url.as_deref().unwrap_or("default"),
            llm_api_key_set = !self.llm_api_key.is_empty(),
            llm_model = %self.llm_model,
            embedding_model = %self.embedding_model,
            similarity_threshold = self.similarity_threshold,
            "Configuration loaded"
        );
    }
}

fn parsed<T, G>(get: &G, key: &str, default: T) -> Result<T, ReviewPulseError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ReviewPulseError::Config(format!("{key}={raw:?}: {e}"))),
        None => Ok(default),
    }
}
