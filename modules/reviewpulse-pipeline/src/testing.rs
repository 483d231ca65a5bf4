// Test doubles for the ingest and topic runs.
//
// - ScriptedFeed (ReviewFeed): queued pages and errors, counts requests
// - FailingSink (ReviewSink): wraps a ReviewStore, fails chosen dates
// - FixedEmbedder (TextEmbedder): registered vectors, hash vectors otherwise
// - ScriptedGenerator (TextGenerator): queued responses, records prompts
//
// Plus helpers for building reviews and topic records on a given date.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{FixedOffset, NaiveDate, TimeZone, Utc};

use review_feed_client::{ContinuationToken, FeedReview, PageRequest, ReviewPage};
use reviewpulse_common::{
    Rating, Review, ReviewId, TextEmbedder, TextGenerator, TopicCategory, TopicRecord,
};
use reviewpulse_store::{BatchWrite, ReviewStore};

use crate::traits::{ReviewFeed, ReviewSink};

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Upstream record for `date` at noon UTC, rating 3, content "review {id}".
pub fn feed_review(id: &str, date: NaiveDate) -> FeedReview {
    FeedReview {
        review_id: Some(id.to_string()),
        content: Some(format!("review {id}")),
        score: Some(3),
        thumbs_up_count: Some(1),
        at: Some(noon(date)),
    }
}

/// Validated review for `date` at noon UTC, matching `feed_review`.
pub fn review_on(id: &str, date: NaiveDate) -> Review {
    let rating = Rating::try_from(3).unwrap();
    Review::new(
        Some(id.to_string()),
        format!("review {id}"),
        rating,
        noon(date),
        FixedOffset::east_opt(0).unwrap(),
    )
    .with_thumbs_up(1)
}

pub fn topic_record(review_id: &str, name: &str) -> TopicRecord {
    let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
    TopicRecord {
        review_id: ReviewId::new(review_id),
        topic_name: name.to_string(),
        category: TopicCategory::Issue,
        date,
        batch_date: date,
        is_seed_topic: false,
        is_new_topic: true,
        original_topic: None,
    }
}

fn noon(date: NaiveDate) -> chrono::DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(12, 0, 0).unwrap())
}

// ---------------------------------------------------------------------------
// ScriptedFeed
// ---------------------------------------------------------------------------

/// Serves queued pages in order. Every page but the last carries a
/// continuation token; once the queue is empty it serves empty last pages.
pub struct ScriptedFeed {
    pages: Mutex<VecDeque<Result<Vec<FeedReview>, String>>>,
    requests: AtomicUsize,
    tokens_seen: Mutex<Vec<Option<String>>>,
}

impl ScriptedFeed {
    pub fn new() -> Self {
        Self {
            pages: Mutex::new(VecDeque::new()),
            requests: AtomicUsize::new(0),
            tokens_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn with_page(self, reviews: Vec<FeedReview>) -> Self {
        self.pages.lock().unwrap().push_back(Ok(reviews));
        self
    }

    pub fn with_error(self, message: &str) -> Self {
        self.pages.lock().unwrap().push_back(Err(message.to_string()));
        self
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Continuation tokens received, one per request.
    pub fn tokens_seen(&self) -> Vec<Option<String>> {
        self.tokens_seen.lock().unwrap().clone()
    }
}

impl Default for ScriptedFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReviewFeed for ScriptedFeed {
    async fn page(&self, request: &PageRequest) -> Result<ReviewPage> {
        let n = self.requests.fetch_add(1, Ordering::SeqCst);
        self.tokens_seen.lock().unwrap().push(
            request
                .continuation_token
                .as_ref()
                .map(|t| t.as_str().to_string()),
        );

        let mut pages = self.pages.lock().unwrap();
        let next = pages.pop_front();
        let more = !pages.is_empty();
        match next {
            None => Ok(ReviewPage::default()),
            Some(Err(message)) => bail!(message),
            Some(Ok(reviews)) => Ok(ReviewPage {
                reviews,
                next_token: more.then(|| ContinuationToken(format!("page-{}", n + 2))),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// FailingSink
// ---------------------------------------------------------------------------

/// Delegates to a real store except for the configured dates.
pub struct FailingSink {
    inner: ReviewStore,
    fail_on: HashSet<NaiveDate>,
}

impl FailingSink {
    pub fn new(inner: ReviewStore) -> Self {
        Self {
            inner,
            fail_on: HashSet::new(),
        }
    }

    pub fn fail_on(mut self, date: NaiveDate) -> Self {
        self.fail_on.insert(date);
        self
    }
}

#[async_trait]
impl ReviewSink for FailingSink {
    async fn store_batch(
        &self,
        reviews: &[Review],
        app_id: &str,
        batch_date: NaiveDate,
    ) -> Result<BatchWrite> {
        if self.fail_on.contains(&batch_date) {
            bail!("disk full while writing {batch_date}");
        }
        Ok(self.inner.store_batch(reviews, app_id, batch_date).await?)
    }
}

// ---------------------------------------------------------------------------
// FixedEmbedder
// ---------------------------------------------------------------------------

/// Deterministic embedder for testing. Registered texts get exact vectors;
/// unmatched texts get a unique hash-based vector (low similarity to everything).
pub struct FixedEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    dimension: usize,
    calls: AtomicUsize,
    batches: AtomicUsize,
}

impl FixedEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            vectors: HashMap::new(),
            dimension,
            calls: AtomicUsize::new(0),
            batches: AtomicUsize::new(0),
        }
    }

    /// Register a text→vector mapping for controlled similarity.
    pub fn on_text(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }

    /// Texts embedded so far, batched or not.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn batches(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    fn vector(&self, text: &str) -> Vec<f32> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.vectors
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.hash_vector(text))
    }

    fn hash_vector(&self, text: &str) -> Vec<f32> {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        text.hash(&mut hasher);
        let mut state = hasher.finish();

        let mut vec = vec![0.0f32; self.dimension];
        for v in vec.iter_mut() {
            // LCG
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            *v = ((state >> 33) as f32 / u32::MAX as f32) * 2.0 - 1.0;
        }
        let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vec.iter_mut() {
                *v /= norm;
            }
        }
        vec
    }
}

#[async_trait]
impl TextEmbedder for FixedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vector(text))
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }
}

// ---------------------------------------------------------------------------
// ScriptedGenerator
// ---------------------------------------------------------------------------

const EMPTY_TOPICS: &str = r#"{"topics": []}"#;

/// Answers prompts from a queue; an empty queue answers with no topics.
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn respond(self, text: &str) -> Self {
        self.responses.lock().unwrap().push_back(Ok(text.to_string()));
        self
    }

    pub fn fail(self, message: &str) -> Self {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl Default for ScriptedGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => bail!(message),
            None => Ok(EMPTY_TOPICS.to_string()),
        }
    }
}
