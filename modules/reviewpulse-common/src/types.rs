use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ReviewPulseError;

// --- Reviews ---

/// Stable review identifier. Upstream ids are used verbatim; reviews without
/// one get a deterministic id from content + timestamp so re-fetches collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReviewId(String);

impl ReviewId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn synthesize(content: &str, at: DateTime<Utc>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        hasher.update([0u8]);
        hasher.update(at.timestamp().to_be_bytes());
        let digest = hex::encode(hasher.finalize());
        Self(format!("rev_{}", &digest[..32]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ReviewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Star rating, 1 through 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Rating(u8);

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Rating {
    type Error = ReviewPulseError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if (Self::MIN as i64..=Self::MAX as i64).contains(&value) {
            Ok(Rating(value as u8))
        } else {
            Err(ReviewPulseError::Validation(format!(
                "rating {value} outside {}..={}",
                Self::MIN,
                Self::MAX
            )))
        }
    }
}

impl From<Rating> for i64 {
    fn from(r: Rating) -> i64 {
        r.0 as i64
    }
}

/// A validated review. `date` is the calendar date of `at` in the feed's
/// reporting timezone and is what daily batching keys on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub content: String,
    pub rating: Rating,
    pub at: DateTime<Utc>,
    pub date: NaiveDate,
    pub thumbs_up_count: u32,
}

impl Review {
    pub fn new(
        id: Option<String>,
        content: impl Into<String>,
        rating: Rating,
        at: DateTime<Utc>,
        offset: FixedOffset,
    ) -> Self {
        let content = content.into();
        let id = match id.filter(|s| !s.trim().is_empty()) {
            Some(id) => ReviewId::new(id),
            None => ReviewId::synthesize(&content, at),
        };
        Self {
            id,
            content,
            rating,
            at,
            date: review_date(at, offset),
            thumbs_up_count: 0,
        }
    }

    pub fn with_thumbs_up(mut self, count: u32) -> Self {
        self.thumbs_up_count = count;
        self
    }
}

/// Calendar date of `at` as seen from `offset`.
pub fn review_date(at: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    at.with_timezone(&offset).date_naive()
}

// --- Topics ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicCategory {
    Issue,
    Request,
    Feedback,
}

impl TopicCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopicCategory::Issue => "issue",
            TopicCategory::Request => "request",
            TopicCategory::Feedback => "feedback",
        }
    }
}

impl fmt::Display for TopicCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TopicCategory {
    type Err = ReviewPulseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "issue" => Ok(TopicCategory::Issue),
            "request" => Ok(TopicCategory::Request),
            "feedback" => Ok(TopicCategory::Feedback),
            other => Err(ReviewPulseError::Validation(format!(
                "unknown topic category: {other}"
            ))),
        }
    }
}

/// One topic attached to one review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicRecord {
    pub review_id: ReviewId,
    pub topic_name: String,
    pub category: TopicCategory,
    pub date: NaiveDate,
    pub batch_date: NaiveDate,
    pub is_seed_topic: bool,
    pub is_new_topic: bool,
    /// Set when consolidation replaced `topic_name` with a canonical spelling.
    pub original_topic: Option<String>,
}

impl TopicRecord {
    /// Rewrite the name to `canonical`, keeping the first-seen spelling as provenance.
    pub fn canonicalize(&mut self, canonical: &str) {
        if self.topic_name == canonical {
            return;
        }
        let previous = std::mem::replace(&mut self.topic_name, canonical.to_string());
        if self.original_topic.is_none() {
            self.original_topic = Some(previous);
        }
    }
}

/// Fixed vocabulary the extractor is primed with.
pub const SEED_TOPICS: &[&str] = &[
    "Delivery issue",
    "Food stale",
    "Delivery partner rude",
    "Maps not working properly",
    "Instamart should be open all night",
    "Bring back 10 minute bolt delivery",
];

pub fn is_seed_topic(name: &str) -> bool {
    SEED_TOPICS.contains(&name)
}
