//! Topic extraction through a text-generation oracle.
//!
//! Reviews are sent in small numbered chunks together with the seed
//! vocabulary. The oracle answers with a JSON object; each topic it names is
//! attached to the reviews it cites by position.

use std::sync::{Arc, LazyLock};

use chrono::NaiveDate;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use ai_client::{extract_json_object, truncate_to_char_boundary};
use reviewpulse_common::{
    is_seed_topic, Review, TextGenerator, TopicCategory, TopicRecord, SEED_TOPICS,
};

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

#[derive(Debug, thiserror::Error)]
pub enum TopicParseError {
    #[error("no JSON object in oracle response")]
    NoJson,

    #[error("malformed oracle response: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// One topic as the oracle reported it, after validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTopic {
    pub name: String,
    pub category: TopicCategory,
    /// 1-based positions within the chunk.
    pub review_positions: Vec<usize>,
    pub is_new_topic: bool,
}

#[derive(Deserialize)]
struct RawResponse {
    #[serde(default)]
    topics: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct RawTopic {
    #[serde(default)]
    topic_name: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    review_ids: Vec<serde_json::Value>,
    #[serde(default)]
    is_new_topic: bool,
}

/// Parse an oracle response. A response with no usable JSON is an error;
/// individual bad entries are skipped.
pub fn parse_response(text: &str) -> Result<Vec<ParsedTopic>, TopicParseError> {
    let json = extract_json_object(text).ok_or(TopicParseError::NoJson)?;
    let response: RawResponse = serde_json::from_str(json)?;

    let mut topics = Vec::with_capacity(response.topics.len());
    for value in response.topics {
        let raw: RawTopic = match serde_json::from_value(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Skipping malformed topic entry");
                continue;
            }
        };

        let name = WHITESPACE.replace_all(raw.topic_name.trim(), " ").into_owned();
        if name.is_empty() {
            warn!("Skipping topic with empty name");
            continue;
        }

        let category = match raw.category.as_deref() {
            None => TopicCategory::Issue,
            Some(c) => match c.parse() {
                Ok(category) => category,
                Err(e) => {
                    warn!(topic = %name, error = %e, "Skipping topic");
                    continue;
                }
            },
        };

        topics.push(ParsedTopic {
            name,
            category,
            review_positions: raw.review_ids.iter().filter_map(position).collect(),
            is_new_topic: raw.is_new_topic,
        });
    }
    Ok(topics)
}

fn position(value: &serde_json::Value) -> Option<usize> {
    match value {
        serde_json::Value::Number(n) => n.as_u64().map(|n| n as usize),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn build_prompt(chunk: &[Review]) -> String {
    let reviews = chunk
        .iter()
        .enumerate()
        .map(|(i, r)| format!("Review {} (rating {}/5): {}", i + 1, r.rating.value(), r.content))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        r#"Analyze these app reviews and extract the specific topics they mention.

SEED TOPICS (reuse these names when they fit):
{seeds}

REVIEWS:
{reviews}

Guidelines:
- Topics are issues, requests or feedback.
- Merge similar phrasings into one topic with a short, clear name.
- Mark topics that are not in the seed list as new.
- review_ids are the review numbers above that mention the topic.

Respond with JSON only:
{{
  "topics": [
    {{
      "topic_name": "topic name",
      "category": "issue|request|feedback",
      "review_ids": [1, 2],
      "is_new_topic": true
    }}
  ]
}}"#,
        seeds = SEED_TOPICS.join(", "),
    )
}

pub struct TopicExtractor {
    generator: Arc<dyn TextGenerator>,
    chunk_size: usize,
}

impl TopicExtractor {
    pub fn new(generator: Arc<dyn TextGenerator>, chunk_size: usize) -> Self {
        Self {
            generator,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Extract topics for one day's reviews. Oracle and parse failures only
    /// cost the chunk they happen in.
    pub async fn extract(&self, reviews: &[Review], batch_date: NaiveDate) -> Vec<TopicRecord> {
        let mut records = Vec::new();

        for (index, chunk) in reviews.chunks(self.chunk_size).enumerate() {
            let response = match self.generator.generate(&build_prompt(chunk)).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(%batch_date, chunk = index, error = %e, "Extraction call failed");
                    continue;
                }
            };

            let topics = match parse_response(&response) {
                Ok(topics) => topics,
                Err(e) => {
                    warn!(
                        %batch_date,
                        chunk = index,
                        error = %e,
                        response = truncate_to_char_boundary(&response, 200),
                        "Could not parse extraction"
                    );
                    continue;
                }
            };

            debug!(%batch_date, chunk = index, topics = topics.len(), "Extracted chunk");
            for topic in &topics {
                records.extend(fan_out(topic, chunk, batch_date));
            }
        }

        info!(
            %batch_date,
            reviews = reviews.len(),
            topics = records.len(),
            "Extracted topics"
        );
        records
    }
}

/// One record per cited review. A topic citing no valid position applies to
/// the whole chunk.
fn fan_out(topic: &ParsedTopic, chunk: &[Review], batch_date: NaiveDate) -> Vec<TopicRecord> {
    let mut cited: Vec<&Review> = Vec::new();
    for &pos in &topic.review_positions {
        if let Some(review) = pos.checked_sub(1).and_then(|i| chunk.get(i)) {
            if !cited.iter().any(|r| r.id == review.id) {
                cited.push(review);
            }
        }
    }
    if cited.is_empty() {
        cited = chunk.iter().collect();
    }

    cited
        .into_iter()
        .map(|review| TopicRecord {
            review_id: review.id.clone(),
            topic_name: topic.name.clone(),
            category: topic.category,
            date: review.date,
            batch_date,
            is_seed_topic: is_seed_topic(&topic.name),
            is_new_topic: topic.is_new_topic,
            original_topic: None,
        })
        .collect()
}
