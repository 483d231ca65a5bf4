use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Sort order sent with every request; reviews are always walked newest first.
const SORT_NEWEST: &str = "newest";

/// Opaque pagination cursor handed back by the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContinuationToken(pub String);

impl ContinuationToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Parameters for a single page request.
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub app_id: String,
    pub lang: String,
    pub country: String,
    pub count: u32,
    pub continuation_token: Option<ContinuationToken>,
}

impl PageRequest {
    pub fn newest(
        app_id: impl Into<String>,
        lang: impl Into<String>,
        country: impl Into<String>,
        count: u32,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            lang: lang.into(),
            country: country.into(),
            count,
            continuation_token: None,
        }
    }

    /// Same request, continuing from `token`.
    pub fn continue_from(&self, token: Option<ContinuationToken>) -> Self {
        Self {
            continuation_token: token,
            ..self.clone()
        }
    }

    pub(crate) fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("lang", self.lang.clone()),
            ("country", self.country.clone()),
            ("sort", SORT_NEWEST.to_string()),
            ("count", self.count.to_string()),
        ];
        if let Some(token) = &self.continuation_token {
            pairs.push(("token", token.0.clone()));
        }
        pairs
    }
}

/// A single review as the feed returns it. Every field is optional and a
/// field of the wrong shape reads as absent, so one bad record never fails
/// the page. Validation happens when the pipeline converts it to a `Review`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedReview {
    #[serde(rename = "reviewId", default, deserialize_with = "lenient_string")]
    pub review_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub score: Option<i64>,
    #[serde(rename = "thumbsUpCount", default, deserialize_with = "lenient_i64")]
    pub thumbs_up_count: Option<i64>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub at: Option<DateTime<Utc>>,
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

fn lenient_i64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    Ok(Value::deserialize(d)?.as_i64())
}

/// RFC 3339, or a naive timestamp taken as UTC.
fn lenient_timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
    let Value::String(raw) = Value::deserialize(d)? else {
        return Ok(None);
    };
    if let Ok(at) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(at.with_timezone(&Utc)));
    }
    Ok(raw
        .parse::<NaiveDateTime>()
        .ok()
        .map(|naive| naive.and_utc()))
}

/// One page of reviews plus the cursor for the next one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewPage {
    #[serde(default)]
    pub reviews: Vec<FeedReview>,
    #[serde(rename = "nextToken", default)]
    pub next_token: Option<ContinuationToken>,
}

impl ReviewPage {
    pub fn is_last(&self) -> bool {
        self.next_token.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_page_with_token() {
        let json = r#"{
            "reviews": [
                {"reviewId": "gp:abc", "userName": "R", "content": "Delivery was late",
                 "score": 2, "thumbsUpCount": 4, "at": "2025-06-01T10:15:00Z"},
                {"content": "ok", "score": 5, "at": "2025-06-01T09:00:00Z"}
            ],
            "nextToken": "CAESBgoEOAAQAQ"
        }"#;
        let page: ReviewPage = serde_json::from_str(json).unwrap();
        assert_eq!(page.reviews.len(), 2);
        assert_eq!(page.reviews[0].review_id.as_deref(), Some("gp:abc"));
        assert_eq!(page.reviews[0].thumbs_up_count, Some(4));
        assert!(page.reviews[1].review_id.is_none());
        assert_eq!(page.reviews[1].score, Some(5));
        assert_eq!(
            page.next_token,
            Some(ContinuationToken("CAESBgoEOAAQAQ".to_string()))
        );
        assert!(!page.is_last());
    }

    #[test]
    fn malformed_fields_do_not_fail_the_page() {
        let json = r#"{
            "reviews": [
                {"reviewId": "ok", "content": "fine", "score": 4, "at": "2025-06-01T10:00:00Z"},
                {"reviewId": "bad", "content": "x", "score": null, "at": "yesterday"},
                {"reviewId": 17, "score": "5", "thumbsUpCount": -2},
                {"reviewId": "naive", "content": "y", "score": 2, "at": "2025-06-01T10:00:00.123456"}
            ],
            "nextToken": "t"
        }"#;
        let page: ReviewPage = serde_json::from_str(json).unwrap();
        assert_eq!(page.reviews.len(), 4);
        assert_eq!(page.reviews[0].score, Some(4));
        assert!(page.reviews[0].at.is_some());
        assert_eq!(page.reviews[1].score, None);
        assert_eq!(page.reviews[1].at, None);
        assert_eq!(page.reviews[2].review_id, None);
        assert_eq!(page.reviews[2].score, None);
        assert_eq!(page.reviews[2].thumbs_up_count, Some(-2));
        assert!(page.reviews[2].at.is_none());
        assert_eq!(
            page.reviews[3].at.map(|at| at.to_rfc3339()),
            Some("2025-06-01T10:00:00.123456+00:00".to_string())
        );
    }

    #[test]
    fn missing_token_means_last_page() {
        let page: ReviewPage = serde_json::from_str(r#"{"reviews": []}"#).unwrap();
        assert!(page.is_last());
        assert!(page.reviews.is_empty());
    }

    #[test]
    fn query_includes_token_only_when_continuing() {
        let first = PageRequest::newest("in.swiggy.android", "en", "in", 200);
        assert!(!first.query_pairs().iter().any(|(k, _)| *k == "token"));

        let next = first.continue_from(Some(ContinuationToken("t1".into())));
        let pairs = next.query_pairs();
        assert!(pairs.contains(&("token", "t1".to_string())));
        assert!(pairs.contains(&("sort", "newest".to_string())));
        assert!(pairs.contains(&("count", "200".to_string())));
    }
}
