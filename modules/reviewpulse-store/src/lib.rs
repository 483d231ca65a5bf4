//! Durable storage: raw reviews and batch metadata in SQLite, processed
//! topics, the canonical topic registry, and the JSON progress file.

pub mod error;
pub mod progress;
pub mod registry;
pub mod reviews;
pub mod topics;

pub use error::{ProgressError, Result, StoreError};
pub use progress::{BatchStats, MarkOutcome, ProgressState, ProgressStore, ProgressSummary};
pub use registry::SqliteTopicRegistry;
pub use reviews::{BatchRecord, BatchWrite, ReviewStore, StoreStats, StoredReview};
pub use topics::StoredTopic;
