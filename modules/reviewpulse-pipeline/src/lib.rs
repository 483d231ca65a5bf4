pub mod fetcher;
pub mod infra;
pub mod ingest;
pub mod partition;
pub mod topics;
pub mod traits;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use fetcher::{FetchSettings, ReviewFetcher};
pub use ingest::{BatchIngestor, IngestStatus, IngestSummary};
pub use partition::partition;
pub use topics::{
    MemoryTopicRegistry, TopicConsolidator, TopicExtractor, TopicParseError, TopicPipeline,
    TopicRunSummary,
};
pub use traits::{ReviewFeed, ReviewSink};
