//! Topic stage: extract topics per day, canonicalize them against the
//! registry, and persist.

pub mod consolidator;
pub mod extractor;
pub mod pipeline;
pub mod registry;

pub use consolidator::TopicConsolidator;
pub use extractor::{parse_response, ParsedTopic, TopicExtractor, TopicParseError};
pub use pipeline::{TopicPipeline, TopicRunSummary};
pub use registry::MemoryTopicRegistry;
