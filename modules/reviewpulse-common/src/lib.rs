pub mod config;
pub mod error;
pub mod similarity;
pub mod traits;
pub mod types;

pub use config::Config;
pub use error::ReviewPulseError;
pub use similarity::{cosine_distance, cosine_similarity};
pub use traits::{Neighbor, TextEmbedder, TextGenerator, TopicRegistry};
pub use types::*;
