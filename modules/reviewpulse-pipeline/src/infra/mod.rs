pub mod ai;

pub use ai::{openai_from_config, OpenAiEmbedder, OpenAiGenerator};
