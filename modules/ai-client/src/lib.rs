pub mod error;
pub mod openai;
pub mod traits;
pub mod util;

pub use error::{AiError, Result};
pub use openai::OpenAi;
pub use traits::{CompletionAgent, EmbedAgent};
pub use util::{extract_json_object, strip_code_blocks, truncate_to_char_boundary};
