//! Language model adapter: complexity-tiered routing, the response envelope,
//! and the prompt builders for every pipeline stage.

pub mod envelope;
pub mod prompts;
pub mod provider;
#[cfg(feature = "remote-providers")]
pub mod remote;

pub use envelope::{extract_output, extract_output_or_raw, is_nothing_to_remember, parse_json_output};
pub use provider::{Complexity, Generation, LanguageModel, Message, Role};
#[cfg(feature = "remote-providers")]
pub use remote::RemoteLanguageModel;
