pub mod advisor;
pub mod openai;

pub use advisor::LlmSelectorAdvisor;
pub use openai::{OpenAiConfig, OpenAiLlmProvider};
