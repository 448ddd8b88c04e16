pub mod models;

pub use models::{create_model, ClaudeModel, ScriptedModel, DEFAULT_MODEL};
pub use nd_core::{GenerationRequest, PromptMessage, TextGenerator};

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub api_key: Option<String>,
    pub model_name: Option<String>,
    pub base_url: Option<String>,
}

pub mod prelude {
    pub use super::Config;
    pub use super::models::create_model;
    pub use nd_core::{Error, GenerationRequest, Result, TextGenerator};
}
