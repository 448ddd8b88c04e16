use std::sync::Arc;

use nd_core::{Result, TextGenerator};
use tracing::info;

use crate::Config;

pub mod claude;
pub mod scripted;

pub use claude::ClaudeModel;
pub use scripted::ScriptedModel;

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

pub fn create_model(config: Config) -> Result<Arc<dyn TextGenerator>> {
    let model_name = config.model_name.unwrap_or_else(|| DEFAULT_MODEL.to_string());
    let mut model = ClaudeModel::new(config.api_key, model_name)?;
    if let Some(base_url) = config.base_url {
        model = model.with_base_url(base_url);
    }
    info!("🧠 Inference model initialized (Claude, {})", model.model());
    Ok(Arc::new(model))
}
