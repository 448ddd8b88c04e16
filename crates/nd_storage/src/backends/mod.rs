pub mod github;
pub mod memory;
pub mod usage_log;

pub use github::{GitHubConfig, GitHubPublisher};
pub use memory::{ConversationConfig, ConversationStore};
pub use usage_log::{CostSummary, UsageLog};
