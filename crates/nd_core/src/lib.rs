pub mod encoding;
pub mod error;
pub mod extract;
pub mod models;
pub mod storage;
pub mod types;

pub use encoding::EncodingRepair;
pub use error::{Error, Result};
pub use extract::Extractor;
pub use models::{GenerationRequest, PromptMessage, PromptRole, TextGenerator};
pub use storage::{OutcomeSink, PublishReceipt, Publisher};
pub use types::{
    to_chrono, Category, Conversation, ConversationStatus, Expansion, Outcome, QueryAnswer,
    RunMode, Story, StoryCategorySet, Trigger, Turn,
};
