use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::Outcome;
use crate::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub path: String,
    /// Revision token of the content that was replaced, if the path existed.
    pub previous_revision: Option<String>,
    /// Revision token of the content now stored, when the remote reports one.
    pub revision: Option<String>,
}

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Replace the content at `path` in the remote store.
    ///
    /// Implementations must not retry: a failed conditional write is reported as-is.
    async fn publish(&self, path: &str, content: &[u8], message: &str) -> Result<PublishReceipt>;
}

#[async_trait]
pub trait OutcomeSink: Send + Sync {
    async fn record(&self, outcome: &Outcome) -> Result<()>;
}
