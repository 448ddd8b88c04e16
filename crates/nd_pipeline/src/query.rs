use std::sync::Arc;

use nd_core::{
    Conversation, ConversationStatus, Error, Extractor, GenerationRequest, QueryAnswer, Result,
    TextGenerator,
};
use nd_storage::ConversationStore;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::manager::PipelineConfig;
use crate::prompts::{query_messages, ANSWER_MARKER};
use crate::rate_limit::QueryRateLimiter;

/// Longest accepted query, in characters, after trimming.
pub const MAX_QUERY_LEN: usize = 500;

/// An accepted query. The answer is computed by `worker`; poll the store for it.
#[derive(Debug)]
pub struct Submission {
    pub id: Uuid,
    pub status: ConversationStatus,
    pub worker: JoinHandle<()>,
}

/// Interactive questions answered in the background, one conversation per
/// submission, with follow-ups carrying the earlier turns.
pub struct QueryService {
    generator: Arc<dyn TextGenerator>,
    store: Arc<ConversationStore>,
    limiter: Arc<QueryRateLimiter>,
    extractor: Extractor,
    max_tokens: u32,
    searches: u32,
}

impl QueryService {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        store: Arc<ConversationStore>,
        limiter: Arc<QueryRateLimiter>,
        extractor: Extractor,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            generator,
            store,
            limiter,
            extractor,
            max_tokens: config.query_max_tokens,
            searches: config.query_searches,
        }
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn limiter(&self) -> &Arc<QueryRateLimiter> {
        &self.limiter
    }

    pub fn validate(query: &str) -> Result<&str> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::InvalidInput("Query is required".to_string()));
        }
        if query.chars().count() > MAX_QUERY_LEN {
            return Err(Error::InvalidInput(format!(
                "Query must be at most {} characters",
                MAX_QUERY_LEN
            )));
        }
        Ok(query)
    }

    /// Validate, charge the caller's quota, open the conversation and start
    /// answering it. Each refusal is returned before anything later runs.
    pub fn submit(
        self: &Arc<Self>,
        caller: &str,
        query: &str,
        prior: Option<Uuid>,
    ) -> Result<Submission> {
        let query = Self::validate(query)?;
        self.limiter.check(caller)?;
        let conversation = self.store.create(query, caller, prior)?;
        info!(
            "💬 Query {} accepted ({} earlier turns)",
            conversation.id,
            conversation.history.len()
        );

        let id = conversation.id;
        let status = conversation.status;
        let service = Arc::clone(self);
        let worker = tokio::spawn(async move { service.answer(conversation).await });
        Ok(Submission { id, status, worker })
    }

    /// Compute the answer and settle the conversation exactly once.
    pub async fn answer(&self, conversation: Conversation) {
        let id = conversation.id;
        match self.ask(&conversation).await {
            Ok(answer) => {
                if self.store.complete(id, answer) {
                    info!("✅ Query {} answered", id);
                }
            }
            Err(e) => {
                warn!(%id, error = %e, "Query failed");
                self.store.fail(id, e.to_string());
            }
        }
    }

    async fn ask(&self, conversation: &Conversation) -> Result<QueryAnswer> {
        let request =
            GenerationRequest::with_messages(query_messages(&conversation.history, &conversation.query))
                .max_tokens(self.max_tokens)
                .web_search(self.searches);
        let segments = self.generator.generate(&request).await?;
        self.extractor.json(&segments, ANSWER_MARKER)
    }

    pub fn status(&self, id: Uuid) -> Option<Conversation> {
        self.store.get(id)
    }
}
