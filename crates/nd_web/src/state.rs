use std::sync::Arc;

use nd_pipeline::{GenerationGuard, Orchestrator, QueryService};
use nd_storage::{ConversationStore, UsageLog};

pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub queries: Arc<QueryService>,
    pub usage: UsageLog,
    /// Key query quotas on `X-Forwarded-For` instead of the peer address.
    /// Only safe behind a proxy that overwrites the header.
    pub trust_forwarded_for: bool,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, queries: Arc<QueryService>, usage: UsageLog) -> Self {
        Self {
            orchestrator,
            queries,
            usage,
            trust_forwarded_for: false,
        }
    }

    pub fn with_trust_forwarded_for(mut self, trust: bool) -> Self {
        self.trust_forwarded_for = trust;
        self
    }

    pub fn guard(&self) -> &Arc<GenerationGuard> {
        self.orchestrator.guard()
    }

    pub fn conversations(&self) -> &Arc<ConversationStore> {
        self.queries.store()
    }
}
