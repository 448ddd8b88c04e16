use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use nd_core::{
    to_chrono, Conversation, ConversationStatus, Error, QueryAnswer, Result, Turn,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::sweep::{spawn_periodic, SweepHandle};

#[derive(Debug, Clone)]
pub struct ConversationConfig {
    /// Hard cap on stored conversations; creation is refused at this size.
    pub capacity: usize,
    /// Age after which a conversation is swept, whatever its status.
    pub max_age: Duration,
    pub sweep_interval: Duration,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            max_age: Duration::from_secs(60 * 60),
            sweep_interval: Duration::from_secs(5 * 60),
        }
    }
}

/// Bounded, time-expiring map from query id to conversation state.
///
/// Entries are never evicted to make room: once full, [`create`](Self::create)
/// fails with [`Error::CapacityExceeded`] until the sweep reclaims old entries.
#[derive(Debug)]
pub struct ConversationStore {
    conversations: Mutex<HashMap<Uuid, Conversation>>,
    config: ConversationConfig,
}

impl ConversationStore {
    pub fn new(config: ConversationConfig) -> Self {
        Self {
            conversations: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &ConversationConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Conversation>> {
        self.conversations
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn create(&self, query: &str, caller: &str, prior: Option<Uuid>) -> Result<Conversation> {
        self.create_at(query, caller, prior, Utc::now())
    }

    /// Start a conversation in `processing`, carrying over the history of
    /// `prior` when it still resolves.
    pub fn create_at(
        &self,
        query: &str,
        caller: &str,
        prior: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Conversation> {
        let mut conversations = self.lock();
        if conversations.len() >= self.config.capacity {
            warn!(
                capacity = self.config.capacity,
                "Conversation store full, refusing new query"
            );
            return Err(Error::CapacityExceeded);
        }

        let history = prior
            .and_then(|id| conversations.get(&id))
            .map(|c| c.history.clone())
            .unwrap_or_default();

        let conversation = Conversation {
            id: Uuid::new_v4(),
            query: query.to_string(),
            result: None,
            history,
            created_at: now,
            status: ConversationStatus::Processing,
            caller: caller.to_string(),
            error: None,
        };
        conversations.insert(conversation.id, conversation.clone());
        debug!(id = %conversation.id, turns = conversation.history.len(), "Conversation created");
        Ok(conversation)
    }

    /// Move a processing conversation to `complete` and record the turn.
    ///
    /// Returns false if the id is unknown or the conversation already finished.
    pub fn complete(&self, id: Uuid, answer: QueryAnswer) -> bool {
        let mut conversations = self.lock();
        match conversations.get_mut(&id) {
            Some(c) if c.status == ConversationStatus::Processing => {
                c.history.push(Turn {
                    query: c.query.clone(),
                    answer: answer.clone(),
                });
                c.result = Some(answer);
                c.status = ConversationStatus::Complete;
                true
            }
            Some(_) => {
                warn!(%id, "Conversation already finished, ignoring completion");
                false
            }
            None => {
                debug!(%id, "Conversation gone before completion");
                false
            }
        }
    }

    /// Move a processing conversation to `error`.
    pub fn fail(&self, id: Uuid, error: impl Into<String>) -> bool {
        let mut conversations = self.lock();
        match conversations.get_mut(&id) {
            Some(c) if c.status == ConversationStatus::Processing => {
                c.error = Some(error.into());
                c.status = ConversationStatus::Error;
                true
            }
            Some(_) => {
                warn!(%id, "Conversation already finished, ignoring failure");
                false
            }
            None => false,
        }
    }

    pub fn get(&self, id: Uuid) -> Option<Conversation> {
        self.lock().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }

    /// Drop every conversation older than the expiry age, including ones
    /// still `processing` whose worker never reported back.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let max_age = to_chrono(self.config.max_age);
        let mut conversations = self.lock();
        let before = conversations.len();
        conversations.retain(|_, c| now - c.created_at <= max_age);
        before - conversations.len()
    }

    pub fn spawn_sweeper(self: &Arc<Self>) -> SweepHandle {
        let store = Arc::clone(self);
        spawn_periodic("conversations", self.config.sweep_interval, move || store.sweep())
    }
}
