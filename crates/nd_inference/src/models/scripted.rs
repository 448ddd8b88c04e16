use std::collections::VecDeque;
use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;
use nd_core::{Error, GenerationRequest, Result, TextGenerator};

/// A generator that replays queued replies in order and records every request.
///
/// When the queue is empty each call fails with an upstream error.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<std::result::Result<Vec<String>, String>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl fmt::Debug for ScriptedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedModel")
            .field("pending", &lock(&self.replies).len())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply made of the given text segments.
    pub fn reply<I, S>(self, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        lock(&self.replies).push_back(Ok(segments.into_iter().map(Into::into).collect()));
        self
    }

    /// Queue a failed call.
    pub fn fail(self, message: impl Into<String>) -> Self {
        lock(&self.replies).push_back(Err(message.into()));
        self
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        lock(&self.requests).clone()
    }

    pub fn pending(&self) -> usize {
        lock(&self.replies).len()
    }
}

#[async_trait]
impl TextGenerator for ScriptedModel {
    fn name(&self) -> &str {
        "Scripted"
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<String>> {
        lock(&self.requests).push(request.clone());
        match lock(&self.replies).pop_front() {
            Some(Ok(segments)) => Ok(segments),
            Some(Err(message)) => Err(Error::Upstream(message)),
            None => Err(Error::Upstream("no scripted reply left".to_string())),
        }
    }
}
