use std::sync::Arc;

use tracing::debug;

use crate::outline::{GenerationError, Outline, OutlineGenerator};

/// The four mutually exclusive presentation states. Modeled as a sum type so
/// impossible combinations (loading with stale error text, error with a
/// retained outline) cannot be represented.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationState {
    Idle,
    Loading,
    Success(Outline),
    Error(String),
}

impl GenerationState {
    pub fn is_loading(&self) -> bool {
        matches!(self, GenerationState::Loading)
    }

    pub fn outline(&self) -> Option<&Outline> {
        match self {
            GenerationState::Success(outline) => Some(outline),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            GenerationState::Error(message) => Some(message),
            _ => None,
        }
    }
}

/// Drives [`GenerationState`] transitions around a shared [`OutlineGenerator`].
///
/// At most one generation is in flight per session: `begin` refuses while a
/// call is outstanding, which is the sole admission control the system needs.
pub struct OutlineSession {
    generator: Arc<OutlineGenerator>,
    state: GenerationState,
}

impl OutlineSession {
    pub fn new(generator: Arc<OutlineGenerator>) -> Self {
        Self {
            generator,
            state: GenerationState::Idle,
        }
    }

    pub fn state(&self) -> &GenerationState {
        &self.state
    }

    /// Accepts a submission and transitions to `Loading`. Returns `false`
    /// without changing state when a call is already outstanding or the topic
    /// is blank.
    pub fn begin(&mut self, topic: &str) -> bool {
        if self.state.is_loading() {
            debug!("submission ignored: a generation call is already in flight");
            return false;
        }
        if topic.trim().is_empty() {
            return false;
        }
        self.state = GenerationState::Loading;
        true
    }

    /// Completes the outstanding call. Entering `Error` discards any previous
    /// outline; entering `Success` discards any previous error.
    pub fn finish(&mut self, result: Result<Outline, GenerationError>) -> &GenerationState {
        self.state = match result {
            Ok(outline) => GenerationState::Success(outline),
            Err(err) => GenerationState::Error(err.to_string()),
        };
        &self.state
    }

    /// One full submission cycle: `begin`, generate, `finish`. Returns the
    /// resulting state, or the unchanged current state if the submission was
    /// refused.
    pub async fn submit(&mut self, topic: &str) -> &GenerationState {
        if !self.begin(topic) {
            return &self.state;
        }
        let result = self.generator.generate(topic).await;
        self.finish(result)
    }

    pub fn reset(&mut self) {
        self.state = GenerationState::Idle;
    }
}
