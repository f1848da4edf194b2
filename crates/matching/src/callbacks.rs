//! Telemetry sink notified around every matcher invocation.
//!
//! The manager calls `on_match_started` once per dispatched matcher and
//! then exactly one of `on_match_completed` / `on_match_error`.

use parking_lot::Mutex;
use std::sync::Arc;
use targeting_criteria::TargetingCriteria;
use tracing::{debug, trace, warn};

use crate::error::MatcherError;
use crate::result::MatchResult;

pub trait CallbackProvider: Send + Sync {
    fn on_match_started(&self, matcher_id: &str, criteria: &TargetingCriteria);

    fn on_match_completed(&self, matcher_id: &str, result: &MatchResult);

    fn on_match_error(&self, matcher_id: &str, error: &MatcherError);

    /// Free-form diagnostics a matcher may emit while it runs.
    fn on_match_detail(&self, _matcher_id: &str, _detail: &str) {}
}

/// Sink for callers that do not need callbacks.
pub struct NoOpCallbacks;

impl CallbackProvider for NoOpCallbacks {
    fn on_match_started(&self, _matcher_id: &str, _criteria: &TargetingCriteria) {}
    fn on_match_completed(&self, _matcher_id: &str, _result: &MatchResult) {}
    fn on_match_error(&self, _matcher_id: &str, _error: &MatcherError) {}
}

/// Forwards callbacks to `tracing`.
pub struct TracingCallbacks;

impl CallbackProvider for TracingCallbacks {
    fn on_match_started(&self, matcher_id: &str, criteria: &TargetingCriteria) {
        debug!(matcher_id, criteria = %criteria.name(), "Matcher started");
    }

    fn on_match_completed(&self, matcher_id: &str, result: &MatchResult) {
        debug!(
            matcher_id,
            criteria = %result.criteria_name,
            score = result.score(),
            matched = result.matched,
            duration_us = result.duration_us,
            "Matcher completed"
        );
    }

    fn on_match_error(&self, matcher_id: &str, error: &MatcherError) {
        warn!(matcher_id, error = %error, "Matcher failed");
    }

    fn on_match_detail(&self, matcher_id: &str, detail: &str) {
        trace!(matcher_id, detail, "Matcher detail");
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CallbackEvent {
    Started { matcher_id: String, criteria_name: String },
    Completed { matcher_id: String, result: MatchResult },
    Error { matcher_id: String, error: MatcherError },
}

impl CallbackEvent {
    pub fn matcher_id(&self) -> &str {
        match self {
            CallbackEvent::Started { matcher_id, .. }
            | CallbackEvent::Completed { matcher_id, .. }
            | CallbackEvent::Error { matcher_id, .. } => matcher_id,
        }
    }
}

/// In-memory sink that records every callback, for tests and audits.
#[derive(Default)]
pub struct RecordingCallbacks {
    events: Mutex<Vec<CallbackEvent>>,
}

impl RecordingCallbacks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<CallbackEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.events.lock().len()
    }

    pub fn started(&self) -> usize {
        self.count_where(|e| matches!(e, CallbackEvent::Started { .. }))
    }

    pub fn completed(&self) -> usize {
        self.count_where(|e| matches!(e, CallbackEvent::Completed { .. }))
    }

    pub fn errors(&self) -> usize {
        self.count_where(|e| matches!(e, CallbackEvent::Error { .. }))
    }

    /// Events recorded for one matcher, in arrival order.
    pub fn events_for(&self, matcher_id: &str) -> Vec<CallbackEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.matcher_id() == matcher_id)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    fn count_where(&self, predicate: impl Fn(&CallbackEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }
}

impl CallbackProvider for RecordingCallbacks {
    fn on_match_started(&self, matcher_id: &str, criteria: &TargetingCriteria) {
        self.events.lock().push(CallbackEvent::Started {
            matcher_id: matcher_id.to_string(),
            criteria_name: criteria.name().to_string(),
        });
    }

    fn on_match_completed(&self, matcher_id: &str, result: &MatchResult) {
        self.events.lock().push(CallbackEvent::Completed {
            matcher_id: matcher_id.to_string(),
            result: result.clone(),
        });
    }

    fn on_match_error(&self, matcher_id: &str, error: &MatcherError) {
        self.events.lock().push(CallbackEvent::Error {
            matcher_id: matcher_id.to_string(),
            error: error.clone(),
        });
    }
}
