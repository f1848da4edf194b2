//! Matcher contract and the concurrent execution manager that fans a
//! targeting decision out across registered matchers.

#![warn(clippy::unwrap_used)]

pub mod callbacks;
pub mod cancel;
pub mod error;
pub mod manager;
pub mod matcher;
pub mod matchers;
pub mod result;

pub use callbacks::{CallbackEvent, CallbackProvider, NoOpCallbacks, RecordingCallbacks, TracingCallbacks};
pub use cancel::CancellationSignal;
pub use error::MatcherError;
pub use manager::{MatcherManager, MatcherStatistics};
pub use matcher::{MatcherDescriptor, MatcherMetadata, TargetingMatcher};
pub use matchers::{default_matchers, CriteriaMatcher};
pub use result::{MatchFailure, MatchResult, OverallMatchResult};
