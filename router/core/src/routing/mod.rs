//! Request Routing
//!
//! Scenario-driven model selection and request execution.
//!
//! # Architecture
//!
//! ```text
//! +------------------+
//! |  RequestRouter   |  <-- call / stream / embed
//! +--------+---------+
//!          |
//!          v
//! +------------------+      +--------------+
//! | ScenarioSelector | ---> | DecisionLog  |
//! +--------+---------+      +--------------+
//!          |
//!          v
//! +------------------+
//! |  RetryExecutor   |  <-- backoff around adapter dispatch
//! +--------+---------+
//!          |
//!          v
//! +------------------+
//! |   Accountant     |  <-- usage, metrics, audit
//! +------------------+
//! ```
//!
//! # Design Principles
//!
//! 1. **Scenarios, not vendors**: callers name a use case, profiles pick the model
//! 2. **Snapshot reads**: every request sees one registry generation
//! 3. **Fallbacks are data**: the last-resort cascade is an ordered list
//! 4. **Exactly-once accounting**: every executed call settles once

pub mod accounting;
pub mod decision_log;
pub mod retry;
pub mod router;
pub mod scenario;
pub mod selector;
pub mod stream;

#[cfg(test)]
pub(crate) mod test_utils;

pub use accounting::{Accountant, CallContext, CallOutcome, CANCELLED_CODE};
pub use decision_log::{DecisionLog, ScenarioCounts, SelectionDecision, SelectionStatistics};
pub use retry::{RetryConfig, RetryExecutor, RetryOutcome};
pub use router::{
    ReloadSummary, RequestRouter, RequestRouterBuilder, RouteContext, DEFAULT_EXCERPT_CHARS,
    DEFAULT_STREAM_DEADLINE,
};
pub use scenario::{
    HardConstraints, ScenarioCatalog, ScenarioProfile, ScoringWeights, SelectionStrategy,
};
pub use selector::{score_candidates, FallbackStep, ScenarioSelector, ScoredModel, FALLBACK_CASCADE};
pub use stream::{ResponseStream, StreamState};
