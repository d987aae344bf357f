//! Experience-based learning: inject the right process knowledge before a
//! tool runs, and adjust confidence in that knowledge from what happened.
//!
//! The query side ([`QueryEngine`]) runs on *every* tool use, so it stays
//! allocation-light and regex-free: glob sets are compiled once per
//! session and keyword matching is a plain word-boundary scan. The
//! decision policy is "mostly silent, rarely block": blocking requires a
//! CRITICAL item, strong confidence, and a genuinely risky operation.
//!
//! The tracking side ([`ExperienceTracker`]) records what was injected
//! during a session, scans the final response for outcome signals, and
//! applies multiplicative confidence updates to the backing graphs.

pub mod confidence;
pub mod decide;
pub mod knowledge;
pub mod query;
pub mod tracker;

pub use confidence::{
    Outcome, Source, assign_status, check_deprecation, initial_confidence, update_confidence,
};
pub use decide::{Decision, DecisionPolicy, format_injection, format_interjection};
pub use knowledge::{Priority, ProcessKnowledge, ProcessType, TriggerConditions};
pub use query::{EngineConfig, QueryEngine, ScoredKnowledge, ToolContext};
pub use tracker::{ExperienceTracker, InjectionRecord, OutcomeDetection};
