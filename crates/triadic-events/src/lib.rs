//! Append-only event log for the triadic hook pipeline.
//!
//! Every hook execution (and failure) is recorded as an RDF-triple-shaped
//! [`Event`] on one JSONL line. The crate splits into three layers:
//!
//! - [`models`]: the [`Event`] record and [`EventFilters`] query shape.
//! - [`repository`]: the [`EventRepository`] trait with in-memory and
//!   JSONL-backed implementations sharing identical query semantics.
//! - [`capture`]: the fail-safe capture path hooks call directly; rate
//!   limited, rotation-aware, and guaranteed not to propagate errors.
//!
//! # Example
//!
//! ```
//! use triadic_events::{Event, EventRepository, InMemoryEventRepository};
//!
//! let mut repo = InMemoryEventRepository::new();
//! let event = Event::new("hook", "executed", serde_json::Map::new());
//! let id = repo.save(event).expect("save");
//!
//! let found = repo.get_by_id(&id).expect("query");
//! assert!(found.is_some());
//! ```

pub mod capture;
pub mod models;
pub mod repository;

use std::path::{Path, PathBuf};

pub use capture::{EventCapture, sanitize_object};
pub use models::{Event, EventFilters, SortOrder};
pub use repository::{EventRepository, InMemoryEventRepository, JsonlEventRepository};

/// Default events file name
pub const EVENTS_FILE: &str = "events.jsonl";

/// Get the events file path for a state directory
pub fn events_path(state_dir: &Path) -> PathBuf {
    state_dir.join(EVENTS_FILE)
}

/// Errors surfaced by event query operations.
///
/// The capture path never returns these; it degrades to a dropped event.
/// Repositories use them to distinguish persistence problems from bad
/// queries and bad records.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// Underlying storage failed (read, lock, append).
    #[error("event storage failed: {0}")]
    Storage(String),

    /// The query itself was unusable.
    #[error("event query failed: {0}")]
    Query(String),

    /// The record violates an invariant (e.g. empty predicate).
    #[error("invalid event: {0}")]
    InvalidEvent(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_helper_returns_expected_path() {
        let base = PathBuf::from(".claude");
        assert_eq!(events_path(&base), PathBuf::from(".claude").join(EVENTS_FILE));
    }

    #[test]
    fn error_variants_format_with_detail() {
        let err = EventError::Storage("disk full".to_string());
        assert!(err.to_string().contains("disk full"));

        let err = EventError::InvalidEvent("predicate empty".to_string());
        assert!(err.to_string().contains("predicate empty"));
    }
}
