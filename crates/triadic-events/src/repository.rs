//! Event repository trait and its two backends.
//!
//! The in-memory backend exists for tests and tooling; the JSONL backend is
//! what production hooks read. Query semantics are shared through the same
//! filter/sort/paginate helpers so the backends cannot drift.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::models::{Event, EventFilters, SortOrder};
use crate::EventError;

/// Storage-agnostic event persistence interface.
pub trait EventRepository {
    /// Persist an event, assigning id/timestamp if the caller left the
    /// generated defaults in place. Rejects events with an empty predicate.
    fn save(&mut self, event: Event) -> Result<String, EventError>;

    /// Retrieve a single event by id.
    fn get_by_id(&self, event_id: &str) -> Result<Option<Event>, EventError>;

    /// Query events: filter, sort, paginate.
    fn query(&self, filters: &EventFilters) -> Result<Vec<Event>, EventError>;

    /// Count events matching the filters (no sort, no pagination).
    fn count(&self, filters: &EventFilters) -> Result<usize, EventError>;
}

fn validate(event: &Event) -> Result<(), EventError> {
    if event.predicate.trim().is_empty() {
        return Err(EventError::InvalidEvent(
            "predicate must be non-empty".to_string(),
        ));
    }
    Ok(())
}

fn sort_key_cmp(a: &Event, b: &Event, sort_by: &str) -> Ordering {
    match sort_by {
        "id" => a.id.cmp(&b.id),
        "subject" => a.subject.cmp(&b.subject),
        "predicate" => a.predicate.cmp(&b.predicate),
        "workspace_id" => a.workspace_id.cmp(&b.workspace_id),
        "hook_name" => a.hook_name.cmp(&b.hook_name),
        "execution_time_ms" => a
            .execution_time_ms
            .partial_cmp(&b.execution_time_ms)
            .unwrap_or(Ordering::Equal),
        // Unknown fields fall back to timestamp ordering.
        _ => a.timestamp.cmp(&b.timestamp),
    }
}

fn apply_query(events: Vec<Event>, filters: &EventFilters) -> Vec<Event> {
    let mut results: Vec<Event> = events.into_iter().filter(|e| filters.matches(e)).collect();

    results.sort_by(|a, b| {
        let ord = sort_key_cmp(a, b, &filters.sort_by);
        match filters.sort_order {
            SortOrder::Asc => ord,
            SortOrder::Desc => ord.reverse(),
        }
    });

    results
        .into_iter()
        .skip(filters.offset)
        .take(filters.limit)
        .collect()
}

/// In-memory repository. Data is lost when the process exits, which is
/// exactly right for tests and short-lived tooling.
#[derive(Debug, Default)]
pub struct InMemoryEventRepository {
    events: Vec<Event>,
}

impl InMemoryEventRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check whether the repository is empty.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl EventRepository for InMemoryEventRepository {
    fn save(&mut self, event: Event) -> Result<String, EventError> {
        validate(&event)?;
        let id = event.id.clone();
        self.events.push(event);
        Ok(id)
    }

    fn get_by_id(&self, event_id: &str) -> Result<Option<Event>, EventError> {
        if event_id.is_empty() {
            return Ok(None);
        }
        Ok(self.events.iter().find(|e| e.id == event_id).cloned())
    }

    fn query(&self, filters: &EventFilters) -> Result<Vec<Event>, EventError> {
        Ok(apply_query(self.events.clone(), filters))
    }

    fn count(&self, filters: &EventFilters) -> Result<usize, EventError> {
        Ok(self.events.iter().filter(|e| filters.matches(e)).count())
    }
}

/// JSONL-backed repository reading the shared events log.
///
/// Reads tolerate malformed lines (logged and skipped) so one corrupt
/// record cannot poison every query. Writes append one line under the
/// advisory lock in `triadic-io`.
#[derive(Debug, Clone)]
pub struct JsonlEventRepository {
    path: PathBuf,
}

impl JsonlEventRepository {
    /// Create a repository over the given JSONL file.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Path to the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<Vec<Event>, EventError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&self.path)
            .map_err(|e| EventError::Storage(format!("read {}: {e}", self.path.display())))?;

        let mut events = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<Event>(line) {
                Ok(event) => events.push(event),
                Err(err) => {
                    warn!(
                        path = %self.path.display(),
                        line = lineno + 1,
                        %err,
                        "skipping malformed event line"
                    );
                }
            }
        }
        Ok(events)
    }
}

impl EventRepository for JsonlEventRepository {
    fn save(&mut self, event: Event) -> Result<String, EventError> {
        validate(&event)?;
        let id = event.id.clone();
        let line = serde_json::to_string(&event)
            .map_err(|e| EventError::InvalidEvent(format!("serialize event: {e}")))?;
        triadic_io::append_line(&self.path, &line)
            .map_err(|e| EventError::Storage(format!("append {}: {e:#}", self.path.display())))?;
        Ok(id)
    }

    fn get_by_id(&self, event_id: &str) -> Result<Option<Event>, EventError> {
        if event_id.is_empty() {
            return Ok(None);
        }
        Ok(self.read_all()?.into_iter().find(|e| e.id == event_id))
    }

    fn query(&self, filters: &EventFilters) -> Result<Vec<Event>, EventError> {
        Ok(apply_query(self.read_all()?, filters))
    }

    fn count(&self, filters: &EventFilters) -> Result<usize, EventError> {
        Ok(self
            .read_all()?
            .iter()
            .filter(|e| filters.matches(e))
            .count())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use serde_json::Map;
    use tempfile::tempdir;

    use super::*;

    fn event(subject: &str, predicate: &str) -> Event {
        Event::new(subject, predicate, Map::new())
    }

    #[test]
    fn save_rejects_empty_predicate() {
        let mut repo = InMemoryEventRepository::new();
        let result = repo.save(event("hook", "  "));
        assert!(matches!(result, Err(EventError::InvalidEvent(_))));
    }

    #[test]
    fn save_returns_event_id() {
        let mut repo = InMemoryEventRepository::new();
        let e = event("hook", "executed");
        let expected = e.id.clone();
        let id = repo.save(e).expect("save");
        assert_eq!(id, expected);
    }

    #[test]
    fn same_payload_saved_twice_yields_two_records() {
        let mut repo = InMemoryEventRepository::new();
        let a = repo.save(event("hook", "executed")).expect("save a");
        let b = repo.save(event("hook", "executed")).expect("save b");
        assert_ne!(a, b);
        assert_eq!(repo.len(), 2);
    }

    #[test]
    fn get_by_id_finds_saved_event() {
        let mut repo = InMemoryEventRepository::new();
        let id = repo.save(event("hook", "executed")).expect("save");

        let found = repo.get_by_id(&id).expect("get");
        assert!(found.is_some());
        assert!(repo.get_by_id("missing").expect("get").is_none());
    }

    #[test]
    fn query_sorts_desc_by_default() {
        let mut repo = InMemoryEventRepository::new();
        let mut first = event("hook", "one");
        first.timestamp = Utc::now() - Duration::seconds(60);
        let second = event("hook", "two");

        repo.save(first).expect("save");
        repo.save(second).expect("save");

        let results = repo.query(&EventFilters::default()).expect("query");
        assert_eq!(results[0].predicate, "two");
        assert_eq!(results[1].predicate, "one");
    }

    #[test]
    fn query_unknown_sort_field_falls_back_to_timestamp() {
        let mut repo = InMemoryEventRepository::new();
        let mut old = event("hook", "old");
        old.timestamp = Utc::now() - Duration::seconds(60);
        repo.save(old).expect("save");
        repo.save(event("hook", "new")).expect("save");

        let mut filters = EventFilters::default();
        filters.sort_by = "no_such_field".to_string();
        let results = repo.query(&filters).expect("query");
        assert_eq!(results[0].predicate, "new");
    }

    #[test]
    fn query_paginates_with_offset_and_limit() {
        let mut repo = InMemoryEventRepository::new();
        for i in 0..10 {
            let mut e = event("hook", &format!("p{i}"));
            e.timestamp = Utc::now() + Duration::seconds(i);
            repo.save(e).expect("save");
        }

        let mut filters = EventFilters::default();
        filters.sort_order = SortOrder::Asc;
        filters.offset = 3;
        filters.limit = 2;

        let results = repo.query(&filters).expect("query");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].predicate, "p3");
        assert_eq!(results[1].predicate, "p4");
    }

    #[test]
    fn count_ignores_pagination() {
        let mut repo = InMemoryEventRepository::new();
        for _ in 0..7 {
            repo.save(event("hook", "executed")).expect("save");
        }

        let mut filters = EventFilters::default();
        filters.limit = 2;
        assert_eq!(repo.count(&filters).expect("count"), 7);
    }

    #[test]
    fn jsonl_round_trips_events() {
        let td = tempdir().expect("tempdir");
        let path = td.path().join("events.jsonl");
        let mut repo = JsonlEventRepository::new(&path);

        let id = repo
            .save(event("hook", "executed").with_workspace("ws-1"))
            .expect("save");

        let found = repo.get_by_id(&id).expect("get").expect("found");
        assert_eq!(found.workspace_id.as_deref(), Some("ws-1"));
    }

    #[test]
    fn jsonl_missing_file_queries_empty() {
        let td = tempdir().expect("tempdir");
        let repo = JsonlEventRepository::new(&td.path().join("none.jsonl"));

        assert!(repo.query(&EventFilters::default()).expect("query").is_empty());
        assert_eq!(repo.count(&EventFilters::default()).expect("count"), 0);
    }

    #[test]
    fn jsonl_skips_malformed_lines() {
        let td = tempdir().expect("tempdir");
        let path = td.path().join("events.jsonl");
        let mut repo = JsonlEventRepository::new(&path);

        repo.save(event("hook", "executed")).expect("save");
        triadic_io::append_line(&path, "{definitely not json").expect("append");
        repo.save(event("hook", "executed")).expect("save");

        assert_eq!(repo.count(&EventFilters::default()).expect("count"), 2);
    }

    #[test]
    fn jsonl_accepts_legacy_object_lines() {
        let td = tempdir().expect("tempdir");
        let path = td.path().join("events.jsonl");

        triadic_io::append_line(
            &path,
            r#"{"subject":"hook","predicate":"executed","object":{"legacy":true}}"#,
        )
        .expect("append");

        let repo = JsonlEventRepository::new(&path);
        let results = repo.query(&EventFilters::default()).expect("query");
        assert_eq!(results.len(), 1);
        assert_eq!(
            results[0].object_data.get("legacy"),
            Some(&serde_json::json!(true))
        );
    }

    #[test]
    fn backends_agree_on_query_semantics() {
        let td = tempdir().expect("tempdir");
        let path = td.path().join("events.jsonl");
        let mut mem = InMemoryEventRepository::new();
        let mut file = JsonlEventRepository::new(&path);

        for i in 0..5 {
            let mut e = event("hook", if i % 2 == 0 { "executed" } else { "failed" });
            e.timestamp = Utc::now() + Duration::seconds(i);
            mem.save(e.clone()).expect("mem save");
            file.save(e).expect("file save");
        }

        let mut filters = EventFilters::default();
        filters.predicate = Some("executed".to_string());
        filters.sort_order = SortOrder::Asc;

        let mem_results = mem.query(&filters).expect("mem query");
        let file_results = file.query(&filters).expect("file query");

        assert_eq!(mem_results.len(), file_results.len());
        for (a, b) in mem_results.iter().zip(file_results.iter()) {
            assert_eq!(a.id, b.id);
        }
    }
}
