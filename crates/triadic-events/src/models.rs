//! Event record and query filter types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

fn generated_id() -> String {
    Uuid::new_v4().to_string()
}

fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// A single immutable event in RDF triple shape.
///
/// `subject` names what the event is about, `predicate` what happened, and
/// `object_data` carries the details as an arbitrary JSON map. Records
/// written by older runtimes used the key `object` for the detail map;
/// those are accepted on read and normalized to `object_data` on write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier, assigned on creation.
    #[serde(default = "generated_id")]
    pub id: String,
    /// When the event occurred (UTC). Append order, not this clock, is the
    /// ordering authority within a single writer.
    #[serde(default = "now_utc")]
    pub timestamp: DateTime<Utc>,
    /// What the event is about (e.g. "hook", "agent", "workspace").
    pub subject: String,
    /// What happened (e.g. "executed", "failed"). Never empty.
    pub predicate: String,
    /// Event detail payload.
    #[serde(default, alias = "object")]
    pub object_data: Map<String, Value>,
    /// Workspace the event belongs to, when one was active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    /// Hook that produced the event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hook_name: Option<String>,
    /// Wall-clock duration of the producing hook, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<f64>,
    /// Error message, for failure events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Additional context (runtime version, etc.).
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Event {
    /// Create an event with a fresh id and the current UTC timestamp.
    pub fn new(subject: &str, predicate: &str, object_data: Map<String, Value>) -> Self {
        Self {
            id: generated_id(),
            timestamp: Utc::now(),
            subject: subject.to_string(),
            predicate: predicate.to_string(),
            object_data,
            workspace_id: None,
            hook_name: None,
            execution_time_ms: None,
            error: None,
            metadata: Map::new(),
        }
    }

    /// Set the workspace id.
    pub fn with_workspace(mut self, workspace_id: &str) -> Self {
        self.workspace_id = Some(workspace_id.to_string());
        self
    }

    /// Set the hook name.
    pub fn with_hook(mut self, hook_name: &str) -> Self {
        self.hook_name = Some(hook_name.to_string());
        self
    }
}

/// Result ordering direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Query filters for event retrieval. All filters combine with AND
/// semantics; unset fields match everything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFilters {
    /// Match events from this workspace only.
    pub workspace_id: Option<String>,
    /// Match this subject exactly.
    pub subject: Option<String>,
    /// Match this predicate exactly.
    pub predicate: Option<String>,
    /// Inclusive lower bound on timestamp.
    pub time_from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on timestamp.
    pub time_to: Option<DateTime<Utc>>,
    /// Case-insensitive full-text search across subject, predicate, error,
    /// and the stringified detail payload.
    pub search: Option<String>,
    /// Maximum results returned by `query`.
    pub limit: usize,
    /// Results skipped before the limit applies.
    pub offset: usize,
    /// Field to sort by; unknown fields fall back to `timestamp`.
    pub sort_by: String,
    /// Sort direction.
    pub sort_order: SortOrder,
}

impl Default for EventFilters {
    fn default() -> Self {
        Self {
            workspace_id: None,
            subject: None,
            predicate: None,
            time_from: None,
            time_to: None,
            search: None,
            limit: 100,
            offset: 0,
            sort_by: "timestamp".to_string(),
            sort_order: SortOrder::Desc,
        }
    }
}

impl EventFilters {
    /// Check whether an event passes every set filter.
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ws) = &self.workspace_id
            && event.workspace_id.as_deref() != Some(ws.as_str())
        {
            return false;
        }
        if let Some(subject) = &self.subject
            && event.subject != *subject
        {
            return false;
        }
        if let Some(predicate) = &self.predicate
            && event.predicate != *predicate
        {
            return false;
        }
        if let Some(from) = self.time_from
            && event.timestamp < from
        {
            return false;
        }
        if let Some(to) = self.time_to
            && event.timestamp > to
        {
            return false;
        }
        if let Some(needle) = &self.search {
            let needle = needle.to_lowercase();
            let object_text = Value::Object(event.object_data.clone()).to_string().to_lowercase();
            let in_error = event
                .error
                .as_deref()
                .map(|e| e.to_lowercase().contains(&needle))
                .unwrap_or(false);
            if !event.subject.to_lowercase().contains(&needle)
                && !event.predicate.to_lowercase().contains(&needle)
                && !in_error
                && !object_text.contains(&needle)
            {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sample() -> Event {
        let mut data = Map::new();
        data.insert("tool_name".to_string(), json!("Write"));
        Event::new("hook", "executed", data)
            .with_workspace("ws-1")
            .with_hook("pre_tool_use")
    }

    #[test]
    fn new_event_gets_id_and_timestamp() {
        let event = sample();
        assert!(!event.id.is_empty());
        assert_eq!(event.subject, "hook");
        assert_eq!(event.predicate, "executed");
    }

    #[test]
    fn two_events_get_distinct_ids() {
        let a = Event::new("hook", "executed", Map::new());
        let b = Event::new("hook", "executed", Map::new());
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn legacy_object_key_is_accepted() {
        let line = r#"{"subject":"hook","predicate":"executed","object":{"k":"v"}}"#;
        let event: Event = serde_json::from_str(line).expect("parse");
        assert_eq!(event.object_data.get("k"), Some(&json!("v")));
        assert!(!event.id.is_empty());

        // Writes always use the canonical key.
        let out = serde_json::to_string(&event).expect("serialize");
        assert!(out.contains("object_data"));
    }

    #[test]
    fn filters_default_paginates_at_100() {
        let filters = EventFilters::default();
        assert_eq!(filters.limit, 100);
        assert_eq!(filters.offset, 0);
        assert_eq!(filters.sort_by, "timestamp");
        assert_eq!(filters.sort_order, SortOrder::Desc);
    }

    #[test]
    fn workspace_filter_matches_exactly() {
        let event = sample();
        let mut filters = EventFilters::default();

        filters.workspace_id = Some("ws-1".to_string());
        assert!(filters.matches(&event));

        filters.workspace_id = Some("ws-2".to_string());
        assert!(!filters.matches(&event));
    }

    #[test]
    fn search_is_case_insensitive_and_reaches_object_data() {
        let event = sample();
        let mut filters = EventFilters::default();

        filters.search = Some("WRITE".to_string());
        assert!(filters.matches(&event));

        filters.search = Some("nowhere".to_string());
        assert!(!filters.matches(&event));
    }

    #[test]
    fn search_reaches_error_field() {
        let mut event = sample();
        event.error = Some("Permission denied".to_string());

        let mut filters = EventFilters::default();
        filters.search = Some("permission".to_string());
        assert!(filters.matches(&event));
    }

    #[test]
    fn time_bounds_are_inclusive() {
        let event = sample();
        let mut filters = EventFilters::default();

        filters.time_from = Some(event.timestamp);
        filters.time_to = Some(event.timestamp);
        assert!(filters.matches(&event));

        filters.time_from = Some(event.timestamp + chrono::Duration::seconds(1));
        assert!(!filters.matches(&event));
    }
}
