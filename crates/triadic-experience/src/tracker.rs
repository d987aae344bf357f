//! Session-scoped injection tracking and outcome detection.
//!
//! The pre-tool hook records every lesson it injected; at session end the
//! stop hook scans the assistant's final response for outcome signals and
//! feeds the resulting confidence updates back into the graphs.
//!
//! Outcome detection is heuristic, and two ambiguous cases are resolved
//! by rule rather than guesswork:
//!
//! - A lesson label appearing near a correction phrase counts as a
//!   contradiction even if the text only quotes the lesson while
//!   rejecting something else. False contradictions cost one 0.40
//!   multiplier and are recoverable; missed ones are not.
//! - A success immediately followed by a revert is still recorded as a
//!   success. The revert shows up as a failure signal in the next
//!   session and corrects the score then.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use triadic_graph::GraphStore;

use crate::confidence::{Outcome, check_deprecation, update_confidence};

/// Default state file name
pub const STATE_FILE: &str = "experience_state.json";

/// Phrases that signal a human pushing back on injected guidance.
const CORRECTION_PHRASES: [&str; 5] = [
    "that's wrong",
    "that's not right",
    "don't do that",
    "actually, no",
    "incorrect",
];

/// Characters of surrounding text in which a correction phrase counts as
/// aimed at a lesson label.
const CORRECTION_WINDOW: usize = 200;

/// Get the experience state file path for a state directory
pub fn state_path(state_dir: &Path) -> PathBuf {
    state_dir.join(STATE_FILE)
}

/// One injected lesson in the current session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectionRecord {
    pub lesson_id: String,
    pub lesson_label: String,
    pub tool_name: String,
    pub timestamp: DateTime<Utc>,
    /// Filled in at session end.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TrackerState {
    #[serde(default)]
    injections: Vec<InjectionRecord>,
}

/// A detected outcome for one injected lesson.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutcomeDetection {
    pub lesson_id: String,
    pub outcome: Outcome,
}

/// Tracks injections in a per-session state file and applies confidence
/// updates at session end.
#[derive(Debug)]
pub struct ExperienceTracker {
    path: PathBuf,
    state: TrackerState,
}

impl ExperienceTracker {
    /// Load (or start) the tracker state under the given state directory.
    pub fn new(state_dir: &Path) -> Self {
        let path = state_path(state_dir);
        let state = triadic_io::load_json_or(&path, TrackerState::default());
        Self { path, state }
    }

    /// Lessons injected so far this session.
    pub fn injections(&self) -> &[InjectionRecord] {
        &self.state.injections
    }

    /// Record an injection and persist the state atomically.
    pub fn record_injection(&mut self, lesson_id: &str, lesson_label: &str, tool_name: &str) {
        self.state.injections.push(InjectionRecord {
            lesson_id: lesson_id.to_string(),
            lesson_label: lesson_label.to_string(),
            tool_name: tool_name.to_string(),
            timestamp: Utc::now(),
            outcome: None,
        });
        if !triadic_io::save_json(&self.path, &self.state) {
            warn!(path = %self.path.display(), "failed to persist injection record");
        }
    }

    /// Scan the final response text for outcome signals, one per recorded
    /// injection: explicit contradiction blocks, correction phrases near
    /// the lesson label, else success.
    pub fn detect_outcomes(&self, response_text: &str) -> Vec<OutcomeDetection> {
        let lowered = response_text.to_lowercase();
        let knowledge_blocks = contradiction_blocks(&lowered);

        self.state
            .injections
            .iter()
            .map(|record| {
                let label = record.lesson_label.to_lowercase();
                let id = record.lesson_id.to_lowercase();

                let contradicted_in_block = knowledge_blocks
                    .iter()
                    .any(|block| block.contains(&label) || block.contains(&id));

                let outcome = if contradicted_in_block {
                    Outcome::Contradiction
                } else if correction_near_label(&lowered, &label) {
                    Outcome::Contradiction
                } else {
                    // Injected, followed, and not pushed back on.
                    Outcome::Success
                };

                OutcomeDetection {
                    lesson_id: record.lesson_id.clone(),
                    outcome,
                }
            })
            .collect()
    }

    /// Apply detected outcomes to the backing graphs: update confidence
    /// and outcome counts, flag deprecation, persist each touched graph.
    /// Returns the number of nodes updated.
    pub fn apply_outcomes(
        &mut self,
        store: &mut GraphStore,
        outcomes: &[OutcomeDetection],
    ) -> anyhow::Result<usize> {
        let triads = store.list_triads()?;
        let mut updated = 0;

        for triad in triads {
            let mut graph = store.load(&triad)?;
            let mut touched = false;

            for detection in outcomes {
                let Some(node) = graph.node_mut(&detection.lesson_id) else {
                    continue;
                };

                let current = node.confidence_f64().unwrap_or(0.5);
                let next = update_confidence(current, detection.outcome);
                node.confidence = Some(Value::from(next));

                let counter = match detection.outcome {
                    Outcome::Success | Outcome::Confirmation => "success_count",
                    Outcome::Failure => "failure_count",
                    Outcome::Contradiction => "contradiction_count",
                };
                let count = node.extra.get(counter).and_then(Value::as_u64).unwrap_or(0);
                node.extra.insert(counter.to_string(), Value::from(count + 1));

                let failures = node
                    .extra
                    .get("failure_count")
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                let successes = node
                    .extra
                    .get("success_count")
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                let contradictions = node
                    .extra
                    .get("contradiction_count")
                    .and_then(Value::as_u64)
                    .unwrap_or(0);

                if check_deprecation(next, failures, successes, contradictions) {
                    node.extra.insert("deprecated".to_string(), Value::from(true));
                }

                touched = true;
                updated += 1;
            }

            if touched {
                store.save(&triad, &graph)?;
            }
        }

        for record in &mut self.state.injections {
            if let Some(detection) = outcomes.iter().find(|d| d.lesson_id == record.lesson_id) {
                record.outcome = Some(detection.outcome.as_str().to_string());
            }
        }
        if !triadic_io::save_json(&self.path, &self.state) {
            warn!(path = %self.path.display(), "failed to persist outcomes");
        }

        Ok(updated)
    }

    /// Drop the session state file (called when a session fully concludes).
    pub fn clear(&mut self) {
        self.state = TrackerState::default();
        if self.path.exists()
            && let Err(err) = std::fs::remove_file(&self.path)
        {
            warn!(path = %self.path.display(), %err, "failed to clear tracker state");
        }
    }
}

/// Bodies of `[PROCESS_KNOWLEDGE]` blocks that declare a contradiction.
fn contradiction_blocks(lowered_text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let open = "[process_knowledge]";
    let close = "[/process_knowledge]";

    let mut rest = lowered_text;
    while let Some(start) = rest.find(open) {
        let after = &rest[start + open.len()..];
        let Some(end) = after.find(close) else {
            break;
        };
        let body = &after[..end];
        if body.contains("contradiction") || body.contains("contradicts") {
            blocks.push(body.to_string());
        }
        rest = &after[end + close.len()..];
    }
    blocks
}

/// Whether a correction phrase occurs within [`CORRECTION_WINDOW`] chars
/// of the lesson label.
fn correction_near_label(lowered_text: &str, label: &str) -> bool {
    if label.is_empty() {
        return false;
    }
    let mut search_from = 0;
    while let Some(pos) = lowered_text[search_from..].find(label) {
        let at = search_from + pos;
        let window_start = floor_char_boundary(lowered_text, at.saturating_sub(CORRECTION_WINDOW));
        let window_end = ceil_char_boundary(
            lowered_text,
            (at + label.len() + CORRECTION_WINDOW).min(lowered_text.len()),
        );
        let window = &lowered_text[window_start..window_end];
        if CORRECTION_PHRASES.iter().any(|p| window.contains(p)) {
            return true;
        }
        search_from = at + label.len();
        if search_from >= lowered_text.len() {
            break;
        }
    }
    false
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;

    use triadic_graph::{KnowledgeGraph, Node};

    use super::*;

    fn tracker_with_injection(dir: &Path) -> ExperienceTracker {
        let mut tracker = ExperienceTracker::new(dir);
        tracker.record_injection("version_bump", "Version bump checklist", "Write");
        tracker
    }

    #[test]
    fn record_injection_persists_state() {
        let td = tempdir().expect("tempdir");
        tracker_with_injection(td.path());

        // A fresh tracker over the same directory sees the record.
        let reloaded = ExperienceTracker::new(td.path());
        assert_eq!(reloaded.injections().len(), 1);
        assert_eq!(reloaded.injections()[0].lesson_id, "version_bump");
    }

    #[test]
    fn quiet_response_counts_as_success() {
        let td = tempdir().expect("tempdir");
        let tracker = tracker_with_injection(td.path());

        let outcomes = tracker.detect_outcomes("Updated the files as requested.");
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].outcome, Outcome::Success);
    }

    #[test]
    fn contradiction_block_citing_lesson_is_detected() {
        let td = tempdir().expect("tempdir");
        let tracker = tracker_with_injection(td.path());

        let response = "Done.\n[PROCESS_KNOWLEDGE]\nlabel: Version bump checklist\n\
                        note: user says this contradicts current practice\n[/PROCESS_KNOWLEDGE]";
        let outcomes = tracker.detect_outcomes(response);
        assert_eq!(outcomes[0].outcome, Outcome::Contradiction);
    }

    #[test]
    fn correction_phrase_near_label_is_contradiction() {
        let td = tempdir().expect("tempdir");
        let tracker = tracker_with_injection(td.path());

        let response =
            "About the Version bump checklist: actually, no, we moved that to CI last month.";
        let outcomes = tracker.detect_outcomes(response);
        assert_eq!(outcomes[0].outcome, Outcome::Contradiction);
    }

    #[test]
    fn correction_phrase_far_from_label_is_not_contradiction() {
        let td = tempdir().expect("tempdir");
        let tracker = tracker_with_injection(td.path());

        let filler = "x".repeat(500);
        let response =
            format!("Version bump checklist applied. {filler} Actually, no, the other thing.");
        let outcomes = tracker.detect_outcomes(&response);
        assert_eq!(outcomes[0].outcome, Outcome::Success);
    }

    #[test]
    fn apply_outcomes_updates_graph_confidence_and_counts() {
        let td = tempdir().expect("tempdir");
        let graphs_dir = td.path().join("graphs");
        let mut store = GraphStore::new(&graphs_dir);

        let mut graph = KnowledgeGraph::default();
        let mut node = Node::new("version_bump", "Version bump checklist", "concept")
            .with_confidence(0.80);
        node.extra.insert("process_type".to_string(), json!("checklist"));
        graph.nodes.push(node);
        store.save("deployment", &graph).expect("save");

        let mut tracker = tracker_with_injection(td.path());
        let outcomes = vec![OutcomeDetection {
            lesson_id: "version_bump".to_string(),
            outcome: Outcome::Success,
        }];

        let updated = tracker.apply_outcomes(&mut store, &outcomes).expect("apply");
        assert_eq!(updated, 1);

        store.refresh();
        let graph = store.load("deployment").expect("load");
        let node = graph.node("version_bump").expect("node");
        assert!((node.confidence_f64().expect("confidence") - 0.92).abs() < 1e-9);
        assert_eq!(node.extra.get("success_count"), Some(&json!(1)));

        // The injection record carries the outcome now.
        assert_eq!(
            tracker.injections()[0].outcome.as_deref(),
            Some("success")
        );
    }

    #[test]
    fn repeated_contradictions_deprecate_the_lesson() {
        let td = tempdir().expect("tempdir");
        let graphs_dir = td.path().join("graphs");
        let mut store = GraphStore::new(&graphs_dir);

        let mut graph = KnowledgeGraph::default();
        let mut node = Node::new("shaky", "Shaky lesson", "concept").with_confidence(0.80);
        node.extra.insert("contradiction_count".to_string(), json!(1));
        graph.nodes.push(node);
        store.save("design", &graph).expect("save");

        let mut tracker = ExperienceTracker::new(td.path());
        tracker.record_injection("shaky", "Shaky lesson", "Write");

        let outcomes = vec![OutcomeDetection {
            lesson_id: "shaky".to_string(),
            outcome: Outcome::Contradiction,
        }];
        tracker.apply_outcomes(&mut store, &outcomes).expect("apply");

        store.refresh();
        let graph = store.load("design").expect("load");
        let node = graph.node("shaky").expect("node");
        assert_eq!(node.extra.get("deprecated"), Some(&json!(true)));
        assert_eq!(node.extra.get("contradiction_count"), Some(&json!(2)));
    }

    #[test]
    fn clear_removes_state_file() {
        let td = tempdir().expect("tempdir");
        let mut tracker = tracker_with_injection(td.path());
        assert!(state_path(td.path()).exists());

        tracker.clear();
        assert!(!state_path(td.path()).exists());
        assert!(tracker.injections().is_empty());
    }
}
