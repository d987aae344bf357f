//! `[PROCESS_KNOWLEDGE]` blocks: lessons agents want remembered.
//!
//! Each block upserts a process-knowledge node into its triad's graph.
//! Initial confidence comes from the evidence source; an existing lesson
//! keeps its confidence and counts, only refreshing content and triggers.

use serde_json::Value;

use triadic_experience::{Source, assign_status, initial_confidence};
use triadic_graph::{GraphStore, Node};

use crate::blocks::{Block, BlockKind};
use crate::graph_update::resolve_triad;
use crate::report::HandlerReport;

/// Handler for `[PROCESS_KNOWLEDGE]` blocks.
pub struct ProcessKnowledgeHandler;

impl ProcessKnowledgeHandler {
    /// Upsert every lesson block into its triad graph.
    pub fn apply(store: &mut GraphStore, blocks: &[Block]) -> HandlerReport {
        let lessons: Vec<&Block> = blocks
            .iter()
            .filter(|b| b.kind == BlockKind::ProcessKnowledge)
            .collect();
        let mut report = HandlerReport::for_count(lessons.len());

        for block in lessons {
            match Self::apply_one(store, block) {
                Ok(()) => report.record_applied(),
                Err(reason) => report.record_error(reason),
            }
        }
        report
    }

    fn apply_one(store: &mut GraphStore, block: &Block) -> Result<(), String> {
        let triad = resolve_triad(block)?;
        let label = block.field("label").ok_or("missing label")?;
        let node_id = block
            .field("node_id")
            .map(String::from)
            .unwrap_or_else(|| slugify(label));

        let process_type = block.field("process_type").unwrap_or("pattern");
        let priority = block.field("priority").unwrap_or("MEDIUM").to_uppercase();
        let source = block.field("source").and_then(Source::parse);
        let repetition_count = block
            .field("repetition_count")
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(1);
        let conflicting = block
            .field("conflicting_evidence")
            .map(|v| v == "true")
            .unwrap_or(false);

        let confidence = initial_confidence(source, &priority, repetition_count, conflicting);
        let status = assign_status(confidence, &priority);

        let mut graph = store
            .load(&triad)
            .map_err(|e| format!("failed to load graph '{triad}': {e:#}"))?;

        if let Some(existing) = graph.node_mut(&node_id) {
            // Refresh the lesson text and triggers; outcomes own the score.
            existing.label = label.to_string();
            if let Some(content) = block.field("content").or(block.field("description")) {
                existing.content = Some(content.to_string());
            }
            existing
                .extra
                .insert("priority".to_string(), Value::from(priority.clone()));
            if let Some(triggers) = trigger_conditions(block) {
                existing.extra.insert("trigger_conditions".to_string(), triggers);
            }
        } else {
            let mut node = Node::new(&node_id, label, "concept").with_confidence(confidence);
            node.content = block
                .field("content")
                .or(block.field("description"))
                .map(String::from);
            node.extra
                .insert("process_type".to_string(), Value::from(process_type));
            node.extra
                .insert("priority".to_string(), Value::from(priority.clone()));
            node.extra.insert("status".to_string(), Value::from(status));
            if let Some(source_raw) = block.field("source") {
                node.extra.insert("source".to_string(), Value::from(source_raw));
            }
            node.extra.insert("success_count".to_string(), Value::from(0));
            node.extra.insert("failure_count".to_string(), Value::from(0));
            node.extra
                .insert("contradiction_count".to_string(), Value::from(0));
            node.extra.insert(
                "needs_validation".to_string(),
                Value::from(status == "needs_validation"),
            );
            if let Some(triggers) = trigger_conditions(block) {
                node.extra.insert("trigger_conditions".to_string(), triggers);
            }
            graph.nodes.push(node);
        }

        store
            .save(&triad, &graph)
            .map_err(|e| format!("failed to save graph '{triad}': {e:#}"))
    }
}

fn trigger_conditions(block: &Block) -> Option<Value> {
    let list = |key: &str| -> Vec<String> {
        block
            .field(key)
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    };

    let tool_names = list("tool_names");
    let file_patterns = list("file_patterns");
    let action_keywords = list("action_keywords");
    let context_keywords = list("context_keywords");

    if tool_names.is_empty()
        && file_patterns.is_empty()
        && action_keywords.is_empty()
        && context_keywords.is_empty()
    {
        return None;
    }

    Some(serde_json::json!({
        "tool_names": tool_names,
        "file_patterns": file_patterns,
        "action_keywords": action_keywords,
        "context_keywords": context_keywords,
    }))
}

fn slugify(label: &str) -> String {
    label
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use crate::blocks::parse_blocks;

    use super::*;

    fn store() -> (tempfile::TempDir, GraphStore) {
        let td = tempdir().expect("tempdir");
        let store = GraphStore::new(td.path());
        (td, store)
    }

    #[test]
    fn lesson_is_added_with_initial_confidence() {
        let (_td, mut store) = store();
        let text = "[PROCESS_KNOWLEDGE]\n\
                    triad: deployment\n\
                    label: Version bump checklist\n\
                    process_type: checklist\n\
                    priority: CRITICAL\n\
                    source: user_correction\n\
                    tool_names: Write, Edit\n\
                    file_patterns: **/plugin.json\n\
                    content: update every version field together\n\
                    [/PROCESS_KNOWLEDGE]";

        let report = ProcessKnowledgeHandler::apply(&mut store, &parse_blocks(text));
        assert!(report.success);
        assert_eq!(report.applied, 1);

        let graph = store.load("deployment").expect("load");
        let node = graph.node("version_bump_checklist").expect("node");
        // user_correction at CRITICAL hits the 0.95 cap.
        assert_eq!(node.confidence_f64(), Some(0.95));
        assert_eq!(node.extra.get("priority"), Some(&Value::from("CRITICAL")));
        assert_eq!(node.extra.get("status"), Some(&Value::from("active")));

        let triggers = node
            .extra
            .get("trigger_conditions")
            .and_then(Value::as_object)
            .expect("triggers");
        assert_eq!(
            triggers.get("tool_names"),
            Some(&serde_json::json!(["Write", "Edit"]))
        );
    }

    #[test]
    fn weak_source_needs_validation() {
        let (_td, mut store) = store();
        let text = "[PROCESS_KNOWLEDGE]\ntriad: design\nlabel: Maybe helpful\n\
                    source: suggestion\n[/PROCESS_KNOWLEDGE]";

        ProcessKnowledgeHandler::apply(&mut store, &parse_blocks(text));

        let graph = store.load("design").expect("load");
        let node = graph.node("maybe_helpful").expect("node");
        assert_eq!(node.confidence_f64(), Some(0.50));
        assert_eq!(node.extra.get("status"), Some(&Value::from("needs_validation")));
        assert_eq!(node.extra.get("needs_validation"), Some(&Value::from(true)));
    }

    #[test]
    fn missing_label_is_a_per_block_failure() {
        let (_td, mut store) = store();
        let text = "[PROCESS_KNOWLEDGE]\ntriad: design\nsource: suggestion\n[/PROCESS_KNOWLEDGE]\n\
                    [PROCESS_KNOWLEDGE]\ntriad: design\nlabel: Works\n[/PROCESS_KNOWLEDGE]";

        let report = ProcessKnowledgeHandler::apply(&mut store, &parse_blocks(text));
        assert_eq!(report.count, 2);
        assert_eq!(report.applied, 1);
        assert!(report.errors[0].reason.contains("missing label"));
    }

    #[test]
    fn existing_lesson_keeps_confidence_and_counts() {
        let (_td, mut store) = store();
        let first = "[PROCESS_KNOWLEDGE]\ntriad: design\nnode_id: lesson\nlabel: Old label\n\
                     source: user_correction\n[/PROCESS_KNOWLEDGE]";
        ProcessKnowledgeHandler::apply(&mut store, &parse_blocks(first));

        // Simulate an earned success count before the next upsert.
        let mut graph = store.load("design").expect("load");
        graph
            .node_mut("lesson")
            .expect("node")
            .extra
            .insert("success_count".to_string(), Value::from(3));
        store.save("design", &graph).expect("save");

        let second = "[PROCESS_KNOWLEDGE]\ntriad: design\nnode_id: lesson\nlabel: New label\n\
                      source: suggestion\ncontent: refreshed\n[/PROCESS_KNOWLEDGE]";
        ProcessKnowledgeHandler::apply(&mut store, &parse_blocks(second));

        store.refresh();
        let graph = store.load("design").expect("load");
        let node = graph.node("lesson").expect("node");
        assert_eq!(node.label, "New label");
        assert_eq!(node.content.as_deref(), Some("refreshed"));
        // Confidence unchanged by the re-assertion; counts preserved.
        assert_eq!(node.confidence_f64(), Some(0.95));
        assert_eq!(node.extra.get("success_count"), Some(&Value::from(3)));
    }

    #[test]
    fn slugify_builds_stable_ids() {
        assert_eq!(slugify("Version bump checklist"), "version_bump_checklist");
        assert_eq!(slugify("Don't re-use IDs!"), "don_t_re_use_ids");
    }
}
