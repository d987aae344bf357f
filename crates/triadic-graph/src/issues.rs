//! Knowledge-management issue detection.
//!
//! After graph updates land, the stop hook scans the touched graphs for
//! quality gaps (sparse entities, low confidence, missing evidence or
//! rationale, unvalidated assumptions) and merges them into the shared
//! issue queue for a later curation pass.

use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::{KnowledgeGraph, Node};

/// Confidence below which a node is flagged.
pub const CONFIDENCE_THRESHOLD: f64 = 0.85;

/// Minimum meaningful properties before an entity counts as sparse.
pub const SPARSE_PROPERTY_THRESHOLD: usize = 3;

/// Fields that describe a node rather than its content.
const METADATA_FIELDS: [&str; 6] = [
    "created_by",
    "created_at",
    "updated_by",
    "updated_at",
    "status",
    "source",
];

/// One detected knowledge issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KmIssue {
    #[serde(rename = "type")]
    pub issue_type: String,
    pub triad: String,
    pub node_id: String,
    pub label: String,
    pub priority: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detected_at: Option<String>,
    #[serde(flatten)]
    pub detail: Map<String, Value>,
}

impl KmIssue {
    fn new(issue_type: &str, triad: &str, node: &Node, priority: &str) -> Self {
        Self {
            issue_type: issue_type.to_string(),
            triad: triad.to_string(),
            node_id: node.id.clone(),
            label: node.label.clone(),
            priority: priority.to_string(),
            detected_at: None,
            detail: Map::new(),
        }
    }

    fn with_detail(mut self, key: &str, value: Value) -> Self {
        self.detail.insert(key.to_string(), value);
        self
    }
}

fn meaningful_property_count(node: &Node) -> usize {
    if let Some(Value::Object(props)) = node.extra.get("properties") {
        return props.len();
    }
    node.extra
        .keys()
        .filter(|k| !METADATA_FIELDS.contains(&k.as_str()))
        .count()
}

/// Scan one graph for knowledge issues.
pub fn detect_issues(graph: &KnowledgeGraph, triad: &str) -> Vec<KmIssue> {
    let mut issues = Vec::new();

    for node in &graph.nodes {
        let node_type = node.node_type.to_lowercase();

        // Uncertainty nodes are allowed to be incomplete.
        if node_type == "uncertainty" {
            continue;
        }

        if matches!(node_type.as_str(), "entity" | "concept") {
            let count = meaningful_property_count(node);
            if count < SPARSE_PROPERTY_THRESHOLD {
                issues.push(
                    KmIssue::new("sparse_entity", triad, node, "medium")
                        .with_detail("property_count", Value::from(count)),
                );
            }
        }

        let confidence = node.confidence_f64().unwrap_or(1.0);
        if confidence < CONFIDENCE_THRESHOLD {
            issues.push(
                KmIssue::new("low_confidence", triad, node, "high")
                    .with_detail("confidence", Value::from(confidence)),
            );
        }

        if node.evidence.as_ref().map(|e| e.is_empty()).unwrap_or(true) {
            issues.push(KmIssue::new("missing_evidence", triad, node, "high"));
        }

        if node_type == "decision" {
            if node.extra.get("alternatives").is_none() {
                issues.push(
                    KmIssue::new("missing_alternatives", triad, node, "medium")
                        .with_detail("principle", Value::from("transparency")),
                );
            }
            if node.extra.get("rationale").is_none() {
                issues.push(
                    KmIssue::new("missing_rationale", triad, node, "medium")
                        .with_detail("principle", Value::from("transparency")),
                );
            }
        }

        if let Some(Value::Array(assumptions)) = node.extra.get("assumptions") {
            for (idx, assumption) in assumptions.iter().enumerate() {
                let Value::Object(a) = assumption else {
                    continue;
                };
                let validated = a.get("validated").and_then(Value::as_bool).unwrap_or(false);
                if !validated {
                    issues.push(
                        KmIssue::new("unvalidated_assumption", triad, node, "medium")
                            .with_detail("assumption_index", Value::from(idx))
                            .with_detail("principle", Value::from("assumption_auditing")),
                    );
                }
            }
        }
    }

    issues
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IssueQueue {
    #[serde(default)]
    issues: Vec<KmIssue>,
    #[serde(default)]
    updated_at: Option<String>,
    #[serde(default)]
    issue_count: usize,
}

/// Merge issues into the queue file, deduplicating by node id. Returns the
/// number of newly queued issues.
pub fn update_queue(queue_path: &Path, issues: &[KmIssue]) -> anyhow::Result<usize> {
    let mut queue: IssueQueue = triadic_io::load_json_or(queue_path, IssueQueue::default());

    let existing: std::collections::HashSet<String> =
        queue.issues.iter().map(|i| i.node_id.clone()).collect();

    let mut added = 0;
    for issue in issues {
        if existing.contains(&issue.node_id) {
            continue;
        }
        let mut issue = issue.clone();
        issue.detected_at = Some(Utc::now().to_rfc3339());
        queue.issues.push(issue);
        added += 1;
    }

    queue.updated_at = Some(Utc::now().to_rfc3339());
    queue.issue_count = queue.issues.len();

    triadic_io::write_json_atomic(queue_path, &queue)?;
    Ok(added)
}
