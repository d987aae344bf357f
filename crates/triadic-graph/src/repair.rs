//! Auto-repair for corrupted graphs.
//!
//! Repair removes what validation would reject: nodes with malformed
//! confidence or an unknown type, and edges pointing at missing nodes.
//! Out-of-range numeric confidence is clamped rather than dropped; the
//! node itself is still meaningful. Callers back up before repairing
//! (the store's check entry point does this).

use std::collections::HashSet;

use serde_json::Value;

use crate::model::{KnowledgeGraph, is_valid_node_type};

/// What a repair pass changed.
#[derive(Debug, Clone, Default)]
pub struct RepairReport {
    /// Ids of nodes that were removed.
    pub removed_nodes: Vec<String>,
    /// Number of edges removed.
    pub removed_edges: usize,
    /// Number of confidence values clamped into [0, 1].
    pub clamped_confidences: usize,
    /// Human-readable description of each repair.
    pub actions: Vec<String>,
}

impl RepairReport {
    /// Whether anything was changed.
    pub fn changed(&self) -> bool {
        !self.removed_nodes.is_empty() || self.removed_edges > 0 || self.clamped_confidences > 0
    }
}

/// Repair a graph in place and report what was done. After a successful
/// repair the graph passes [`crate::validate_graph`], except for duplicate
/// node ids, which are not auto-resolvable and are left for the caller.
pub fn repair_graph(graph: &mut KnowledgeGraph) -> RepairReport {
    let mut report = RepairReport::default();

    graph.nodes.retain(|node| {
        if !is_valid_node_type(&node.node_type) {
            report
                .actions
                .push(format!("removed node '{}' with invalid type '{}'", node.id, node.node_type));
            report.removed_nodes.push(node.id.clone());
            return false;
        }
        if let Some(raw) = &node.confidence
            && raw.as_f64().is_none()
        {
            report
                .actions
                .push(format!("removed node '{}' with malformed confidence {raw}", node.id));
            report.removed_nodes.push(node.id.clone());
            return false;
        }
        true
    });

    for node in &mut graph.nodes {
        if let Some(confidence) = node.confidence_f64()
            && !(0.0..=1.0).contains(&confidence)
        {
            let clamped = confidence.clamp(0.0, 1.0);
            node.confidence = Some(Value::from(clamped));
            report.clamped_confidences += 1;
            report
                .actions
                .push(format!("clamped confidence of '{}' from {confidence} to {clamped}", node.id));
        }
    }

    let node_ids: HashSet<String> = graph.nodes.iter().map(|n| n.id.clone()).collect();
    let before = graph.edges.len();
    graph.edges.retain(|edge| {
        let ok = node_ids.contains(&edge.source) && node_ids.contains(&edge.target);
        if !ok {
            report.actions.push(format!(
                "removed edge '{}' -> '{}' with missing endpoint",
                edge.source, edge.target
            ));
        }
        ok
    });
    report.removed_edges = before - graph.edges.len();

    report
}
