//! `[GRAPH_UPDATE]` parsing and application.
//!
//! Triad routing: an explicit `triad:` field wins; otherwise the block's
//! `agent:` field is resolved through the published [`agent_triads`]
//! mapping. A block with neither is a per-block failure, never a guess.

use std::collections::BTreeMap;

use serde_json::Value;

use triadic_graph::{Edge, GraphStore, KnowledgeGraph, Node, validate_graph};

use crate::blocks::{Block, BlockKind};
use crate::report::HandlerReport;

/// Published agent-to-triad mapping. Agents not listed here must carry an
/// explicit `triad:` field in their blocks.
pub fn agent_triads() -> &'static [(&'static str, &'static str)] {
    &[
        ("idea-generator", "idea-validation"),
        ("feasibility-analyst", "idea-validation"),
        ("scope-guardian", "idea-validation"),
        ("solution-architect", "design"),
        ("interface-designer", "design"),
        ("design-reviewer", "design"),
        ("implementation-engineer", "implementation"),
        ("test-engineer", "implementation"),
        ("integration-specialist", "implementation"),
        ("refactoring-specialist", "garden-tending"),
        ("doc-curator", "garden-tending"),
        ("debt-auditor", "garden-tending"),
        ("release-manager", "deployment"),
        ("deploy-validator", "deployment"),
        ("post-deploy-monitor", "deployment"),
    ]
}

/// Resolve a block to its target triad.
pub fn resolve_triad(block: &Block) -> Result<String, String> {
    if let Some(triad) = block.field("triad") {
        if triadic_graph::is_valid_triad_name(triad) {
            return Ok(triad.to_string());
        }
        return Err(format!("invalid triad name '{triad}'"));
    }

    if let Some(agent) = block.field("agent") {
        if let Some((_, triad)) = agent_triads().iter().find(|(a, _)| *a == agent) {
            return Ok(triad.to_string());
        }
        return Err(format!("unknown agent '{agent}' and no explicit triad field"));
    }

    Err("missing triad (provide a triad or a known agent field)".to_string())
}

/// One parsed graph mutation.
#[derive(Debug, Clone)]
pub struct GraphUpdate {
    pub triad: String,
    pub op: UpdateOp,
}

/// The mutation kinds a block may carry.
#[derive(Debug, Clone)]
pub enum UpdateOp {
    AddNode(Node),
    UpdateNode {
        node_id: String,
        label: Option<String>,
        description: Option<String>,
        confidence: Option<f64>,
    },
    AddEdge(Edge),
    UpdateEdge(Edge),
}

/// Block fields consumed by the structured parse; everything else is
/// carried onto the node as extra properties.
const KNOWN_FIELDS: [&str; 13] = [
    "triad",
    "agent",
    "operation",
    "node_id",
    "label",
    "type",
    "description",
    "content",
    "confidence",
    "evidence",
    "source",
    "target",
    "relationship",
];

/// Parse one `[GRAPH_UPDATE]` block into a mutation.
pub fn parse_graph_update(block: &Block) -> Result<GraphUpdate, String> {
    let triad = resolve_triad(block)?;
    let operation = block.field("operation").unwrap_or("add_node");

    let op = match operation {
        "add_node" => UpdateOp::AddNode(parse_node(block)?),
        "update_node" => {
            let node_id = block.field("node_id").ok_or("missing node_id")?;
            UpdateOp::UpdateNode {
                node_id: node_id.to_string(),
                label: block.field("label").map(String::from),
                description: block.field("description").map(String::from),
                confidence: parse_confidence(block)?,
            }
        }
        "add_edge" => UpdateOp::AddEdge(parse_edge(block)?),
        "update_edge" => UpdateOp::UpdateEdge(parse_edge(block)?),
        other => return Err(format!("unknown operation '{other}'")),
    };

    Ok(GraphUpdate { triad, op })
}

fn parse_confidence(block: &Block) -> Result<Option<f64>, String> {
    match block.field("confidence") {
        None => Ok(None),
        Some(raw) => raw
            .parse::<f64>()
            .map(Some)
            .map_err(|_| format!("invalid confidence '{raw}'")),
    }
}

fn parse_node(block: &Block) -> Result<Node, String> {
    let node_id = block.field("node_id").ok_or("missing node_id")?;
    let label = block.field("label").unwrap_or(node_id);
    let node_type = block.field("type").unwrap_or("concept");

    let mut node = Node::new(node_id, label, node_type);
    if let Some(confidence) = parse_confidence(block)? {
        node.confidence = Some(Value::from(confidence));
    }
    node.description = block.field("description").map(String::from);
    node.content = block.field("content").map(String::from);
    if let Some(evidence) = block.field("evidence") {
        node.evidence = Some(
            evidence
                .lines()
                .map(|l| Value::from(l.trim()))
                .filter(|v| v.as_str().map(|s| !s.is_empty()).unwrap_or(false))
                .collect(),
        );
    }

    // Unrecognized fields ride along as node properties (rationale,
    // alternatives, process fields, ...).
    for (key, value) in &block.fields {
        if !KNOWN_FIELDS.contains(&key.as_str()) {
            node.extra.insert(key.clone(), Value::from(value.clone()));
        }
    }

    Ok(node)
}

fn parse_edge(block: &Block) -> Result<Edge, String> {
    let source = block.field("source").ok_or("missing source")?;
    let target = block.field("target").ok_or("missing target")?;
    let relationship = block.field("relationship").unwrap_or("relates_to");
    Ok(Edge::new(source, target, relationship))
}

/// Parse every `[GRAPH_UPDATE]` block, splitting successes from per-block
/// failures.
pub fn parse_all(blocks: &[Block]) -> (Vec<GraphUpdate>, Vec<String>) {
    let mut updates = Vec::new();
    let mut errors = Vec::new();

    for block in blocks.iter().filter(|b| b.kind == BlockKind::GraphUpdate) {
        match parse_graph_update(block) {
            Ok(update) => updates.push(update),
            Err(reason) => errors.push(reason),
        }
    }
    (updates, errors)
}

/// Apply one mutation to a working graph. The graph is only mutated when
/// the result still validates.
fn apply_one(graph: &mut KnowledgeGraph, op: &UpdateOp) -> Result<(), String> {
    let mut candidate = graph.clone();

    match op {
        UpdateOp::AddNode(node) => {
            if let Some(existing) = candidate.node_mut(&node.id) {
                // Same id twice is an update of everything the block set.
                existing.label = node.label.clone();
                existing.node_type = node.node_type.clone();
                if node.confidence.is_some() {
                    existing.confidence = node.confidence.clone();
                }
                if node.description.is_some() {
                    existing.description = node.description.clone();
                }
                if node.content.is_some() {
                    existing.content = node.content.clone();
                }
                if node.evidence.is_some() {
                    existing.evidence = node.evidence.clone();
                }
                for (k, v) in &node.extra {
                    existing.extra.insert(k.clone(), v.clone());
                }
            } else {
                candidate.nodes.push(node.clone());
            }
        }
        UpdateOp::UpdateNode {
            node_id,
            label,
            description,
            confidence,
        } => {
            let Some(node) = candidate.node_mut(node_id) else {
                return Err(format!("node '{node_id}' not found"));
            };
            if let Some(label) = label {
                node.label = label.clone();
            }
            if let Some(description) = description {
                node.description = Some(description.clone());
            }
            if let Some(confidence) = confidence {
                node.confidence = Some(Value::from(*confidence));
            }
        }
        UpdateOp::AddEdge(edge) => {
            candidate.edges.push(edge.clone());
        }
        UpdateOp::UpdateEdge(edge) => {
            let Some(existing) = candidate
                .edges
                .iter_mut()
                .find(|e| e.source == edge.source && e.target == edge.target)
            else {
                return Err(format!(
                    "edge '{}' -> '{}' not found",
                    edge.source, edge.target
                ));
            };
            existing.relationship = edge.relationship.clone();
        }
    }

    validate_graph(&candidate).map_err(|e| e.to_string())?;
    *graph = candidate;
    Ok(())
}

/// Handler for `[GRAPH_UPDATE]` blocks.
pub struct GraphUpdateHandler;

impl GraphUpdateHandler {
    /// Apply parsed updates grouped by triad. Each update is validated
    /// individually; a failing update is reported and skipped while the
    /// rest of its batch proceeds. Saves go through the full C3 protocol.
    pub fn apply(
        store: &mut GraphStore,
        updates: &[GraphUpdate],
        parse_errors: &[String],
    ) -> HandlerReport {
        let mut report = HandlerReport::for_count(updates.len() + parse_errors.len());
        for reason in parse_errors {
            report.record_error(reason.clone());
        }

        let mut by_triad: BTreeMap<&str, Vec<&GraphUpdate>> = BTreeMap::new();
        for update in updates {
            by_triad.entry(update.triad.as_str()).or_default().push(update);
        }

        for (triad, batch) in by_triad {
            let mut graph = match store.load(triad) {
                Ok(graph) => graph,
                Err(err) => {
                    for _ in &batch {
                        report.record_error(format!("failed to load graph '{triad}': {err:#}"));
                    }
                    continue;
                }
            };

            let mut applied_here = 0;
            for update in &batch {
                match apply_one(&mut graph, &update.op) {
                    Ok(()) => {
                        applied_here += 1;
                        report.record_applied();
                    }
                    Err(reason) => report.record_error(reason),
                }
            }

            if applied_here > 0
                && let Err(err) = store.save(triad, &graph)
            {
                // The whole batch failed to persist; walk the count back.
                report.applied -= applied_here;
                for _ in 0..applied_here {
                    report.record_error(format!("failed to save graph '{triad}': {err:#}"));
                }
            }
        }

        report
    }
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

    fn process(store: &mut GraphStore, text: &str) -> HandlerReport {
        let blocks = parse_blocks(text);
        let (updates, errors) = parse_all(&blocks);
        GraphUpdateHandler::apply(store, &updates, &errors)
    }

    #[test]
    fn explicit_triad_field_wins() {
        let block = &parse_blocks("[GRAPH_UPDATE]\ntriad: design\nagent: release-manager\nnode_id: n\n[/GRAPH_UPDATE]")[0];
        assert_eq!(resolve_triad(block).expect("triad"), "design");
    }

    #[test]
    fn agent_mapping_routes_when_triad_absent() {
        let block = &parse_blocks("[GRAPH_UPDATE]\nagent: solution-architect\nnode_id: n\n[/GRAPH_UPDATE]")[0];
        assert_eq!(resolve_triad(block).expect("triad"), "design");
    }

    #[test]
    fn unroutable_block_is_an_error() {
        let block = &parse_blocks("[GRAPH_UPDATE]\nnode_id: n\n[/GRAPH_UPDATE]")[0];
        assert!(resolve_triad(block).is_err());

        let block = &parse_blocks("[GRAPH_UPDATE]\nagent: mystery-agent\nnode_id: n\n[/GRAPH_UPDATE]")[0];
        assert!(resolve_triad(block).unwrap_err().contains("mystery-agent"));
    }

    #[test]
    fn add_node_lands_in_graph() {
        let (_td, mut store) = store();
        let report = process(
            &mut store,
            "[GRAPH_UPDATE]\ntriad: design\nnode_id: auth\nlabel: Auth decision\n\
             type: decision\nconfidence: 0.9\nrationale: fewest moving parts\n[/GRAPH_UPDATE]",
        );
        assert!(report.success);
        assert_eq!(report.applied, 1);

        let graph = store.load("design").expect("load");
        let node = graph.node("auth").expect("node");
        assert_eq!(node.label, "Auth decision");
        assert_eq!(node.confidence_f64(), Some(0.9));
        assert_eq!(
            node.extra.get("rationale"),
            Some(&Value::from("fewest moving parts"))
        );
    }

    #[test]
    fn multiline_description_with_missing_node_id_matches_batch_contract() {
        let (_td, mut store) = store();
        let text = "[GRAPH_UPDATE]\n\
                    triad: design\n\
                    node_id: keeper\n\
                    description: |\n\
                    | line one\n\
                    | line two\n\
                    | line three\n\
                    [/GRAPH_UPDATE]\n\
                    [GRAPH_UPDATE]\n\
                    triad: design\n\
                    label: No id here\n\
                    [/GRAPH_UPDATE]";

        let report = process(&mut store, text);
        assert_eq!(report.count, 2);
        assert_eq!(report.applied, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].reason.contains("missing node_id"));

        let graph = store.load("design").expect("load");
        assert_eq!(graph.nodes.len(), 1);
        assert_eq!(
            graph.node("keeper").expect("node").description.as_deref(),
            Some("line one\nline two\nline three")
        );
    }

    #[test]
    fn update_node_changes_fields_in_place() {
        let (_td, mut store) = store();
        process(
            &mut store,
            "[GRAPH_UPDATE]\ntriad: design\nnode_id: n\nlabel: Old\nconfidence: 0.5\n[/GRAPH_UPDATE]",
        );
        let report = process(
            &mut store,
            "[GRAPH_UPDATE]\ntriad: design\noperation: update_node\nnode_id: n\n\
             label: New\nconfidence: 0.8\n[/GRAPH_UPDATE]",
        );
        assert!(report.success);

        store.refresh();
        let graph = store.load("design").expect("load");
        let node = graph.node("n").expect("node");
        assert_eq!(node.label, "New");
        assert_eq!(node.confidence_f64(), Some(0.8));
    }

    #[test]
    fn update_of_missing_node_is_reported() {
        let (_td, mut store) = store();
        let report = process(
            &mut store,
            "[GRAPH_UPDATE]\ntriad: design\noperation: update_node\nnode_id: ghost\n[/GRAPH_UPDATE]",
        );
        assert!(!report.success);
        assert!(report.errors[0].reason.contains("not found"));
    }

    #[test]
    fn add_edge_requires_existing_endpoints() {
        let (_td, mut store) = store();
        process(&mut store, "[GRAPH_UPDATE]\ntriad: design\nnode_id: a\n[/GRAPH_UPDATE]");

        // Edge to a missing node fails validation and is skipped.
        let report = process(
            &mut store,
            "[GRAPH_UPDATE]\ntriad: design\noperation: add_edge\nsource: a\ntarget: ghost\n[/GRAPH_UPDATE]",
        );
        assert!(!report.success);

        store.refresh();
        assert!(store.load("design").expect("load").edges.is_empty());
    }

    #[test]
    fn add_edge_between_existing_nodes_succeeds() {
        let (_td, mut store) = store();
        process(
            &mut store,
            "[GRAPH_UPDATE]\ntriad: design\nnode_id: a\n[/GRAPH_UPDATE]\n\
             [GRAPH_UPDATE]\ntriad: design\nnode_id: b\n[/GRAPH_UPDATE]\n\
             [GRAPH_UPDATE]\ntriad: design\noperation: add_edge\nsource: a\ntarget: b\n\
             relationship: supports\n[/GRAPH_UPDATE]",
        );

        store.refresh();
        let graph = store.load("design").expect("load");
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.edges[0].relationship.as_deref(), Some("supports"));
    }

    #[test]
    fn invalid_confidence_string_is_a_parse_error() {
        let (_td, mut store) = store();
        let report = process(
            &mut store,
            "[GRAPH_UPDATE]\ntriad: design\nnode_id: n\nconfidence: very high\n[/GRAPH_UPDATE]",
        );
        assert!(!report.success);
        assert!(report.errors[0].reason.contains("invalid confidence"));
    }

    #[test]
    fn updates_route_to_separate_triads() {
        let (_td, mut store) = store();
        let report = process(
            &mut store,
            "[GRAPH_UPDATE]\ntriad: design\nnode_id: d1\n[/GRAPH_UPDATE]\n\
             [GRAPH_UPDATE]\nagent: test-engineer\nnode_id: i1\n[/GRAPH_UPDATE]",
        );
        assert_eq!(report.applied, 2);

        assert!(store.load("design").expect("load").node("d1").is_some());
        assert!(store.load("implementation").expect("load").node("i1").is_some());
    }
}
