//! Pre-flight constitutional checks.
//!
//! When an agent declares a `[PRE_FLIGHT_CHECK]` block, the graph-update
//! batch in the same response is screened by a closed set of rules before
//! dispatch. Any violation rejects the whole batch. This is deliberately
//! not a DSL: the rules are enumerated in code.

use serde_json::Value;

use triadic_graph::GraphStore;

use crate::blocks::{Block, BlockKind};
use crate::graph_update::{GraphUpdate, UpdateOp};

/// One rule violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub rule: &'static str,
    pub field_path: String,
    pub message: String,
}

/// The closed rule set.
pub const RULES: [&str; 4] = [
    "confidence_bounds",
    "decision_transparency",
    "finding_evidence",
    "deprecated_guard",
];

/// Checks declared by `[PRE_FLIGHT_CHECK]` blocks. `None` means no block
/// was present (no screening); an empty or `all` declaration runs every
/// rule.
pub fn declared_checks(blocks: &[Block]) -> Option<Vec<String>> {
    let declarations: Vec<&Block> = blocks
        .iter()
        .filter(|b| b.kind == BlockKind::PreFlightCheck)
        .collect();
    if declarations.is_empty() {
        return None;
    }

    let mut checks = Vec::new();
    for block in declarations {
        match block.field("checks") {
            None => return Some(RULES.iter().map(|r| r.to_string()).collect()),
            Some(raw) => {
                for name in raw.split(',') {
                    let name = name.trim().to_string();
                    if name == "all" {
                        return Some(RULES.iter().map(|r| r.to_string()).collect());
                    }
                    if !name.is_empty() && !checks.contains(&name) {
                        checks.push(name);
                    }
                }
            }
        }
    }
    Some(checks)
}

/// Run the selected rules over a proposed update batch. Unknown rule
/// names are reported as violations; a typo must not silently skip a
/// check.
pub fn run_preflight(
    updates: &[GraphUpdate],
    store: &mut GraphStore,
    checks: &[String],
) -> Vec<Violation> {
    let mut violations = Vec::new();

    for check in checks {
        match check.as_str() {
            "confidence_bounds" => violations.extend(confidence_bounds(updates)),
            "decision_transparency" => violations.extend(decision_transparency(updates)),
            "finding_evidence" => violations.extend(finding_evidence(updates)),
            "deprecated_guard" => violations.extend(deprecated_guard(updates, store)),
            unknown => violations.push(Violation {
                rule: "unknown_check",
                field_path: "checks".to_string(),
                message: format!("unknown pre-flight check '{unknown}'"),
            }),
        }
    }

    violations
}

fn confidence_bounds(updates: &[GraphUpdate]) -> Vec<Violation> {
    let mut violations = Vec::new();
    for (i, update) in updates.iter().enumerate() {
        let confidence = match &update.op {
            UpdateOp::AddNode(node) => node.confidence_f64(),
            UpdateOp::UpdateNode { confidence, .. } => *confidence,
            _ => None,
        };
        if let Some(c) = confidence
            && !(0.0..=1.0).contains(&c)
        {
            violations.push(Violation {
                rule: "confidence_bounds",
                field_path: format!("updates[{i}].confidence"),
                message: format!("confidence {c} outside [0.0, 1.0]"),
            });
        }
    }
    violations
}

fn decision_transparency(updates: &[GraphUpdate]) -> Vec<Violation> {
    let mut violations = Vec::new();
    for (i, update) in updates.iter().enumerate() {
        let UpdateOp::AddNode(node) = &update.op else {
            continue;
        };
        if node.node_type.eq_ignore_ascii_case("decision")
            && node.extra.get("rationale").is_none()
        {
            violations.push(Violation {
                rule: "decision_transparency",
                field_path: format!("updates[{i}].rationale"),
                message: format!("decision node '{}' must carry a rationale", node.id),
            });
        }
    }
    violations
}

fn finding_evidence(updates: &[GraphUpdate]) -> Vec<Violation> {
    let mut violations = Vec::new();
    for (i, update) in updates.iter().enumerate() {
        let UpdateOp::AddNode(node) = &update.op else {
            continue;
        };
        if node.node_type.eq_ignore_ascii_case("finding")
            && node.evidence.as_ref().map(|e| e.is_empty()).unwrap_or(true)
        {
            violations.push(Violation {
                rule: "finding_evidence",
                field_path: format!("updates[{i}].evidence"),
                message: format!("finding node '{}' must cite evidence", node.id),
            });
        }
    }
    violations
}

fn deprecated_guard(updates: &[GraphUpdate], store: &mut GraphStore) -> Vec<Violation> {
    let mut violations = Vec::new();
    for (i, update) in updates.iter().enumerate() {
        let node_id = match &update.op {
            UpdateOp::UpdateNode { node_id, .. } => node_id.clone(),
            UpdateOp::AddNode(node) => node.id.clone(),
            _ => continue,
        };

        let Ok(graph) = store.load(&update.triad) else {
            continue;
        };
        let Some(existing) = graph.node(&node_id) else {
            continue;
        };
        let deprecated = existing
            .extra
            .get("deprecated")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if deprecated {
            violations.push(Violation {
                rule: "deprecated_guard",
                field_path: format!("updates[{i}].node_id"),
                message: format!("node '{node_id}' is deprecated and may not be updated"),
            });
        }
    }
    violations
}
