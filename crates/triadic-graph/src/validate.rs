//! Schema validation for knowledge graphs.
//!
//! Rules, in order: every node needs a non-empty id, label, and a type
//! from the closed set; confidence, when present, must be numeric and in
//! [0, 1]; node ids must be unique; every edge endpoint must name an
//! existing node. The first violation aborts with a field path so the
//! caller can report exactly what was wrong.

use std::collections::HashSet;

use crate::model::{KnowledgeGraph, NODE_TYPES, is_valid_node_type};

/// A schema or referential-integrity violation.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ValidationError {
    pub message: String,
    /// Path of the offending field, e.g. `nodes[3].confidence`.
    pub field: Option<String>,
}

impl ValidationError {
    pub fn new(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

/// Validate a whole graph. Returns the first violation found.
pub fn validate_graph(graph: &KnowledgeGraph) -> Result<(), ValidationError> {
    let mut node_ids: HashSet<&str> = HashSet::new();

    for (i, node) in graph.nodes.iter().enumerate() {
        if node.id.trim().is_empty() {
            return Err(ValidationError::new(
                format!("node at index {i} missing required field 'id'"),
                format!("nodes[{i}].id"),
            ));
        }
        if node.label.trim().is_empty() {
            return Err(ValidationError::new(
                format!("node '{}' missing required field 'label'", node.id),
                format!("nodes[{i}].label"),
            ));
        }
        if !is_valid_node_type(&node.node_type) {
            return Err(ValidationError::new(
                format!(
                    "node '{}' has invalid type '{}' (valid: {})",
                    node.id,
                    node.node_type,
                    NODE_TYPES.join(", ")
                ),
                format!("nodes[{i}].type"),
            ));
        }
        if let Some(raw) = &node.confidence {
            let Some(confidence) = raw.as_f64() else {
                return Err(ValidationError::new(
                    format!("node '{}' has non-numeric confidence {raw}", node.id),
                    format!("nodes[{i}].confidence"),
                ));
            };
            if !(0.0..=1.0).contains(&confidence) {
                return Err(ValidationError::new(
                    format!(
                        "node '{}' has confidence {confidence} outside [0.0, 1.0]",
                        node.id
                    ),
                    format!("nodes[{i}].confidence"),
                ));
            }
        }
        if !node_ids.insert(node.id.as_str()) {
            return Err(ValidationError::new(
                format!("duplicate node id '{}'", node.id),
                format!("nodes[{i}].id"),
            ));
        }
    }

    for (i, edge) in graph.edges.iter().enumerate() {
        if edge.source.trim().is_empty() {
            return Err(ValidationError::new(
                format!("edge at index {i} missing required field 'source'"),
                format!("edges[{i}].source"),
            ));
        }
        if edge.target.trim().is_empty() {
            return Err(ValidationError::new(
                format!("edge at index {i} missing required field 'target'"),
                format!("edges[{i}].target"),
            ));
        }
        if !node_ids.contains(edge.source.as_str()) {
            return Err(ValidationError::new(
                format!("edge at index {i} references non-existent source node '{}'", edge.source),
                format!("edges[{i}].source"),
            ));
        }
        if !node_ids.contains(edge.target.as_str()) {
            return Err(ValidationError::new(
                format!("edge at index {i} references non-existent target node '{}'", edge.target),
                format!("edges[{i}].target"),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use crate::model::{Edge, Node};

    use super::*;

    fn two_node_graph() -> KnowledgeGraph {
        let mut graph = KnowledgeGraph::default();
        graph.nodes.push(Node::new("a", "A", "concept"));
        graph.nodes.push(Node::new("b", "B", "decision"));
        graph
    }

    #[test]
    fn valid_graph_passes() {
        let mut graph = two_node_graph();
        graph.edges.push(Edge::new("a", "b", "informs"));
        assert!(validate_graph(&graph).is_ok());
    }

    #[test]
    fn empty_graph_passes() {
        assert!(validate_graph(&KnowledgeGraph::default()).is_ok());
    }

    #[test]
    fn missing_id_is_rejected_with_field_path() {
        let mut graph = KnowledgeGraph::default();
        graph.nodes.push(Node::new("", "A", "concept"));

        let err = validate_graph(&graph).expect_err("must fail");
        assert_eq!(err.field.as_deref(), Some("nodes[0].id"));
    }

    #[test]
    fn invalid_type_is_rejected() {
        let mut graph = KnowledgeGraph::default();
        graph.nodes.push(Node::new("a", "A", "widget"));

        let err = validate_graph(&graph).expect_err("must fail");
        assert_eq!(err.field.as_deref(), Some("nodes[0].type"));
        assert!(err.message.contains("widget"));
    }

    #[test]
    fn uppercase_type_is_accepted() {
        let mut graph = KnowledgeGraph::default();
        graph.nodes.push(Node::new("a", "A", "Finding"));
        assert!(validate_graph(&graph).is_ok());
    }

    #[test]
    fn non_numeric_confidence_is_rejected() {
        let mut graph = KnowledgeGraph::default();
        let mut node = Node::new("a", "A", "concept");
        node.confidence = Some(Value::from("very sure"));
        graph.nodes.push(node);

        let err = validate_graph(&graph).expect_err("must fail");
        assert_eq!(err.field.as_deref(), Some("nodes[0].confidence"));
    }

    #[test]
    fn out_of_range_confidence_is_rejected() {
        let mut graph = KnowledgeGraph::default();
        graph.nodes.push(Node::new("a", "A", "concept").with_confidence(1.5));

        let err = validate_graph(&graph).expect_err("must fail");
        assert!(err.message.contains("outside"));
    }

    #[test]
    fn boundary_confidence_is_accepted() {
        let mut graph = KnowledgeGraph::default();
        graph.nodes.push(Node::new("a", "A", "concept").with_confidence(0.0));
        graph.nodes.push(Node::new("b", "B", "concept").with_confidence(1.0));
        assert!(validate_graph(&graph).is_ok());
    }

    #[test]
    fn duplicate_node_ids_are_rejected() {
        let mut graph = KnowledgeGraph::default();
        graph.nodes.push(Node::new("a", "A", "concept"));
        graph.nodes.push(Node::new("a", "A again", "concept"));

        let err = validate_graph(&graph).expect_err("must fail");
        assert!(err.message.contains("duplicate"));
    }

    #[test]
    fn dangling_edge_source_is_rejected() {
        let mut graph = two_node_graph();
        graph.edges.push(Edge::new("ghost", "b", "informs"));

        let err = validate_graph(&graph).expect_err("must fail");
        assert_eq!(err.field.as_deref(), Some("edges[0].source"));
    }

    #[test]
    fn dangling_edge_target_is_rejected() {
        let mut graph = two_node_graph();
        graph.edges.push(Edge::new("a", "ghost", "informs"));

        let err = validate_graph(&graph).expect_err("must fail");
        assert_eq!(err.field.as_deref(), Some("edges[0].target"));
    }

    #[test]
    fn self_loops_are_allowed() {
        let mut graph = two_node_graph();
        graph.edges.push(Edge::new("a", "a", "refines"));
        assert!(validate_graph(&graph).is_ok());
    }
}
