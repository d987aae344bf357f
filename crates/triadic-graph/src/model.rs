//! Graph, node, and edge models.
//!
//! Nodes keep `confidence` as raw JSON so that a malformed value (a string,
//! an out-of-range number) survives deserialization and can be reported by
//! validation or stripped by repair, instead of poisoning the whole file.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The closed set of node types.
pub const NODE_TYPES: [&str; 7] = [
    "concept",
    "decision",
    "entity",
    "finding",
    "task",
    "workflow",
    "uncertainty",
];

/// Case-insensitive membership test against [`NODE_TYPES`].
pub fn is_valid_node_type(node_type: &str) -> bool {
    let lowered = node_type.to_lowercase();
    NODE_TYPES.contains(&lowered.as_str())
}

/// A knowledge graph node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique within the graph.
    pub id: String,
    /// Human-readable name.
    pub label: String,
    /// One of [`NODE_TYPES`], matched case-insensitively.
    #[serde(rename = "type")]
    pub node_type: String,
    /// Confidence in [0, 1]. Raw JSON so malformed values are repairable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Supporting evidence entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Vec<Value>>,
    /// Typed properties (alternatives, rationale, assumptions, process
    /// knowledge fields) and anything else agents attach.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Node {
    /// Create a minimal node.
    pub fn new(id: &str, label: &str, node_type: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            node_type: node_type.to_string(),
            confidence: None,
            content: None,
            description: None,
            evidence: None,
            extra: Map::new(),
        }
    }

    /// Set the confidence value.
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(Value::from(confidence));
        self
    }

    /// Confidence as a float, if present and numeric.
    pub fn confidence_f64(&self) -> Option<f64> {
        self.confidence.as_ref().and_then(Value::as_f64)
    }
}

/// A directed edge between two nodes of the same graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    /// Relation name. Older graphs used the key `key`; both are accepted
    /// on read and `relationship` is written.
    #[serde(default, alias = "key", skip_serializing_if = "Option::is_none")]
    pub relationship: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Edge {
    /// Create an edge with a relation name.
    pub fn new(source: &str, target: &str, relationship: &str) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
            relationship: Some(relationship.to_string()),
            extra: Map::new(),
        }
    }
}

/// Graph metadata block, refreshed on every save.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub node_count: usize,
    #[serde(default)]
    pub edge_count: usize,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// On-disk graph document. Accepts either `edges` or the legacy `links`
/// key; [`KnowledgeGraph::from_doc`] normalizes to `edges`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphDoc {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edges: Option<Vec<Edge>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<Edge>>,
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<GraphMeta>,
}

/// A normalized, in-memory knowledge graph.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeGraph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub meta: GraphMeta,
}

impl KnowledgeGraph {
    /// Normalize an on-disk document. `edges` wins when both keys are
    /// present; `links` alone is accepted as the legacy spelling.
    pub fn from_doc(doc: GraphDoc) -> Self {
        let edges = doc.edges.or(doc.links).unwrap_or_default();
        Self {
            nodes: doc.nodes,
            edges,
            meta: doc.meta.unwrap_or_default(),
        }
    }

    /// Produce the canonical on-disk document with refreshed metadata.
    pub fn to_doc(&self) -> GraphDoc {
        let mut meta = self.meta.clone();
        meta.updated_at = Some(Utc::now().to_rfc3339());
        meta.node_count = self.nodes.len();
        meta.edge_count = self.edges.len();

        GraphDoc {
            nodes: self.nodes.clone(),
            edges: Some(self.edges.clone()),
            links: None,
            meta: Some(meta),
        }
    }

    /// Find a node by id.
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Find a node by id, mutably.
    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    /// Ids of every node, in insertion order.
    pub fn node_ids(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.id.as_str()).collect()
    }
}
