//! Process-knowledge projection over graph nodes.
//!
//! Process knowledge lives in ordinary graph nodes; the fields specific to
//! it (process type, priority, trigger conditions, outcome counts) sit in
//! the node's extra properties. This module gives those a typed view.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use triadic_graph::Node;

/// Kind of procedural guidance a lesson carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessType {
    Checklist,
    Pattern,
    Warning,
    Requirement,
}

impl ProcessType {
    /// Parse, case-insensitively. Unknown values are not process knowledge.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "checklist" => Some(Self::Checklist),
            "pattern" => Some(Self::Pattern),
            "warning" => Some(Self::Warning),
            "requirement" => Some(Self::Requirement),
            _ => None,
        }
    }
}

/// Lesson priority. Scales the relevance score and gates blocking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    /// Parse, case-insensitively, defaulting to `Medium`.
    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "CRITICAL" => Self::Critical,
            "HIGH" => Self::High,
            "LOW" => Self::Low,
            _ => Self::Medium,
        }
    }

    /// Relevance multiplier applied after the weighted sub-scores.
    pub fn multiplier(self) -> f64 {
        match self {
            Self::Critical => 2.0,
            Self::High => 1.5,
            Self::Medium => 1.0,
            Self::Low => 0.5,
        }
    }

    /// Display form, e.g. `CRITICAL`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }
}

/// When a lesson fires.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerConditions {
    #[serde(default)]
    pub tool_names: Vec<String>,
    #[serde(default)]
    pub file_patterns: Vec<String>,
    #[serde(default)]
    pub action_keywords: Vec<String>,
    #[serde(default)]
    pub context_keywords: Vec<String>,
}

/// Typed view of a process-knowledge node.
#[derive(Debug, Clone)]
pub struct ProcessKnowledge {
    pub node_id: String,
    pub label: String,
    pub triad: String,
    pub process_type: ProcessType,
    pub priority: Priority,
    pub confidence: f64,
    pub content: Option<String>,
    pub triggers: TriggerConditions,
    pub needs_validation: bool,
    pub deprecated: bool,
    pub success_count: u64,
    pub failure_count: u64,
    pub contradiction_count: u64,
}

impl ProcessKnowledge {
    /// Project a graph node into process knowledge. Returns `None` for
    /// nodes without a recognized `process_type` and for deprecated ones;
    /// deprecated lessons stay in the graph as an audit trail but never
    /// reach the query engine.
    pub fn from_node(node: &Node, triad: &str) -> Option<Self> {
        let process_type = node
            .extra
            .get("process_type")
            .and_then(Value::as_str)
            .and_then(ProcessType::parse)?;

        let deprecated = node
            .extra
            .get("deprecated")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if deprecated {
            return None;
        }

        let priority = node
            .extra
            .get("priority")
            .and_then(Value::as_str)
            .map(Priority::parse)
            .unwrap_or(Priority::Medium);

        let triggers = node
            .extra
            .get("trigger_conditions")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        Some(Self {
            node_id: node.id.clone(),
            label: node.label.clone(),
            triad: triad.to_string(),
            process_type,
            priority,
            confidence: node.confidence_f64().unwrap_or(0.5),
            content: node.content.clone().or_else(|| node.description.clone()),
            triggers,
            needs_validation: node
                .extra
                .get("needs_validation")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            deprecated,
            success_count: count(node, "success_count"),
            failure_count: count(node, "failure_count"),
            contradiction_count: count(node, "contradiction_count"),
        })
    }
}

fn count(node: &Node, key: &str) -> u64 {
    node.extra.get(key).and_then(Value::as_u64).unwrap_or(0)
}
