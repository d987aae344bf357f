//! Substring search over a graph.

use crate::model::KnowledgeGraph;

/// Where a query matched within a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchedIn {
    Label,
    Content,
}

/// One search hit.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub node_id: String,
    pub label: String,
    pub node_type: String,
    pub confidence: f64,
    pub matched_in: MatchedIn,
}

/// Case-insensitive substring search against label first, then
/// content/description. Nodes below `min_confidence` are dropped; nodes
/// without a confidence value count as 0. Results sort by confidence,
/// highest first.
pub fn search_graph(graph: &KnowledgeGraph, query: &str, min_confidence: f64) -> Vec<SearchResult> {
    let needle = query.to_lowercase();
    let mut results: Vec<SearchResult> = graph
        .nodes
        .iter()
        .filter_map(|node| {
            let matched_in = if node.label.to_lowercase().contains(&needle) {
                MatchedIn::Label
            } else {
                let content = node
                    .content
                    .as_deref()
                    .or(node.description.as_deref())
                    .unwrap_or("");
                if content.to_lowercase().contains(&needle) {
                    MatchedIn::Content
                } else {
                    return None;
                }
            };

            let confidence = node.confidence_f64().unwrap_or(0.0);
            if confidence < min_confidence {
                return None;
            }

            Some(SearchResult {
                node_id: node.id.clone(),
                label: node.label.clone(),
                node_type: node.node_type.clone(),
                confidence,
                matched_in,
            })
        })
        .collect();

    results.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results
}
