//! Relevance-scored lookup of process knowledge for a tool invocation.
//!
//! Runs before every tool use, so the hot path avoids regex entirely:
//! glob sets are compiled once per engine (per session) and keyword checks
//! are word-boundary scans over pre-lowercased text.

use std::collections::HashMap;

use globset::{Glob, GlobSet, GlobSetBuilder};
use serde_json::Value;
use tracing::warn;

use triadic_graph::GraphStore;

use crate::knowledge::{Priority, ProcessKnowledge};

/// Sub-score weights. Must sum to 1.0.
pub const WEIGHT_TOOL: f64 = 0.40;
pub const WEIGHT_FILE: f64 = 0.40;
pub const WEIGHT_ACTION_KEYWORDS: f64 = 0.10;
pub const WEIGHT_CONTEXT_KEYWORDS: f64 = 0.10;

/// Items scoring below this (after the priority multiplier) are dropped.
pub const RELEVANCE_THRESHOLD: f64 = 0.4;

/// Engine knobs, normally read from the environment. These three are the
/// only recognized switches.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Disable blocking entirely (inject instead).
    pub disable_block: bool,
    /// Disable all experience output.
    pub disable_experience: bool,
    /// Minimum confidence before a CRITICAL item may block.
    pub block_threshold: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            disable_block: false,
            disable_experience: false,
            block_threshold: 0.85,
        }
    }
}

impl EngineConfig {
    /// Read `TRIADIC_NO_BLOCK`, `TRIADIC_NO_EXPERIENCE`, and
    /// `TRIADIC_BLOCK_THRESHOLD` from the environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.disable_block = env_flag("TRIADIC_NO_BLOCK");
        config.disable_experience = env_flag("TRIADIC_NO_EXPERIENCE");
        if let Ok(raw) = std::env::var("TRIADIC_BLOCK_THRESHOLD")
            && let Ok(threshold) = raw.parse::<f64>()
        {
            config.block_threshold = threshold.clamp(0.0, 1.0);
        }
        config
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// The tool invocation being scored against.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub tool_name: String,
    pub tool_input: Value,
    pub cwd: Option<String>,
}

impl ToolContext {
    /// Candidate file paths from the tool input.
    pub fn file_paths(&self) -> Vec<&str> {
        const PATH_KEYS: [&str; 3] = ["file_path", "path", "notebook_path"];
        let Some(input) = self.tool_input.as_object() else {
            return Vec::new();
        };
        PATH_KEYS
            .iter()
            .filter_map(|k| input.get(*k).and_then(Value::as_str))
            .collect()
    }

    /// The shell command, for Bash-style tools.
    pub fn command(&self) -> Option<&str> {
        self.tool_input.get("command").and_then(Value::as_str)
    }
}

/// A lesson with its relevance score.
#[derive(Debug, Clone)]
pub struct ScoredKnowledge {
    pub knowledge: ProcessKnowledge,
    pub score: f64,
    /// Whether a file pattern matched the tool input (used by the blocking
    /// policy: a checklist "covers" the file being written).
    pub file_matched: bool,
}

/// Per-session query engine over every triad graph.
pub struct QueryEngine {
    store: GraphStore,
    config: EngineConfig,
    glob_cache: HashMap<String, Option<GlobSet>>,
}

impl QueryEngine {
    /// Engine over a graphs directory.
    pub fn new(store: GraphStore, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            glob_cache: HashMap::new(),
        }
    }

    /// The active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Collect every process-knowledge node across all graphs.
    pub fn all_knowledge(&mut self) -> Vec<ProcessKnowledge> {
        let triads = match self.store.list_triads() {
            Ok(triads) => triads,
            Err(err) => {
                warn!(%err, "failed to list triads");
                return Vec::new();
            }
        };

        let mut items = Vec::new();
        for triad in triads {
            match self.store.load(&triad) {
                Ok(graph) => {
                    items.extend(
                        graph
                            .nodes
                            .iter()
                            .filter_map(|n| ProcessKnowledge::from_node(n, &triad)),
                    );
                }
                Err(err) => warn!(triad, %err, "failed to load graph"),
            }
        }
        items
    }

    /// Rank lessons for a tool invocation. Returns items at or above the
    /// relevance threshold, best first.
    pub fn query_for_tool_use(&mut self, ctx: &ToolContext) -> Vec<ScoredKnowledge> {
        if self.config.disable_experience {
            return Vec::new();
        }

        let input_text = self.stringify_input(ctx).to_lowercase();
        let context_text = self.context_text(ctx).to_lowercase();

        let items = self.all_knowledge();
        let mut scored: Vec<ScoredKnowledge> = items
            .into_iter()
            .filter_map(|item| {
                // Early exit: an item that names tools is irrelevant to
                // every other tool, whatever its file patterns say.
                if !item.triggers.tool_names.is_empty()
                    && !item.triggers.tool_names.iter().any(|t| t == &ctx.tool_name)
                {
                    return None;
                }
                let (score, file_matched) =
                    self.score(&item, ctx, &input_text, &context_text);
                (score >= RELEVANCE_THRESHOLD).then_some(ScoredKnowledge {
                    knowledge: item,
                    score,
                    file_matched,
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored
    }

    /// All CRITICAL lessons, regardless of tool context.
    pub fn critical_knowledge(&mut self) -> Vec<ProcessKnowledge> {
        self.all_knowledge()
            .into_iter()
            .filter(|k| k.priority == Priority::Critical)
            .collect()
    }

    fn score(
        &mut self,
        item: &ProcessKnowledge,
        ctx: &ToolContext,
        input_text: &str,
        context_text: &str,
    ) -> (f64, bool) {
        let tool_score = if item
            .triggers
            .tool_names
            .iter()
            .any(|t| t == &ctx.tool_name)
        {
            1.0
        } else {
            0.0
        };

        let file_matched = self.file_matches(item, ctx);
        let file_score = if file_matched { 1.0 } else { 0.0 };

        let action_score = keyword_fraction(&item.triggers.action_keywords, input_text);
        let context_score = keyword_fraction(&item.triggers.context_keywords, context_text);

        let weighted = WEIGHT_TOOL * tool_score
            + WEIGHT_FILE * file_score
            + WEIGHT_ACTION_KEYWORDS * action_score
            + WEIGHT_CONTEXT_KEYWORDS * context_score;

        (weighted * item.priority.multiplier(), file_matched)
    }

    fn file_matches(&mut self, item: &ProcessKnowledge, ctx: &ToolContext) -> bool {
        if item.triggers.file_patterns.is_empty() {
            return false;
        }
        let paths = ctx.file_paths();
        if paths.is_empty() {
            return false;
        }

        let glob_set = self
            .glob_cache
            .entry(item.node_id.clone())
            .or_insert_with(|| compile_globs(&item.triggers.file_patterns));

        match glob_set {
            Some(set) => paths.iter().any(|p| set.is_match(p)),
            None => false,
        }
    }

    fn stringify_input(&self, ctx: &ToolContext) -> String {
        ctx.tool_input.to_string()
    }

    fn context_text(&self, ctx: &ToolContext) -> String {
        let mut parts = Vec::new();
        if let Some(cwd) = &ctx.cwd {
            if let Some(base) = std::path::Path::new(cwd).file_name() {
                parts.push(base.to_string_lossy().into_owned());
            } else {
                parts.push(cwd.clone());
            }
        }
        // Hook processes see one invocation; the tool input is the only
        // recent context available.
        parts.push(ctx.tool_input.to_string());
        parts.join(" ")
    }
}

fn compile_globs(patterns: &[String]) -> Option<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        match Glob::new(pattern) {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(err) => {
                warn!(pattern, %err, "skipping invalid file pattern");
            }
        }
    }
    builder.build().ok()
}

/// Fraction of keywords present in `haystack` on word boundaries. Empty
/// keyword lists contribute 0; absence of triggers is not relevance.
fn keyword_fraction(keywords: &[String], haystack: &str) -> f64 {
    if keywords.is_empty() {
        return 0.0;
    }
    let hits = keywords
        .iter()
        .filter(|k| contains_word(haystack, &k.to_lowercase()))
        .count();
    hits as f64 / keywords.len() as f64
}

/// Word-boundary containment without regex.
fn contains_word(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    let mut start = 0;
    while let Some(pos) = haystack[start..].find(needle) {
        let at = start + pos;
        let end = at + needle.len();
        let before_ok = at == 0
            || !haystack[..at]
                .chars()
                .next_back()
                .map(|c| c.is_alphanumeric() || c == '_')
                .unwrap_or(false);
        let after_ok = end == haystack.len()
            || !haystack[end..]
                .chars()
                .next()
                .map(|c| c.is_alphanumeric() || c == '_')
                .unwrap_or(false);
        if before_ok && after_ok {
            return true;
        }
        start = at + 1;
        if start >= haystack.len() {
            break;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;

    use triadic_graph::{KnowledgeGraph, Node};

    use super::*;

    fn lesson(id: &str, priority: &str, confidence: f64) -> Node {
        let mut node = Node::new(id, &format!("Lesson {id}"), "concept").with_confidence(confidence);
        node.extra.insert("process_type".to_string(), json!("checklist"));
        node.extra.insert("priority".to_string(), json!(priority));
        node.extra.insert(
            "trigger_conditions".to_string(),
            json!({
                "tool_names": ["Write"],
                "file_patterns": ["**/plugin.json"],
                "action_keywords": ["version"],
                "context_keywords": ["release"]
            }),
        );
        node
    }

    fn engine_with(nodes: Vec<Node>) -> (tempfile::TempDir, QueryEngine) {
        let td = tempdir().expect("tempdir");
        let mut store = GraphStore::new(td.path());
        let mut graph = KnowledgeGraph::default();
        graph.nodes = nodes;
        store.save("deployment", &graph).expect("save");
        (td, QueryEngine::new(store, EngineConfig::default()))
    }

    fn write_ctx(path: &str) -> ToolContext {
        ToolContext {
            tool_name: "Write".to_string(),
            tool_input: json!({"file_path": path, "content": "bump version to 2.0"}),
            cwd: Some("/home/dev/release".to_string()),
        }
    }

    #[test]
    fn matching_tool_and_file_scores_above_threshold() {
        let (_td, mut engine) = engine_with(vec![lesson("l1", "MEDIUM", 0.9)]);
        let results = engine.query_for_tool_use(&write_ctx("/x/plugin.json"));

        assert_eq!(results.len(), 1);
        assert!(results[0].file_matched);
        // 0.4 + 0.4 + 0.1 + 0.1 = 1.0 at MEDIUM multiplier.
        assert!((results[0].score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn wrong_tool_is_skipped_even_when_the_file_matches() {
        let (_td, mut engine) = engine_with(vec![lesson("l1", "CRITICAL", 0.95)]);
        let ctx = ToolContext {
            tool_name: "Read".to_string(),
            tool_input: json!({"file_path": "/x/plugin.json"}),
            cwd: None,
        };
        assert!(engine.query_for_tool_use(&ctx).is_empty());
    }

    #[test]
    fn items_without_tool_names_match_on_files_alone() {
        let mut node = lesson("anytool", "CRITICAL", 0.9);
        node.extra.insert(
            "trigger_conditions".to_string(),
            json!({
                "tool_names": [],
                "file_patterns": ["**/plugin.json"],
                "action_keywords": [],
                "context_keywords": []
            }),
        );
        let (_td, mut engine) = engine_with(vec![node]);

        let ctx = ToolContext {
            tool_name: "Read".to_string(),
            tool_input: json!({"file_path": "/x/plugin.json"}),
            cwd: None,
        };
        // 0.4 (file) at CRITICAL multiplier = 0.8, kept.
        let results = engine.query_for_tool_use(&ctx);
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn critical_priority_doubles_the_score() {
        let (_td, mut engine) = engine_with(vec![
            lesson("low", "LOW", 0.9),
            lesson("crit", "CRITICAL", 0.9),
        ]);
        let results = engine.query_for_tool_use(&write_ctx("/x/plugin.json"));

        assert_eq!(results[0].knowledge.node_id, "crit");
        assert!((results[0].score - 2.0).abs() < 1e-9);
        // LOW: 1.0 * 0.5 = 0.5, still above threshold.
        assert_eq!(results[1].knowledge.node_id, "low");
    }

    #[test]
    fn action_keywords_need_word_boundaries() {
        assert!(contains_word("bump version to 2.0", "version"));
        assert!(!contains_word("subversion checkout", "version"));
        assert!(contains_word("run git-commit now", "commit"));
    }

    #[test]
    fn keyword_fraction_is_proportional() {
        let keywords = vec!["alpha".to_string(), "beta".to_string()];
        assert_eq!(keyword_fraction(&keywords, "alpha only"), 0.5);
        assert_eq!(keyword_fraction(&keywords, "alpha and beta"), 1.0);
        assert_eq!(keyword_fraction(&[], "anything"), 0.0);
    }

    #[test]
    fn disable_experience_returns_nothing() {
        let (_td, mut engine) = engine_with(vec![lesson("l1", "CRITICAL", 0.95)]);
        engine.config.disable_experience = true;
        assert!(engine.query_for_tool_use(&write_ctx("/x/plugin.json")).is_empty());
    }

    #[test]
    fn deprecated_lessons_never_surface() {
        let mut node = lesson("dead", "CRITICAL", 0.95);
        node.extra.insert("deprecated".to_string(), json!(true));
        let (_td, mut engine) = engine_with(vec![node]);
        assert!(engine.query_for_tool_use(&write_ctx("/x/plugin.json")).is_empty());
    }

    #[test]
    fn critical_knowledge_filters_by_priority() {
        let (_td, mut engine) = engine_with(vec![
            lesson("a", "CRITICAL", 0.9),
            lesson("b", "HIGH", 0.9),
        ]);
        let critical = engine.critical_knowledge();
        assert_eq!(critical.len(), 1);
        assert_eq!(critical[0].node_id, "a");
    }

    #[test]
    fn invalid_glob_patterns_are_skipped_not_fatal() {
        let mut node = lesson("bad-glob", "MEDIUM", 0.9);
        node.extra.insert(
            "trigger_conditions".to_string(),
            json!({
                "tool_names": ["Write"],
                "file_patterns": ["[invalid"],
                "action_keywords": [],
                "context_keywords": []
            }),
        );
        let (_td, mut engine) = engine_with(vec![node]);
        // Tool-only score 0.4 survives; the bad pattern just never matches.
        let results = engine.query_for_tool_use(&write_ctx("/x/plugin.json"));
        assert_eq!(results.len(), 1);
        assert!(!results[0].file_matched);
    }
}
