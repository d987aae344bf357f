//! Stop-hook orchestrator.
//!
//! Consumes the assistant's final response text, extracts the five block
//! kinds, and dispatches them to the stores. Handlers are isolated: a
//! failure in one never prevents the others from running, and every
//! handler returns a structured [`HandlerReport`] that the orchestrator
//! aggregates into a single dispatch event.

pub mod blocks;
pub mod completion;
pub mod graph_update;
pub mod handoff;
pub mod preflight;
pub mod process_knowledge;
pub mod report;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value, json};
use tracing::warn;

use triadic_events::EventCapture;
use triadic_graph::GraphStore;

pub use blocks::{Block, BlockKind, parse_blocks};
pub use completion::{CompletionHandler, completions_path};
pub use graph_update::{GraphUpdate, GraphUpdateHandler, UpdateOp, agent_triads, parse_all};
pub use handoff::{HandoffHandler, PendingHandoff, pending_handoff_path};
pub use preflight::{Violation, declared_checks, run_preflight};
pub use process_knowledge::ProcessKnowledgeHandler;
pub use report::{BlockError, HandlerReport};

/// Aggregated result of one stop-hook dispatch.
#[derive(Debug, Default, serde::Serialize)]
pub struct DispatchSummary {
    pub handoffs: HandlerReport,
    pub completions: HandlerReport,
    pub graph_updates: HandlerReport,
    pub process_knowledge: HandlerReport,
    pub preflight: HandlerReport,
    /// Triads whose graphs were touched, for downstream issue detection.
    pub touched_triads: Vec<String>,
}

impl DispatchSummary {
    /// Whether any block of any kind was present.
    pub fn any_blocks(&self) -> bool {
        self.handoffs.count > 0
            || self.completions.count > 0
            || self.graph_updates.count > 0
            || self.process_knowledge.count > 0
            || self.preflight.count > 0
    }
}

/// The stop-hook entry point over one project state directory.
pub struct StopOrchestrator {
    state_dir: PathBuf,
    store: GraphStore,
}

impl StopOrchestrator {
    /// Orchestrator over `.claude/` (graphs live in `graphs/` beneath it).
    pub fn new(state_dir: &Path) -> Self {
        Self {
            state_dir: state_dir.to_path_buf(),
            store: GraphStore::new(&state_dir.join("graphs")),
        }
    }

    /// Access the underlying graph store.
    pub fn store_mut(&mut self) -> &mut GraphStore {
        &mut self.store
    }

    /// Parse the response text and dispatch every block. When `capture`
    /// is given, one aggregate event (plus a failure event per rejected
    /// pre-flight batch) is recorded.
    pub fn process(
        &mut self,
        text: &str,
        capture: Option<&EventCapture>,
        workspace_id: Option<&str>,
    ) -> DispatchSummary {
        let blocks = parse_blocks(text);
        let mut summary = DispatchSummary::default();

        summary.handoffs = HandoffHandler::new(&self.state_dir).process(&blocks);
        summary.completions = CompletionHandler::new(&self.state_dir).process(&blocks);

        let (updates, parse_errors) = parse_all(&blocks);
        let checks = declared_checks(&blocks);
        let preflight_count = blocks
            .iter()
            .filter(|b| b.kind == BlockKind::PreFlightCheck)
            .count();
        summary.preflight = HandlerReport::for_count(preflight_count);

        let rejected = if let Some(checks) = &checks {
            let violations = run_preflight(&updates, &mut self.store, checks);
            if violations.is_empty() {
                summary.preflight.applied = preflight_count;
                false
            } else {
                for violation in &violations {
                    summary
                        .preflight
                        .record_error(format!("{}: {} ({})", violation.rule, violation.message, violation.field_path));
                }
                true
            }
        } else {
            false
        };

        if rejected {
            // The whole update batch is refused; report each update as
            // rejected without touching any graph.
            summary.graph_updates = HandlerReport::for_count(updates.len() + parse_errors.len());
            for reason in &parse_errors {
                summary.graph_updates.record_error(reason.clone());
            }
            for _ in &updates {
                summary
                    .graph_updates
                    .record_error("rejected by pre-flight checks".to_string());
            }
            if let Some(capture) = capture {
                let mut data = Map::new();
                data.insert("violations".to_string(), json!(summary.preflight.errors));
                capture.capture("stop", "preflight_failed", data, workspace_id);
            }
        } else {
            summary.graph_updates =
                GraphUpdateHandler::apply(&mut self.store, &updates, &parse_errors);
        }

        summary.process_knowledge = ProcessKnowledgeHandler::apply(&mut self.store, &blocks);

        let mut touched: BTreeSet<String> = BTreeSet::new();
        if !rejected && summary.graph_updates.applied > 0 {
            for update in &updates {
                touched.insert(update.triad.clone());
            }
        }
        if summary.process_knowledge.applied > 0 {
            for block in blocks.iter().filter(|b| b.kind == BlockKind::ProcessKnowledge) {
                if let Ok(triad) = graph_update::resolve_triad(block) {
                    touched.insert(triad);
                }
            }
        }
        summary.touched_triads = touched.into_iter().collect();

        if let Some(capture) = capture {
            let mut data = Map::new();
            match serde_json::to_value(&summary) {
                Ok(value) => {
                    if let Value::Object(map) = value {
                        data = map;
                    }
                }
                Err(err) => warn!(%err, "failed to serialize dispatch summary"),
            }
            capture.capture("stop", "blocks_dispatched", data, workspace_id);
        }

        summary
    }
}
