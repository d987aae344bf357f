//! Workflow completion: `[WORKFLOW_COMPLETE]` blocks append to the
//! completion log and clear any pending handoff.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::blocks::{Block, BlockKind};
use crate::handoff::HandoffHandler;
use crate::report::HandlerReport;

/// Default completion log file name
pub const COMPLETIONS_FILE: &str = "completions.jsonl";

/// Get the completions log path for a state directory
pub fn completions_path(state_dir: &Path) -> PathBuf {
    state_dir.join(COMPLETIONS_FILE)
}

/// One recorded workflow completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub timestamp: String,
    #[serde(default)]
    pub workflow: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// Handler for `[WORKFLOW_COMPLETE]` blocks.
#[derive(Debug, Clone)]
pub struct CompletionHandler {
    log_file: PathBuf,
    handoffs: HandoffHandler,
}

impl CompletionHandler {
    /// Handler writing under a state directory.
    pub fn new(state_dir: &Path) -> Self {
        Self {
            log_file: completions_path(state_dir),
            handoffs: HandoffHandler::new(state_dir),
        }
    }

    /// Append each completion and clear the pending handoff; a finished
    /// workflow must not trigger a stale next-triad invocation.
    pub fn process(&self, blocks: &[Block]) -> HandlerReport {
        let completions: Vec<&Block> = blocks
            .iter()
            .filter(|b| b.kind == BlockKind::WorkflowComplete)
            .collect();
        let mut report = HandlerReport::for_count(completions.len());

        for block in completions {
            let record = CompletionRecord {
                timestamp: Utc::now().to_rfc3339(),
                workflow: block.field("workflow").map(String::from),
                summary: block.field("summary").map(String::from),
            };

            let line = match serde_json::to_string(&record) {
                Ok(line) => line,
                Err(err) => {
                    report.record_error(format!("failed to serialize completion: {err}"));
                    continue;
                }
            };

            match triadic_io::append_line(&self.log_file, &line) {
                Ok(()) => {
                    self.handoffs.clear_pending();
                    report.record_applied();
                }
                Err(err) => report.record_error(format!("failed to log completion: {err:#}")),
            }
        }

        report
    }
}
