//! Handoff queueing: `[HANDOFF_REQUEST]` blocks become the pending
//! handoff file consumed at the start of the next session.
//!
//! Queueing is last-writer-wins: the pending file is replaced atomically,
//! so queueing the same handoff twice leaves exactly one well-formed file.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::blocks::{Block, BlockKind};
use crate::report::HandlerReport;

/// Default pending handoff file name
pub const PENDING_HANDOFF_FILE: &str = ".pending_handoff.json";

/// Hours before a queued handoff goes stale.
pub const HANDOFF_EXPIRY_HOURS: i64 = 24;

/// Get the pending handoff path for a state directory
pub fn pending_handoff_path(state_dir: &Path) -> PathBuf {
    state_dir.join(PENDING_HANDOFF_FILE)
}

/// A queued handoff awaiting the next session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingHandoff {
    pub next_triad: String,
    pub request_type: String,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub knowledge_graph: String,
    #[serde(default)]
    pub updated_nodes: Vec<String>,
    pub timestamp: DateTime<Utc>,
    pub status: String,
    pub expiry_hours: i64,
}

impl PendingHandoff {
    /// Whether the handoff has outlived its expiry window.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.timestamp > Duration::hours(self.expiry_hours)
    }
}

/// Handler for `[HANDOFF_REQUEST]` blocks.
#[derive(Debug, Clone)]
pub struct HandoffHandler {
    pending_file: PathBuf,
}

impl HandoffHandler {
    /// Handler writing under a state directory.
    pub fn new(state_dir: &Path) -> Self {
        Self {
            pending_file: pending_handoff_path(state_dir),
        }
    }

    /// Path to the pending handoff file.
    pub fn pending_file(&self) -> &Path {
        &self.pending_file
    }

    /// Validate and queue every handoff block. Later blocks overwrite
    /// earlier ones (last writer wins).
    pub fn process(&self, blocks: &[Block]) -> HandlerReport {
        let handoffs: Vec<&Block> = blocks
            .iter()
            .filter(|b| b.kind == BlockKind::HandoffRequest)
            .collect();
        let mut report = HandlerReport::for_count(handoffs.len());

        for block in handoffs {
            let Some(next_triad) = block.field("next_triad") else {
                report.record_error("handoff request missing next_triad field");
                continue;
            };

            let handoff = PendingHandoff {
                next_triad: next_triad.to_string(),
                request_type: block.field("request_type").unwrap_or("unknown").to_string(),
                context: block.field("context").unwrap_or_default().to_string(),
                knowledge_graph: block.field("knowledge_graph").unwrap_or_default().to_string(),
                updated_nodes: block
                    .field("updated_nodes")
                    .map(|v| {
                        v.split(',')
                            .map(|s| s.trim().to_string())
                            .filter(|s| !s.is_empty())
                            .collect()
                    })
                    .unwrap_or_default(),
                timestamp: Utc::now(),
                status: "pending".to_string(),
                expiry_hours: HANDOFF_EXPIRY_HOURS,
            };

            match triadic_io::write_json_atomic(&self.pending_file, &handoff) {
                Ok(()) => {
                    info!(next_triad = handoff.next_triad, "handoff queued");
                    report.record_applied();
                }
                Err(err) => report.record_error(format!("failed to queue handoff: {err:#}")),
            }
        }

        report
    }

    /// Load the pending handoff, consuming it. Expired handoffs are
    /// deleted and reported as `None`.
    pub fn take_pending(&self) -> Option<PendingHandoff> {
        if !self.pending_file.exists() {
            return None;
        }
        let handoff: Option<PendingHandoff> = triadic_io::load_json(&self.pending_file).ok();
        let _ = std::fs::remove_file(&self.pending_file);

        match handoff {
            Some(h) if !h.is_expired(Utc::now()) => Some(h),
            _ => None,
        }
    }

    /// Remove any pending handoff without reading it.
    pub fn clear_pending(&self) {
        let _ = std::fs::remove_file(&self.pending_file);
    }
}
