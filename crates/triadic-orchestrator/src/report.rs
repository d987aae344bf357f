//! Structured per-handler results.

use serde::{Deserialize, Serialize};

/// A single failed block within a handler batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockError {
    pub reason: String,
}

impl BlockError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Outcome of one handler over all of its blocks. A failure in one block
/// never aborts the batch; it lands in `errors` and the rest proceed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HandlerReport {
    /// Blocks of this kind found in the text.
    pub count: usize,
    /// Whether every block was handled.
    pub success: bool,
    /// Blocks actually applied/queued.
    pub applied: usize,
    /// Per-block failures.
    pub errors: Vec<BlockError>,
}

impl HandlerReport {
    /// Report for a batch of `count` blocks, to be filled in.
    pub fn for_count(count: usize) -> Self {
        Self {
            count,
            success: true,
            applied: 0,
            errors: Vec::new(),
        }
    }

    /// Record one applied block.
    pub fn record_applied(&mut self) {
        self.applied += 1;
    }

    /// Record one failed block.
    pub fn record_error(&mut self, reason: impl Into<String>) {
        self.errors.push(BlockError::new(reason));
        self.success = false;
    }
}
