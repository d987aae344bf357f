//! The common hook envelope.
//!
//! Every hook runs inside [`run_hook`]: the active workspace is looked up
//! once, the body runs behind a failure boundary, and an execution (or
//! failure) event is recorded before exit. A body error downgrades to a
//! successful empty outcome: observational hooks must never block the
//! host, whatever went wrong inside.

use std::time::Instant;

use serde_json::Map;
use tracing::warn;

use triadic_events::EventCapture;
use triadic_workspace::WorkspaceManager;

use crate::paths::ProjectPaths;
use crate::protocol::HookInput;

/// What a hook wants the process to do on the way out.
#[derive(Debug, Clone, Default)]
pub struct HookOutcome {
    /// Process exit code; 0 for everything except the blocking path.
    pub exit_code: i32,
    /// Printed to stdout (the host's context channel).
    pub stdout: Option<String>,
    /// Printed to stderr (advisory, or the blocking interjection).
    pub stderr: Option<String>,
    /// Skip the envelope's execution event (the hook recorded its own).
    pub suppress_event: bool,
    /// Extra payload for the execution event.
    pub event_data: Map<String, serde_json::Value>,
}

impl HookOutcome {
    /// A silent success.
    pub fn silent() -> Self {
        Self::default()
    }

    /// A success with stdout content.
    pub fn with_stdout(stdout: String) -> Self {
        Self {
            stdout: Some(stdout),
            ..Self::default()
        }
    }

    /// The blocking outcome: exit 2 with an interjection on stderr.
    pub fn blocking(interjection: String) -> Self {
        Self {
            exit_code: 2,
            stderr: Some(interjection),
            ..Self::default()
        }
    }
}

/// Run a hook body inside the envelope. Returns the outcome to apply to
/// the process (print stdout/stderr, exit with the code).
pub fn run_hook<F>(hook_name: &str, paths: &ProjectPaths, input: &HookInput, body: F) -> HookOutcome
where
    F: FnOnce(&HookInput, Option<&str>) -> anyhow::Result<HookOutcome>,
{
    let start = Instant::now();
    let capture = EventCapture::new(&paths.events_path());

    // The active marker is read exactly once per invocation; the id is
    // passed down by argument from here on.
    let workspace_id = WorkspaceManager::new(&paths.triads_dir())
        .get_active()
        .unwrap_or_default();

    match body(input, workspace_id.as_deref()) {
        Ok(outcome) => {
            if !outcome.suppress_event {
                capture.capture_execution(
                    hook_name,
                    start,
                    outcome.event_data.clone(),
                    workspace_id.as_deref(),
                );
            }
            outcome
        }
        Err(err) => {
            warn!(hook = hook_name, error = %format!("{err:#}"), "hook body failed");
            capture.capture_error(hook_name, start, &err, workspace_id.as_deref());
            HookOutcome::silent()
        }
    }
}
