//! Persistent workflow state with locked load-mutate-save.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use triadic_io::FileLock;

/// Default state file name
pub const STATE_FILE: &str = "workflow_state.json";

/// The closed set of triads.
pub const VALID_TRIADS: [&str; 5] = [
    "idea-validation",
    "design",
    "implementation",
    "garden-tending",
    "deployment",
];

/// Membership in [`VALID_TRIADS`].
pub fn is_valid_triad(triad: &str) -> bool {
    VALID_TRIADS.contains(&triad)
}

/// Valid phase transitions. `None` is the pre-workflow state.
pub fn is_valid_transition(from: Option<&str>, to: &str) -> bool {
    match from {
        None => to == "idea-validation",
        Some("idea-validation") => to == "design",
        Some("design") => to == "implementation",
        Some("implementation") => to == "garden-tending" || to == "deployment",
        Some("garden-tending") => to == "deployment",
        // deployment is terminal; unknown phases admit nothing.
        Some(_) => false,
    }
}

/// Get the workflow state file path for a state directory
pub fn state_path(state_dir: &Path) -> PathBuf {
    state_dir.join(STATE_FILE)
}

/// Persisted workflow state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub session_id: String,
    #[serde(default)]
    pub completed_triads: Vec<String>,
    #[serde(default)]
    pub current_phase: Option<String>,
    #[serde(default)]
    pub last_transition: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl WorkflowState {
    fn fresh() -> Self {
        Self {
            session_id: Utc::now().format("%Y%m%d_%H%M%S").to_string(),
            completed_triads: Vec::new(),
            current_phase: None,
            last_transition: None,
            metadata: Map::new(),
        }
    }

    /// Whether a triad has been completed.
    pub fn is_completed(&self, triad: &str) -> bool {
        self.completed_triads.iter().any(|t| t == triad)
    }
}

/// Manager over one workflow state file.
///
/// Reads take a shared lock; `mark_completed` holds an exclusive lock for
/// the whole load-mutate-save cycle so concurrent hooks cannot interleave
/// updates.
#[derive(Debug, Clone)]
pub struct WorkflowStateManager {
    state_file: PathBuf,
    lock_file: PathBuf,
}

impl WorkflowStateManager {
    /// Manager for the state file under a state directory.
    pub fn new(state_dir: &Path) -> Self {
        Self {
            state_file: state_path(state_dir),
            lock_file: state_dir.join(".workflow_state.lock"),
        }
    }

    /// Path to the state file.
    pub fn path(&self) -> &Path {
        &self.state_file
    }

    /// Load state under a shared lock. Missing or corrupt files yield a
    /// fresh default state.
    pub fn load(&self) -> Result<WorkflowState> {
        if !self.state_file.exists() {
            return Ok(WorkflowState::fresh());
        }
        let _lock = FileLock::shared(&self.lock_file)?;
        Ok(triadic_io::load_json_or(&self.state_file, WorkflowState::fresh()))
    }

    /// Save state atomically under an exclusive lock.
    pub fn save(&self, state: &WorkflowState) -> Result<()> {
        let _lock = FileLock::exclusive(&self.lock_file)?;
        triadic_io::write_json_atomic(&self.state_file, state)
            .with_context(|| format!("failed to save {}", self.state_file.display()))
    }

    /// Mark a triad completed: validate the name, append without
    /// duplicating, advance the phase, stamp the transition, merge
    /// metadata. The whole cycle runs under one exclusive lock.
    pub fn mark_completed(
        &self,
        triad: &str,
        metadata: Option<Map<String, Value>>,
    ) -> Result<WorkflowState> {
        if !is_valid_triad(triad) {
            bail!(
                "invalid triad '{triad}' (valid: {})",
                VALID_TRIADS.join(", ")
            );
        }

        let _lock = FileLock::exclusive(&self.lock_file)?;

        let mut state = if self.state_file.exists() {
            triadic_io::load_json_or(&self.state_file, WorkflowState::fresh())
        } else {
            WorkflowState::fresh()
        };

        if !state.is_completed(triad) {
            state.completed_triads.push(triad.to_string());
        }
        state.current_phase = Some(triad.to_string());
        state.last_transition = Some(Utc::now().to_rfc3339());
        if let Some(metadata) = metadata {
            for (k, v) in metadata {
                state.metadata.insert(k, v);
            }
        }

        triadic_io::write_json_atomic(&self.state_file, &state)
            .with_context(|| format!("failed to save {}", self.state_file.display()))?;
        Ok(state)
    }

    /// Remove the state file (fresh start after deployment).
    pub fn clear(&self) -> Result<()> {
        if self.state_file.exists() {
            std::fs::remove_file(&self.state_file)
                .with_context(|| format!("failed to remove {}", self.state_file.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn missing_state_loads_fresh_default() {
        let td = tempdir().expect("tempdir");
        let manager = WorkflowStateManager::new(td.path());

        let state = manager.load().expect("load");
        assert!(state.completed_triads.is_empty());
        assert!(state.current_phase.is_none());
        assert!(!state.session_id.is_empty());
    }

    #[test]
    fn corrupt_state_loads_fresh_default() {
        let td = tempdir().expect("tempdir");
        std::fs::write(state_path(td.path()), "{broken").expect("write");

        let manager = WorkflowStateManager::new(td.path());
        let state = manager.load().expect("load");
        assert!(state.completed_triads.is_empty());
    }

    #[test]
    fn mark_completed_appends_and_advances_phase() {
        let td = tempdir().expect("tempdir");
        let manager = WorkflowStateManager::new(td.path());

        let state = manager.mark_completed("design", None).expect("mark");
        assert_eq!(state.completed_triads, vec!["design".to_string()]);
        assert_eq!(state.current_phase.as_deref(), Some("design"));
        assert!(state.last_transition.is_some());
    }

    #[test]
    fn mark_completed_is_idempotent() {
        let td = tempdir().expect("tempdir");
        let manager = WorkflowStateManager::new(td.path());

        manager.mark_completed("design", None).expect("first");
        let state = manager.mark_completed("design", None).expect("second");
        assert_eq!(state.completed_triads.len(), 1);
    }

    #[test]
    fn mark_completed_rejects_unknown_triad() {
        let td = tempdir().expect("tempdir");
        let manager = WorkflowStateManager::new(td.path());
        assert!(manager.mark_completed("shipping", None).is_err());
    }

    #[test]
    fn mark_completed_merges_metadata() {
        let td = tempdir().expect("tempdir");
        let manager = WorkflowStateManager::new(td.path());

        let mut metadata = Map::new();
        metadata.insert("trigger".to_string(), Value::from("user_command"));
        let state = manager
            .mark_completed("implementation", Some(metadata))
            .expect("mark");
        assert_eq!(state.metadata.get("trigger"), Some(&Value::from("user_command")));
    }

    #[test]
    fn state_persists_across_managers() {
        let td = tempdir().expect("tempdir");
        WorkflowStateManager::new(td.path())
            .mark_completed("design", None)
            .expect("mark");

        let state = WorkflowStateManager::new(td.path()).load().expect("load");
        assert!(state.is_completed("design"));
    }

    #[test]
    fn clear_removes_state() {
        let td = tempdir().expect("tempdir");
        let manager = WorkflowStateManager::new(td.path());
        manager.mark_completed("design", None).expect("mark");

        manager.clear().expect("clear");
        assert!(!state_path(td.path()).exists());
    }

    #[test]
    fn transition_graph_is_closed() {
        assert!(is_valid_transition(None, "idea-validation"));
        assert!(!is_valid_transition(None, "design"));
        assert!(is_valid_transition(Some("idea-validation"), "design"));
        assert!(is_valid_transition(Some("design"), "implementation"));
        assert!(is_valid_transition(Some("implementation"), "garden-tending"));
        assert!(is_valid_transition(Some("implementation"), "deployment"));
        assert!(is_valid_transition(Some("garden-tending"), "deployment"));
        assert!(!is_valid_transition(Some("deployment"), "idea-validation"));
        assert!(!is_valid_transition(Some("design"), "deployment"));
        assert!(!is_valid_transition(Some("bogus"), "design"));
    }
}
