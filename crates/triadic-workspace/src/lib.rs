//! Ephemeral workspace lifecycle.
//!
//! A workspace is the working directory for one user-visible task: a
//! brief, a state file, metadata, a session event stream, and a
//! scratchpad per triad. At most one workspace is "active" at a time,
//! discovered through a symlink-style marker. The marker is read at most
//! once per hook invocation; the id is passed down by argument after
//! that.
//!
//! Activation is last-writer-wins at the filesystem level: the marker is
//! replaced atomically, and [`WorkspaceManager::set_active`] reports when
//! it displaced a different workspace so the caller can emit a conflict
//! event rather than lose the race silently.
//!
//! # Example
//!
//! ```
//! use triadic_workspace::{Brief, WorkspaceManager};
//!
//! let dir = tempfile::tempdir().expect("tempdir");
//! let manager = WorkspaceManager::new(dir.path());
//!
//! let brief = Brief::feature("OAuth2 Authentication", "Add the OAuth2 login flow");
//! let id = manager.create(&brief).expect("create");
//! assert_eq!(manager.get_active().expect("active"), Some(id));
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

/// Directory of workspaces under the project-level state dir.
pub const WORKSPACES_DIR: &str = "workspaces";

/// Active-workspace marker file name.
pub const ACTIVE_MARKER: &str = ".active";

/// The triads every workspace gets a scratchpad for.
pub const SCRATCHPAD_TRIADS: [&str; 5] = [
    "idea-validation",
    "design",
    "implementation",
    "garden-tending",
    "deployment",
];

/// Workspace status values.
pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_PAUSED: &str = "paused";
pub const STATUS_COMPLETED: &str = "completed";

/// The brief a workspace was opened for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Brief {
    pub brief_type: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Brief {
    /// A feature brief.
    pub fn feature(title: &str, description: &str) -> Self {
        Self::with_type("feature", title, description)
    }

    /// A brief of an arbitrary type (feature, bug, refactor, ...).
    pub fn with_type(brief_type: &str, title: &str, description: &str) -> Self {
        Self {
            brief_type: brief_type.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            acceptance_criteria: Vec::new(),
            extra: Map::new(),
        }
    }
}

/// Per-workspace workflow state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceState {
    pub workspace_id: String,
    pub status: String,
    #[serde(default)]
    pub current_triad: Option<String>,
    #[serde(default)]
    pub completed_triads: Vec<String>,
    pub created_at: String,
    pub last_updated: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_reason: Option<String>,
}

/// Workspace metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceMetadata {
    pub workspace_id: String,
    pub created_at: String,
    #[serde(default)]
    pub session_count: u32,
}

/// A loaded workspace.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub workspace_id: String,
    pub brief: Brief,
    pub state: WorkspaceState,
    pub metadata: WorkspaceMetadata,
}

/// What happened when a workspace was activated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    /// No other workspace was active.
    Fresh,
    /// The same workspace was already active.
    AlreadyActive,
    /// A different workspace was active and has been displaced.
    ReplacedOther { previous: String },
}

/// Generate a workspace id: `workspace-<yyyymmdd>-<hhmmss>-<slug>`.
pub fn generate_workspace_id(title: &str) -> String {
    let now = Utc::now();
    let slug: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .chars()
        .take(40)
        .collect();
    format!("workspace-{}-{}-{slug}", now.format("%Y%m%d"), now.format("%H%M%S"))
}

/// Manager over one workspaces root (e.g. `.triads/`).
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    /// Manager rooted at the workspace state directory.
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// Directory that holds all workspaces.
    pub fn workspaces_dir(&self) -> PathBuf {
        self.root.join(WORKSPACES_DIR)
    }

    /// Path of a specific workspace directory.
    pub fn workspace_path(&self, workspace_id: &str) -> PathBuf {
        self.workspaces_dir().join(workspace_id)
    }

    fn marker_path(&self) -> PathBuf {
        self.root.join(ACTIVE_MARKER)
    }

    /// Create a workspace with its initial files and set it active.
    /// Returns the new workspace id.
    pub fn create(&self, brief: &Brief) -> Result<String> {
        let workspace_id = generate_workspace_id(&brief.title);
        let path = self.workspace_path(&workspace_id);
        fs::create_dir_all(&path)
            .with_context(|| format!("failed to create workspace dir {}", path.display()))?;

        let now = Utc::now().to_rfc3339();
        let state = WorkspaceState {
            workspace_id: workspace_id.clone(),
            status: STATUS_ACTIVE.to_string(),
            current_triad: None,
            completed_triads: Vec::new(),
            created_at: now.clone(),
            last_updated: now.clone(),
            pause_reason: None,
        };
        let metadata = WorkspaceMetadata {
            workspace_id: workspace_id.clone(),
            created_at: now,
            session_count: 1,
        };

        triadic_io::write_json_atomic(&path.join("brief.json"), brief)?;
        triadic_io::write_json_atomic(&path.join("state.json"), &state)?;
        triadic_io::write_json_atomic(&path.join("metadata.json"), &metadata)?;
        fs::write(path.join("sessions.jsonl"), "")
            .with_context(|| format!("failed to create sessions log in {}", path.display()))?;

        for triad in SCRATCHPAD_TRIADS {
            fs::create_dir_all(path.join("scratchpad").join(triad))
                .with_context(|| format!("failed to create scratchpad for {triad}"))?;
        }

        self.set_active(&workspace_id)?;
        Ok(workspace_id)
    }

    /// Load a workspace by id.
    pub fn load(&self, workspace_id: &str) -> Result<Workspace> {
        let path = self.workspace_path(workspace_id);
        if !path.exists() {
            bail!("workspace not found: {workspace_id}");
        }

        Ok(Workspace {
            workspace_id: workspace_id.to_string(),
            brief: triadic_io::load_json(&path.join("brief.json"))?,
            state: triadic_io::load_json(&path.join("state.json"))?,
            metadata: triadic_io::load_json(&path.join("metadata.json"))?,
        })
    }

    /// Point the active marker at a workspace. The replace is atomic; the
    /// return value reports whether another workspace was displaced.
    pub fn set_active(&self, workspace_id: &str) -> Result<Activation> {
        let target = self.workspace_path(workspace_id);
        if !target.exists() {
            bail!("cannot activate missing workspace {workspace_id}");
        }

        let previous = self.get_active()?;
        let marker = self.marker_path();
        if let Some(parent) = marker.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        write_marker(&marker, &target)?;

        match previous {
            None => Ok(Activation::Fresh),
            Some(prev) if prev == workspace_id => Ok(Activation::AlreadyActive),
            Some(prev) => {
                info!(previous = prev, current = workspace_id, "active workspace replaced");
                Ok(Activation::ReplacedOther { previous: prev })
            }
        }
    }

    /// The active workspace id, if a marker exists and resolves.
    pub fn get_active(&self) -> Result<Option<String>> {
        let marker = self.marker_path();
        let Some(target) = read_marker(&marker) else {
            return Ok(None);
        };
        Ok(target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned()))
    }

    /// Remove the active marker without touching the workspace.
    pub fn clear_active(&self) -> Result<()> {
        let marker = self.marker_path();
        if marker.exists() || marker.is_symlink() {
            fs::remove_file(&marker)
                .with_context(|| format!("failed to remove marker {}", marker.display()))?;
        }
        Ok(())
    }

    /// Mark a workspace paused with a reason.
    pub fn mark_paused(&self, workspace_id: &str, reason: &str) -> Result<()> {
        self.update_status(workspace_id, STATUS_PAUSED, Some(reason))
    }

    /// Mark a workspace completed.
    pub fn mark_completed(&self, workspace_id: &str) -> Result<()> {
        self.update_status(workspace_id, STATUS_COMPLETED, None)
    }

    /// Pause the active workspace if it is currently `active`. Returns the
    /// paused workspace id when a pause happened. Used by the session-end
    /// hook; failures are the caller's to swallow.
    pub fn pause_active(&self, reason: &str) -> Result<Option<String>> {
        let Some(workspace_id) = self.get_active()? else {
            return Ok(None);
        };
        let workspace = self.load(&workspace_id)?;
        if workspace.state.status != STATUS_ACTIVE {
            return Ok(None);
        }
        self.mark_paused(&workspace_id, reason)?;
        Ok(Some(workspace_id))
    }

    /// Append one line to the workspace's session event stream.
    pub fn append_session_event(&self, workspace_id: &str, line: &str) -> Result<()> {
        triadic_io::append_line(&self.workspace_path(workspace_id).join("sessions.jsonl"), line)
    }

    /// Scratchpad directory for a triad within a workspace.
    pub fn scratchpad(&self, workspace_id: &str, triad: &str) -> PathBuf {
        self.workspace_path(workspace_id).join("scratchpad").join(triad)
    }

    fn update_status(&self, workspace_id: &str, status: &str, reason: Option<&str>) -> Result<()> {
        let state_file = self.workspace_path(workspace_id).join("state.json");
        let mut state: WorkspaceState = triadic_io::load_json(&state_file)?;

        state.status = status.to_string();
        state.last_updated = Utc::now().to_rfc3339();
        state.pause_reason = reason.map(String::from);

        triadic_io::write_json_atomic(&state_file, &state)
    }
}

#[cfg(unix)]
fn write_marker(marker: &Path, target: &Path) -> Result<()> {
    use std::os::unix::fs::symlink;

    // Build the new link at a temp name and rename over the marker so a
    // concurrent reader sees either the old target or the new one.
    let tmp = marker.with_file_name(format!(".active.tmp_{}", std::process::id()));
    let _ = fs::remove_file(&tmp);
    symlink(target, &tmp)
        .with_context(|| format!("failed to create marker link {}", tmp.display()))?;
    fs::rename(&tmp, marker)
        .with_context(|| format!("failed to replace marker {}", marker.display()))?;
    Ok(())
}

#[cfg(not(unix))]
fn write_marker(marker: &Path, target: &Path) -> Result<()> {
    // Plain file carrying the target path where symlinks are unavailable.
    triadic_io::write_json_atomic(marker, &target.to_string_lossy().into_owned())
}

#[cfg(unix)]
fn read_marker(marker: &Path) -> Option<PathBuf> {
    fs::read_link(marker).ok()
}

#[cfg(not(unix))]
fn read_marker(marker: &Path) -> Option<PathBuf> {
    let target: String = triadic_io::load_json(marker).ok()?;
    Some(PathBuf::from(target))
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn manager() -> (tempfile::TempDir, WorkspaceManager) {
        let td = tempdir().expect("tempdir");
        let manager = WorkspaceManager::new(td.path());
        (td, manager)
    }

    #[test]
    fn workspace_id_has_date_prefix_and_slug() {
        let id = generate_workspace_id("OAuth2 Authentication!");
        assert!(id.starts_with("workspace-"));
        assert!(id.ends_with("oauth2-authentication"));
    }

    #[test]
    fn slug_is_capped_at_forty_chars() {
        let long = "a very long workspace title that keeps going and going and going";
        let id = generate_workspace_id(long);
        let slug = id.splitn(4, '-').nth(3).expect("slug");
        assert!(slug.len() <= 40);
    }

    #[test]
    fn create_builds_full_layout() {
        let (_td, manager) = manager();
        let id = manager.create(&Brief::feature("Test Flow", "desc")).expect("create");

        let path = manager.workspace_path(&id);
        assert!(path.join("brief.json").exists());
        assert!(path.join("state.json").exists());
        assert!(path.join("metadata.json").exists());
        assert!(path.join("sessions.jsonl").exists());
        for triad in SCRATCHPAD_TRIADS {
            assert!(path.join("scratchpad").join(triad).is_dir());
        }
    }

    #[test]
    fn create_sets_workspace_active() {
        let (_td, manager) = manager();
        let id = manager.create(&Brief::feature("Test", "d")).expect("create");
        assert_eq!(manager.get_active().expect("active"), Some(id));
    }

    #[test]
    fn load_round_trips_brief_and_state() {
        let (_td, manager) = manager();
        let id = manager.create(&Brief::feature("Round Trip", "desc")).expect("create");

        let workspace = manager.load(&id).expect("load");
        assert_eq!(workspace.brief.title, "Round Trip");
        assert_eq!(workspace.state.status, STATUS_ACTIVE);
        assert_eq!(workspace.metadata.session_count, 1);
    }

    #[test]
    fn load_missing_workspace_errors() {
        let (_td, manager) = manager();
        assert!(manager.load("workspace-00000000-000000-nope").is_err());
    }

    #[test]
    fn activation_reports_displacement() {
        let (_td, manager) = manager();
        let first = manager.create(&Brief::feature("First", "d")).expect("create");
        let second = manager.create(&Brief::feature("Second", "d")).expect("create");

        // create() already activated `second`; flipping back reports it.
        let activation = manager.set_active(&first).expect("activate");
        assert_eq!(
            activation,
            Activation::ReplacedOther { previous: second }
        );

        let again = manager.set_active(&first).expect("activate");
        assert_eq!(again, Activation::AlreadyActive);
    }

    #[test]
    fn get_active_without_marker_is_none() {
        let (_td, manager) = manager();
        assert_eq!(manager.get_active().expect("active"), None);
    }

    #[test]
    fn clear_active_removes_marker() {
        let (_td, manager) = manager();
        manager.create(&Brief::feature("Test", "d")).expect("create");
        manager.clear_active().expect("clear");
        assert_eq!(manager.get_active().expect("active"), None);
    }

    #[test]
    fn pause_active_only_touches_active_workspaces() {
        let (_td, manager) = manager();
        let id = manager.create(&Brief::feature("Pause Me", "d")).expect("create");

        let paused = manager.pause_active("Session ended (auto-pause)").expect("pause");
        assert_eq!(paused, Some(id.clone()));

        let state = manager.load(&id).expect("load").state;
        assert_eq!(state.status, STATUS_PAUSED);
        assert_eq!(state.pause_reason.as_deref(), Some("Session ended (auto-pause)"));

        // Already paused: second pause is a no-op.
        let paused = manager.pause_active("again").expect("pause");
        assert_eq!(paused, None);
    }

    #[test]
    fn mark_completed_updates_status() {
        let (_td, manager) = manager();
        let id = manager.create(&Brief::feature("Done", "d")).expect("create");

        manager.mark_completed(&id).expect("complete");
        let state = manager.load(&id).expect("load").state;
        assert_eq!(state.status, STATUS_COMPLETED);
    }

    #[test]
    fn session_events_append() {
        let (_td, manager) = manager();
        let id = manager.create(&Brief::feature("Log", "d")).expect("create");

        manager
            .append_session_event(&id, r#"{"event":"started"}"#)
            .expect("append");
        manager
            .append_session_event(&id, r#"{"event":"stopped"}"#)
            .expect("append");

        let content = fs::read_to_string(manager.workspace_path(&id).join("sessions.jsonl"))
            .expect("read");
        assert_eq!(content.lines().count(), 2);
    }
}
