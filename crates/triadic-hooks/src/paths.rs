//! Project directory discovery and the persisted state layout.

use std::path::{Path, PathBuf};

/// Project-level state directory (hook registration, graphs, events).
pub const CLAUDE_DIR: &str = ".claude";

/// Workspace state directory.
pub const TRIADS_DIR: &str = ".triads";

/// Resolved locations of everything the hooks persist.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    project_dir: PathBuf,
}

impl ProjectPaths {
    /// Discover the project directory: `CLAUDE_PROJECT_DIR`, then `PWD`,
    /// then the process working directory.
    pub fn discover() -> Self {
        let project_dir = std::env::var_os("CLAUDE_PROJECT_DIR")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("PWD").map(PathBuf::from))
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        Self { project_dir }
    }

    /// Paths rooted at an explicit project directory.
    pub fn at(project_dir: &Path) -> Self {
        Self {
            project_dir: project_dir.to_path_buf(),
        }
    }

    /// The project root.
    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// `.claude/` state directory.
    pub fn claude_dir(&self) -> PathBuf {
        self.project_dir.join(CLAUDE_DIR)
    }

    /// `.claude/graphs/` knowledge graph directory.
    pub fn graphs_dir(&self) -> PathBuf {
        self.claude_dir().join("graphs")
    }

    /// `.triads/` workspace root.
    pub fn triads_dir(&self) -> PathBuf {
        self.project_dir.join(TRIADS_DIR)
    }

    /// `.claude/events.jsonl` primary event log.
    pub fn events_path(&self) -> PathBuf {
        triadic_events::events_path(&self.claude_dir())
    }

    /// `.claude/km_queue.json` knowledge issue queue.
    pub fn km_queue_path(&self) -> PathBuf {
        self.claude_dir().join("km_queue.json")
    }

    /// `.claude/settings.json` hook registration file.
    pub fn settings_path(&self) -> PathBuf {
        self.claude_dir().join("settings.json")
    }
}
