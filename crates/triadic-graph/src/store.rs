//! Graph discovery, caching, backups, and the save protocol.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::{info, warn};
use triadic_io::FileLock;

use crate::model::{GraphDoc, KnowledgeGraph};
use crate::validate::validate_graph;

/// Suffix every graph file carries: `<triad>_graph.json`.
pub const GRAPH_SUFFIX: &str = "_graph.json";

/// Subdirectory holding timestamped graph backups.
pub const BACKUPS_DIR: &str = "backups";

/// Backups kept per triad; older ones are pruned.
pub const BACKUP_KEEP: usize = 10;

/// Triad names are lowercase slugs: `^[a-z0-9][a-z0-9_-]*$`. Anything else
/// (uppercase, path separators, leading punctuation) is rejected, which is
/// also the path-traversal guard for graph file discovery.
pub fn is_valid_triad_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

/// File name for a triad's graph.
pub fn graph_file_name(triad: &str) -> String {
    format!("{triad}{GRAPH_SUFFIX}")
}

#[derive(Debug, Clone)]
struct CachedGraph {
    graph: KnowledgeGraph,
    mtime: Option<SystemTime>,
}

/// Timestamped backup manager for one graphs directory.
#[derive(Debug, Clone)]
pub struct BackupManager {
    backups_dir: PathBuf,
    keep: usize,
}

impl BackupManager {
    /// Manager writing under `<graphs_dir>/backups/`.
    pub fn new(graphs_dir: &Path) -> Self {
        Self {
            backups_dir: graphs_dir.join(BACKUPS_DIR),
            keep: BACKUP_KEEP,
        }
    }

    /// Override how many backups are kept per triad.
    pub fn with_keep(mut self, keep: usize) -> Self {
        self.keep = keep;
        self
    }

    /// Copy the current graph file (if any) to a timestamped backup and
    /// prune old ones. Returns the backup path when one was made.
    pub fn backup(&self, triad: &str, graph_path: &Path) -> Result<Option<PathBuf>> {
        if !graph_path.exists() {
            return Ok(None);
        }

        fs::create_dir_all(&self.backups_dir)
            .with_context(|| format!("failed to create {}", self.backups_dir.display()))?;

        // Millisecond precision keeps rapid successive saves distinct.
        let stamp = Utc::now().format("%Y%m%d_%H%M%S_%3f");
        let backup_path = self
            .backups_dir
            .join(format!("{triad}_graph_{stamp}.json.backup"));

        fs::copy(graph_path, &backup_path).with_context(|| {
            format!("failed to back up {} to {}", graph_path.display(), backup_path.display())
        })?;

        self.prune(triad);
        Ok(Some(backup_path))
    }

    /// Most recent backup for a triad, if any.
    pub fn latest(&self, triad: &str) -> Option<PathBuf> {
        let mut backups = self.list(triad);
        backups.pop()
    }

    /// Restore the freshest backup over the graph file. Returns `true`
    /// when a backup existed and was restored.
    pub fn restore_latest(&self, triad: &str, graph_path: &Path) -> Result<bool> {
        let Some(backup) = self.latest(triad) else {
            return Ok(false);
        };
        fs::copy(&backup, graph_path).with_context(|| {
            format!("failed to restore {} from {}", graph_path.display(), backup.display())
        })?;
        info!(triad, backup = %backup.display(), "restored graph from backup");
        Ok(true)
    }

    fn list(&self, triad: &str) -> Vec<PathBuf> {
        let prefix = format!("{triad}_graph_");
        let Ok(entries) = fs::read_dir(&self.backups_dir) else {
            return Vec::new();
        };
        let mut backups: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .map(|n| {
                        let name = n.to_string_lossy();
                        name.starts_with(&prefix) && name.ends_with(".json.backup")
                    })
                    .unwrap_or(false)
            })
            .collect();
        backups.sort();
        backups
    }

    fn prune(&self, triad: &str) {
        let mut backups = self.list(triad);
        while backups.len() > self.keep {
            let oldest = backups.remove(0);
            if let Err(err) = fs::remove_file(&oldest) {
                warn!(path = %oldest.display(), %err, "failed to prune graph backup");
            }
        }
    }
}

/// Loader, cache, and writer for the graphs directory.
///
/// The cache is per-process (hooks are single-threaded, short-lived) and
/// invalidates on file-mtime change or explicit [`GraphStore::refresh`].
#[derive(Debug)]
pub struct GraphStore {
    dir: PathBuf,
    backups: BackupManager,
    cache: HashMap<String, CachedGraph>,
}

impl GraphStore {
    /// Store over a graphs directory. The directory need not exist yet.
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            backups: BackupManager::new(dir),
            cache: HashMap::new(),
        }
    }

    /// The graphs directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The backup manager for this directory.
    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    /// Absolute path of a triad's graph file.
    pub fn graph_path(&self, triad: &str) -> PathBuf {
        self.dir.join(graph_file_name(triad))
    }

    /// Drop all cached graphs.
    pub fn refresh(&mut self) {
        self.cache.clear();
    }

    /// Triads that have a graph file, sorted. Files whose stem is not a
    /// valid triad name are ignored.
    pub fn list_triads(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("failed to read graphs dir {}", self.dir.display()))?;

        let mut triads: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                let triad = name.strip_suffix(GRAPH_SUFFIX)?.to_string();
                is_valid_triad_name(&triad).then_some(triad)
            })
            .collect();
        triads.sort();
        Ok(triads)
    }

    /// Load a triad's graph, from cache when the file is unchanged.
    /// A missing file yields an empty graph.
    pub fn load(&mut self, triad: &str) -> Result<KnowledgeGraph> {
        if !is_valid_triad_name(triad) {
            bail!("invalid triad name '{triad}'");
        }

        let path = self.graph_path(triad);
        let mtime = fs::metadata(&path).and_then(|m| m.modified()).ok();

        if let Some(cached) = self.cache.get(triad)
            && cached.mtime == mtime
        {
            return Ok(cached.graph.clone());
        }

        let graph = if path.exists() {
            let _lock = FileLock::shared(&path)?;
            let doc: GraphDoc = triadic_io::load_json(&path)?;
            KnowledgeGraph::from_doc(doc)
        } else {
            KnowledgeGraph::default()
        };

        self.cache.insert(
            triad.to_string(),
            CachedGraph {
                graph: graph.clone(),
                mtime,
            },
        );
        Ok(graph)
    }

    /// Save a triad's graph under the full protocol: validate, back up,
    /// atomic-write under an exclusive lock, restore on failure.
    ///
    /// Validation failures surface as [`crate::ValidationError`]
    /// (downcastable from the returned error) and leave the file untouched.
    pub fn save(&mut self, triad: &str, graph: &KnowledgeGraph) -> Result<()> {
        if !is_valid_triad_name(triad) {
            bail!("invalid triad name '{triad}'");
        }

        validate_graph(graph)?;

        let path = self.graph_path(triad);
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create graphs dir {}", self.dir.display()))?;

        let backup = self.backups.backup(triad, &path)?;

        let lock_path = self.dir.join(format!(".{triad}.lock"));
        let _lock = FileLock::exclusive(&lock_path)?;

        if let Err(err) = triadic_io::write_json_atomic(&path, &graph.to_doc()) {
            // The atomic rename means the destination should be intact, but
            // restore anyway and report what happened.
            let restored = backup.is_some()
                && self
                    .backups
                    .restore_latest(triad, &path)
                    .unwrap_or(false);
            self.cache.remove(triad);
            return Err(err.context(format!(
                "failed to save graph '{triad}' (backup restored: {restored})"
            )));
        }

        let mtime = fs::metadata(&path).and_then(|m| m.modified()).ok();
        self.cache.insert(
            triad.to_string(),
            CachedGraph {
                graph: graph.clone(),
                mtime,
            },
        );
        Ok(())
    }
}
