//! Safe file I/O primitives for the triadic hook pipeline.
//!
//! Hooks are short-lived processes that share nothing but files, so every
//! write in the system goes through the two primitives in this crate:
//!
//! - **Atomic JSON writes**: write to a temp file in the destination
//!   directory, `sync_all`, then atomically rename over the target. A
//!   reader never observes a torn file.
//! - **Locked JSONL appends**: append one line under an exclusive advisory
//!   lock so concurrent hook processes interleave whole lines, never bytes.
//!
//! Read helpers come in two flavors: strict (`load_json`, for callers that
//! decide recovery themselves) and lenient (`load_json_or`, which logs and
//! returns a default, the contract hooks rely on to never crash).
//!
//! # Example
//!
//! ```
//! use triadic_io::{save_json, load_json_or};
//! use std::collections::BTreeMap;
//!
//! let dir = tempfile::tempdir().expect("tempdir");
//! let path = dir.path().join("state.json");
//!
//! let mut state = BTreeMap::new();
//! state.insert("phase".to_string(), "design".to_string());
//! assert!(save_json(&path, &state));
//!
//! let loaded: BTreeMap<String, String> = load_json_or(&path, BTreeMap::new());
//! assert_eq!(loaded.get("phase").map(String::as_str), Some("design"));
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use fs2::FileExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

/// Resolve a path to an absolute form, canonicalizing the nearest existing
/// ancestor. Rejects paths with no resolvable ancestor (e.g. dangling
/// relative roots), which is how traversal through broken symlinks surfaces.
pub fn resolve_path(path: &Path) -> Result<PathBuf> {
    if let Ok(resolved) = path.canonicalize() {
        return Ok(resolved);
    }

    // Target may not exist yet (first write); resolve the deepest existing
    // ancestor and re-append the remainder.
    let mut existing = path;
    let mut tail = Vec::new();
    loop {
        match existing.parent() {
            Some(parent) => {
                if let Some(name) = existing.file_name() {
                    tail.push(name.to_os_string());
                }
                if parent.as_os_str().is_empty() {
                    // Relative path with no existing ancestor: anchor at cwd.
                    let cwd = std::env::current_dir().context("cannot resolve current dir")?;
                    let mut resolved = cwd;
                    for part in tail.iter().rev() {
                        resolved.push(part);
                    }
                    return Ok(resolved);
                }
                if let Ok(resolved_parent) = parent.canonicalize() {
                    let mut resolved = resolved_parent;
                    for part in tail.iter().rev() {
                        resolved.push(part);
                    }
                    return Ok(resolved);
                }
                existing = parent;
            }
            None => bail!("cannot resolve path {}", path.display()),
        }
    }
}

/// Load and parse a JSON file. Errors carry the path for context.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let resolved = resolve_path(path)?;
    let content = fs::read_to_string(&resolved)
        .with_context(|| format!("failed to read {}", resolved.display()))?;
    let value: T = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse JSON from {}", resolved.display()))?;
    Ok(value)
}

/// Load a JSON file, returning `default` on any error (missing file,
/// malformed JSON, permission, unresolvable path). Errors are logged at
/// `warn` and never propagate; this is the read path hooks use.
pub fn load_json_or<T: DeserializeOwned>(path: &Path, default: T) -> T {
    match load_json(path) {
        Ok(value) => value,
        Err(err) => {
            if path.exists() {
                warn!(path = %path.display(), %err, "falling back to default");
            }
            default
        }
    }
}

/// Write a value as pretty JSON via temp file + fsync + atomic rename.
///
/// The temp file lives in the destination directory so the rename stays on
/// one filesystem. Any failure unlinks the temp file and leaves the
/// destination untouched.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let resolved = resolve_path(path)?;

    if let Some(parent) = resolved.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create dir {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(value).context("value is not JSON-serializable")?;

    let tmp_path = tmp_sibling(&resolved);
    let write_result = (|| -> Result<()> {
        let mut file = File::create(&tmp_path)
            .with_context(|| format!("failed to create temp file {}", tmp_path.display()))?;
        file.write_all(json.as_bytes())
            .with_context(|| format!("failed to write temp file {}", tmp_path.display()))?;
        file.write_all(b"\n")
            .with_context(|| format!("failed to write temp file {}", tmp_path.display()))?;
        file.sync_all()
            .with_context(|| format!("failed to sync temp file {}", tmp_path.display()))?;
        Ok(())
    })();

    if let Err(err) = write_result {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }

    if let Err(err) = fs::rename(&tmp_path, &resolved) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err)
            .with_context(|| format!("failed to rename temp file to {}", resolved.display()));
    }

    Ok(())
}

/// Lenient wrapper over [`write_json_atomic`]: logs and returns `false` on
/// failure instead of propagating.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> bool {
    match write_json_atomic(path, value) {
        Ok(()) => true,
        Err(err) => {
            warn!(path = %path.display(), %err, "atomic JSON write failed");
            false
        }
    }
}

/// Append a single line to a file under an exclusive advisory lock.
///
/// The line is newline-normalized: interior newlines are stripped and
/// exactly one trailing newline is written. The directory is created on
/// demand and the lock is released on every exit path.
pub fn append_line(path: &Path, line: &str) -> Result<()> {
    let resolved = resolve_path(path)?;

    if let Some(parent) = resolved.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create dir {}", parent.display()))?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&resolved)
        .with_context(|| format!("failed to open {}", resolved.display()))?;

    FileExt::lock_exclusive(&file)
        .with_context(|| format!("failed to lock {}", resolved.display()))?;

    let result = (|| -> Result<()> {
        let normalized: String = line.chars().filter(|c| *c != '\n' && *c != '\r').collect();
        let mut writer = &file;
        writeln!(writer, "{normalized}")
            .with_context(|| format!("failed to append to {}", resolved.display()))?;
        file.sync_all()
            .with_context(|| format!("failed to sync {}", resolved.display()))?;
        Ok(())
    })();

    let _ = FileExt::unlock(&file);
    result
}

/// Scoped advisory lock on a file, released on `Drop`.
///
/// Writers take [`FileLock::exclusive`]; readers that need a consistent
/// snapshot take [`FileLock::shared`]. Lock files are created on demand.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Acquire an exclusive advisory lock, blocking until available.
    pub fn exclusive(path: &Path) -> Result<Self> {
        let file = Self::open(path)?;
        FileExt::lock_exclusive(&file)
            .with_context(|| format!("failed to lock {} exclusively", path.display()))?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Acquire a shared advisory lock, blocking until available.
    pub fn shared(path: &Path) -> Result<Self> {
        let file = Self::open(path)?;
        FileExt::lock_shared(&file)
            .with_context(|| format!("failed to lock {} shared", path.display()))?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Path the lock was taken on.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(path: &Path) -> Result<File> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create dir {}", parent.display()))?;
        }
        OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open lock target {}", path.display()))
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());
    path.with_file_name(format!(".tmp_{}_{}", std::process::id(), name))
}
