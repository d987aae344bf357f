//! Fail-safe event capture for hooks.
//!
//! This is the only write path hooks use directly. It never returns an
//! error: a capture either lands in the log or is dropped (and the drop is
//! logged to stderr). Hooks must not crash the host, so every failure mode
//! here degrades to `false`.
//!
//! Rate-limit state is derived from the log file itself rather than a
//! side-car state file: each hook process is short-lived, so an in-memory
//! counter would reset on every invocation. One pass over the file yields
//! the line count (needed for rotation anyway) and the current-minute
//! count for the capturing hook.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use tracing::{info, warn};

use crate::models::Event;

/// Default per-hook events per minute.
pub const RATE_LIMIT_PER_MINUTE: usize = 100;
/// Rotation threshold: file size in bytes (10 MiB).
pub const MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;
/// Rotation threshold: line count.
pub const MAX_EVENTS_PER_FILE: usize = 10_000;
/// Rotated backups kept; older ones are pruned.
pub const BACKUP_KEEP: usize = 5;

const VIOLATION_PREDICATE: &str = "rate_limit_violation";

/// Keys whose values are redacted before an event is written.
const SENSITIVE_KEYS: [&str; 6] = ["password", "token", "api_key", "secret", "credential", "auth"];

/// Replace sensitive values in a detail payload, recursively.
pub fn sanitize_object(data: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::new();
    for (key, value) in data {
        let lowered = key.to_lowercase();
        if SENSITIVE_KEYS.iter().any(|s| lowered.contains(s)) {
            out.insert(key.clone(), json!("[REDACTED]"));
        } else if let Value::Object(inner) = value {
            out.insert(key.clone(), Value::Object(sanitize_object(inner)));
        } else {
            out.insert(key.clone(), value.clone());
        }
    }
    out
}

/// Event capture handle for one events file.
#[derive(Debug, Clone)]
pub struct EventCapture {
    events_path: PathBuf,
    rate_limit_per_minute: usize,
    max_file_bytes: u64,
    max_lines: usize,
    backup_keep: usize,
}

struct LogScan {
    line_count: usize,
    hook_events_this_minute: usize,
    violation_this_minute: bool,
}

impl EventCapture {
    /// Capture handle with production thresholds.
    pub fn new(events_path: &Path) -> Self {
        Self {
            events_path: events_path.to_path_buf(),
            rate_limit_per_minute: RATE_LIMIT_PER_MINUTE,
            max_file_bytes: MAX_FILE_BYTES,
            max_lines: MAX_EVENTS_PER_FILE,
            backup_keep: BACKUP_KEEP,
        }
    }

    /// Override the per-minute rate limit.
    pub fn with_rate_limit(mut self, limit: usize) -> Self {
        self.rate_limit_per_minute = limit;
        self
    }

    /// Override the rotation thresholds.
    pub fn with_rotation(mut self, max_bytes: u64, max_lines: usize) -> Self {
        self.max_file_bytes = max_bytes;
        self.max_lines = max_lines;
        self
    }

    /// Path to the events file.
    pub fn events_path(&self) -> &Path {
        &self.events_path
    }

    /// Capture one event. Returns `true` if the event was written, `false`
    /// if it was dropped (rate limit, serialization, I/O). Never panics,
    /// never returns an error.
    pub fn capture(
        &self,
        hook_name: &str,
        predicate: &str,
        object_data: Map<String, Value>,
        workspace_id: Option<&str>,
    ) -> bool {
        match self.try_capture(hook_name, predicate, object_data, workspace_id) {
            Ok(written) => written,
            Err(err) => {
                warn!(hook = hook_name, %err, "event capture failed");
                false
            }
        }
    }

    /// Capture an execution event, enriching the payload with elapsed time.
    pub fn capture_execution(
        &self,
        hook_name: &str,
        start: Instant,
        object_data: Map<String, Value>,
        workspace_id: Option<&str>,
    ) -> bool {
        self.capture_timed(hook_name, "executed", start, object_data, workspace_id)
    }

    /// Capture a failure event carrying the error chain.
    pub fn capture_error(
        &self,
        hook_name: &str,
        start: Instant,
        error: &anyhow::Error,
        workspace_id: Option<&str>,
    ) -> bool {
        let mut data = Map::new();
        data.insert("error_type".to_string(), json!(classify_error(error)));
        data.insert("error_message".to_string(), json!(format!("{error:#}")));
        self.capture_timed(hook_name, "failed", start, data, workspace_id)
    }

    fn capture_timed(
        &self,
        hook_name: &str,
        predicate: &str,
        start: Instant,
        mut object_data: Map<String, Value>,
        workspace_id: Option<&str>,
    ) -> bool {
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        object_data.insert("execution_time_ms".to_string(), json!(elapsed_ms));
        self.capture(hook_name, predicate, object_data, workspace_id)
    }

    fn try_capture(
        &self,
        hook_name: &str,
        predicate: &str,
        object_data: Map<String, Value>,
        workspace_id: Option<&str>,
    ) -> Result<bool> {
        let now = Utc::now();
        let scan = self.scan_log(hook_name, now)?;

        if scan.hook_events_this_minute >= self.rate_limit_per_minute {
            warn!(
                hook = hook_name,
                limit = self.rate_limit_per_minute,
                "rate limit exceeded, dropping event"
            );
            if !scan.violation_this_minute {
                self.append_event(self.violation_event(hook_name))?;
            }
            return Ok(false);
        }

        if self.should_rotate(scan.line_count)? {
            self.rotate()?;
        }

        let mut event = Event::new("hook", predicate, object_data).with_hook(hook_name);
        if let Some(ws) = workspace_id {
            event = event.with_workspace(ws);
        }
        event
            .metadata
            .insert("version".to_string(), json!(env!("CARGO_PKG_VERSION")));

        self.append_event(event)?;
        Ok(true)
    }

    fn violation_event(&self, hook_name: &str) -> Event {
        let mut data = Map::new();
        data.insert("hook".to_string(), json!(hook_name));
        data.insert(
            "limit_per_minute".to_string(),
            json!(self.rate_limit_per_minute),
        );
        data.insert("action".to_string(), json!("event_dropped"));
        Event::new("hook", VIOLATION_PREDICATE, data).with_hook(hook_name)
    }

    fn append_event(&self, event: Event) -> Result<()> {
        let line = serde_json::to_string(&event).context("serialize event")?;
        triadic_io::append_line(&self.events_path, &line)
            .with_context(|| format!("append to {}", self.events_path.display()))
    }

    fn scan_log(&self, hook_name: &str, now: DateTime<Utc>) -> Result<LogScan> {
        let mut scan = LogScan {
            line_count: 0,
            hook_events_this_minute: 0,
            violation_this_minute: false,
        };

        if !self.events_path.exists() {
            return Ok(scan);
        }

        let content = fs::read_to_string(&self.events_path)
            .with_context(|| format!("read {}", self.events_path.display()))?;
        let current_minute = now.timestamp().div_euclid(60);

        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            scan.line_count += 1;

            let Ok(event) = serde_json::from_str::<Event>(line) else {
                continue;
            };
            if event.hook_name.as_deref() != Some(hook_name) {
                continue;
            }
            if event.timestamp.timestamp().div_euclid(60) != current_minute {
                continue;
            }
            if event.predicate == VIOLATION_PREDICATE {
                scan.violation_this_minute = true;
            } else {
                scan.hook_events_this_minute += 1;
            }
        }

        Ok(scan)
    }

    fn should_rotate(&self, line_count: usize) -> Result<bool> {
        if !self.events_path.exists() {
            return Ok(false);
        }
        let meta = fs::metadata(&self.events_path)
            .with_context(|| format!("stat {}", self.events_path.display()))?;
        Ok(meta.len() >= self.max_file_bytes || line_count >= self.max_lines)
    }

    fn rotate(&self) -> Result<()> {
        let stamp = Utc::now().format("%Y%m%d_%H%M%S");
        let file_name = self
            .events_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "events.jsonl".to_string());
        let backup = self
            .events_path
            .with_file_name(format!("{file_name}.backup_{stamp}"));

        fs::rename(&self.events_path, &backup)
            .with_context(|| format!("rotate {} to {}", self.events_path.display(), backup.display()))?;
        info!(backup = %backup.display(), "rotated events file");

        self.prune_backups(&file_name);
        Ok(())
    }

    fn prune_backups(&self, file_name: &str) {
        let Some(dir) = self.events_path.parent() else {
            return;
        };
        let prefix = format!("{file_name}.backup_");

        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };
        let mut backups: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy().starts_with(&prefix))
                    .unwrap_or(false)
            })
            .collect();

        // Timestamp suffix sorts lexicographically; newest last.
        backups.sort();
        while backups.len() > self.backup_keep {
            let oldest = backups.remove(0);
            match fs::remove_file(&oldest) {
                Ok(()) => info!(pruned = %oldest.display(), "pruned old events backup"),
                Err(err) => warn!(path = %oldest.display(), %err, "failed to prune backup"),
            }
        }
    }
}

fn classify_error(error: &anyhow::Error) -> &'static str {
    if error.root_cause().downcast_ref::<std::io::Error>().is_some() {
        "io"
    } else if error
        .root_cause()
        .downcast_ref::<serde_json::Error>()
        .is_some()
    {
        "serialization"
    } else {
        "runtime"
    }
}
