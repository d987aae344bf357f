//! Git-backed code metrics.
//!
//! Shells out to `git diff --numstat` and `git diff --name-status` under a
//! hard timeout. Binary files (numstat `-`) are skipped. Outside a git
//! repository the provider reports an empty result, which never triggers
//! enforcement.

use std::collections::HashSet;
use std::process::Command;
use std::time::Duration;

use serde_json::Value;

use crate::metrics::{
    ContentCreated, MetricsContext, MetricsError, MetricsProvider, MetricsResult,
    classify_complexity,
};
use crate::proc::{self, run_with_timeout};

/// Path prefixes whose newly added files count as new features.
const FEATURE_PREFIXES: [&str; 3] = ["src/", "features/", "lib/"];

/// Parsed `git diff --numstat` totals.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NumstatSummary {
    pub lines_changed: u64,
    pub files_changed: u64,
    pub binary_files_skipped: u64,
}

/// Parse numstat output: `<added>\t<deleted>\t<path>` per line, `-` for
/// binary files. Lines changed counts additions plus deletions.
pub fn parse_numstat(output: &str) -> NumstatSummary {
    let mut summary = NumstatSummary::default();
    let mut files: HashSet<&str> = HashSet::new();

    for line in output.lines() {
        let mut parts = line.splitn(3, '\t');
        let (Some(added), Some(deleted), Some(path)) = (parts.next(), parts.next(), parts.next())
        else {
            continue;
        };

        if added == "-" || deleted == "-" {
            summary.binary_files_skipped += 1;
            continue;
        }

        let (Ok(added), Ok(deleted)) = (added.parse::<u64>(), deleted.parse::<u64>()) else {
            continue;
        };

        summary.lines_changed += added + deleted;
        files.insert(path);
    }

    summary.files_changed = files.len() as u64;
    summary
}

/// Paths newly added (`A` status) from `git diff --name-status` output.
pub fn parse_added_paths(output: &str) -> Vec<&str> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.splitn(2, '\t');
            let status = parts.next()?;
            let path = parts.next()?;
            status.starts_with('A').then_some(path)
        })
        .collect()
}

/// Whether any added path lands in a feature-bearing directory.
pub fn has_new_features(added_paths: &[&str]) -> bool {
    added_paths
        .iter()
        .any(|p| FEATURE_PREFIXES.iter().any(|prefix| p.starts_with(prefix)))
}

/// Git-backed provider for the "code" domain.
#[derive(Debug, Clone)]
pub struct CodeMetricsProvider {
    timeout: Duration,
}

impl CodeMetricsProvider {
    /// Provider with the default 30 s subprocess timeout.
    pub fn new() -> Self {
        Self {
            timeout: proc::DEFAULT_TIMEOUT,
        }
    }

    /// Override the subprocess timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn git(&self, context: &MetricsContext, args: &[&str]) -> Result<String, MetricsError> {
        let mut command = Command::new("git");
        command.args(args).current_dir(&context.dir);

        let output = run_with_timeout(command, self.timeout).map_err(|e| {
            if e.to_string().contains("timed out") {
                MetricsError::Timeout(format!("git {}", args.join(" ")))
            } else {
                MetricsError::Provider(format!("git {}: {e:#}", args.join(" ")))
            }
        })?;

        if !output.status_success {
            return Err(MetricsError::Provider(format!(
                "git {} failed: {}",
                args.join(" "),
                output.stderr.trim()
            )));
        }
        Ok(output.stdout)
    }

    fn in_git_repo(&self, context: &MetricsContext) -> bool {
        self.git(context, &["rev-parse", "--git-dir"]).is_ok()
    }
}

impl Default for CodeMetricsProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsProvider for CodeMetricsProvider {
    fn domain(&self) -> &str {
        "code"
    }

    fn calculate(&self, context: &MetricsContext) -> Result<MetricsResult, MetricsError> {
        if !self.in_git_repo(context) {
            let mut result = MetricsResult::empty("code", "lines");
            result
                .raw_data
                .insert("git_available".to_string(), Value::from(false));
            return Ok(result);
        }

        let numstat = self.git(
            context,
            &["diff", "--numstat", &context.base_ref, "HEAD"],
        )?;
        let summary = parse_numstat(&numstat);

        let name_status = self.git(
            context,
            &["diff", "--name-status", &context.base_ref, "HEAD"],
        )?;
        let added = parse_added_paths(&name_status);
        let new_features = has_new_features(&added);

        // Untracked files are reported for auditing but do not count
        // toward the diff totals.
        let untracked_count = self
            .git(context, &["ls-files", "--others", "--exclude-standard"])
            .map(|out| out.lines().filter(|l| !l.is_empty()).count())
            .unwrap_or(0);

        let mut result = MetricsResult {
            content_created: ContentCreated {
                content_type: "code".to_string(),
                quantity: summary.lines_changed,
                units: "lines".to_string(),
            },
            components_modified: summary.files_changed,
            complexity: classify_complexity(summary.lines_changed, summary.files_changed),
            raw_data: serde_json::Map::new(),
        };
        result
            .raw_data
            .insert("git_available".to_string(), Value::from(true));
        result
            .raw_data
            .insert("base_ref".to_string(), Value::from(context.base_ref.clone()));
        result
            .raw_data
            .insert("has_new_features".to_string(), Value::from(new_features));
        result.raw_data.insert(
            "binary_files_skipped".to_string(),
            Value::from(summary.binary_files_skipped),
        );
        result
            .raw_data
            .insert("untracked_files".to_string(), Value::from(untracked_count));

        Ok(result)
    }
}
