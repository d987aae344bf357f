//! Inject-or-block decision and output formatting.
//!
//! The policy is "mostly silent, rarely block". Blocking needs all of:
//! the top-ranked item is CRITICAL, its confidence clears the block
//! threshold, and the operation is actually risky: a write-class tool
//! touching a file the lesson's patterns cover, a point-of-no-return
//! shell command, or near-certain knowledge (confidence >= 0.95).
//! Read-only tools never block, whatever the knowledge says.

use crate::knowledge::Priority;
use crate::query::{EngineConfig, ScoredKnowledge, ToolContext};

/// Tools that mutate files.
pub const WRITE_TOOLS: [&str; 4] = ["Write", "Edit", "MultiEdit", "NotebookEdit"];

/// Tools that cannot cause harm and are never interrupted.
pub const READ_ONLY_TOOLS: [&str; 3] = ["Read", "Grep", "Glob"];

/// Confidence at which a CRITICAL warning blocks regardless of operation.
pub const CERTAIN_CONFIDENCE: f64 = 0.95;

/// Command prefixes treated as point-of-no-return.
pub const DEFAULT_RISKY_COMMANDS: [&str; 5] =
    ["git commit", "git push", "rm ", "npm publish", "cargo publish"];

/// What the pre-tool hook should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Exit 2: write the interjection to stderr; the tool does not run.
    Block(String),
    /// Exit 0: emit the context via the additional-context channel.
    Inject(String),
    /// Exit 0: say nothing.
    Silent,
}

/// Decision policy with its configurable risky-command list.
#[derive(Debug, Clone)]
pub struct DecisionPolicy {
    config: EngineConfig,
    risky_commands: Vec<String>,
}

impl DecisionPolicy {
    /// Policy with the default risky-command list.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            risky_commands: DEFAULT_RISKY_COMMANDS.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Replace the risky-command prefixes.
    pub fn with_risky_commands(mut self, commands: Vec<String>) -> Self {
        self.risky_commands = commands;
        self
    }

    /// Decide what to do with the ranked knowledge for this invocation.
    pub fn decide(&self, ctx: &ToolContext, ranked: &[ScoredKnowledge]) -> Decision {
        if self.config.disable_experience || ranked.is_empty() {
            return Decision::Silent;
        }

        if !self.config.disable_block
            && !READ_ONLY_TOOLS.contains(&ctx.tool_name.as_str())
            && self.should_block(ctx, &ranked[0])
        {
            return Decision::Block(format_interjection(&ranked[0]));
        }

        Decision::Inject(format_injection(ranked))
    }

    fn should_block(&self, ctx: &ToolContext, top: &ScoredKnowledge) -> bool {
        if top.knowledge.priority != Priority::Critical {
            return false;
        }
        if top.knowledge.confidence < self.config.block_threshold {
            return false;
        }
        self.is_risky(ctx, top)
    }

    fn is_risky(&self, ctx: &ToolContext, top: &ScoredKnowledge) -> bool {
        if WRITE_TOOLS.contains(&ctx.tool_name.as_str()) && top.file_matched {
            return true;
        }
        if let Some(command) = ctx.command() {
            let trimmed = command.trim_start();
            if self.risky_commands.iter().any(|p| trimmed.starts_with(p)) {
                return true;
            }
        }
        top.knowledge.confidence >= CERTAIN_CONFIDENCE
    }
}

/// User-style interjection for the blocking path (stderr, exit 2).
pub fn format_interjection(top: &ScoredKnowledge) -> String {
    let mut out = String::new();
    out.push_str("⚠️  Hold on - before you do that, a reminder from experience:\n\n");
    out.push_str(&format!(
        "**{}** ({})\n",
        top.knowledge.label,
        top.knowledge.priority.as_str()
    ));
    if let Some(content) = &top.knowledge.content {
        for line in content.lines() {
            out.push_str(&format!("  {line}\n"));
        }
    }
    out.push_str("\nCan you make sure this is covered? It has caused issues before.\n");
    out.push_str("(This reminder came from the experience-based learning system.)\n");
    out
}

/// Compact context list for the non-blocking path.
pub fn format_injection(ranked: &[ScoredKnowledge]) -> String {
    let mut out = String::from("📚 Relevant experience:\n");
    for item in ranked {
        out.push_str(&format!(
            "• **{}** ({})",
            item.knowledge.label,
            item.knowledge.priority.as_str()
        ));
        if let Some(content) = &item.knowledge.content {
            let first_line = content.lines().next().unwrap_or_default();
            if !first_line.is_empty() {
                out.push_str(&format!("\n  {first_line}"));
            }
        }
        out.push('\n');
    }
    out
}
