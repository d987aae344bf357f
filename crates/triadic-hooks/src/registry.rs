//! Hook registry: the settings block that wires all ten lifecycle events
//! to this binary. An unregistered event is a deployment bug, so the
//! validator reports exactly which ones are missing.

use serde_json::{Value, json};

/// The ten host lifecycle events, in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookEvent {
    SessionStart,
    SessionEnd,
    UserPromptSubmit,
    PreToolUse,
    PostToolUse,
    PermissionRequest,
    Stop,
    SubagentStop,
    PreCompact,
    Notification,
}

impl HookEvent {
    /// Every event. All ten must be registered.
    pub const ALL: [HookEvent; 10] = [
        HookEvent::SessionStart,
        HookEvent::SessionEnd,
        HookEvent::UserPromptSubmit,
        HookEvent::PreToolUse,
        HookEvent::PostToolUse,
        HookEvent::PermissionRequest,
        HookEvent::Stop,
        HookEvent::SubagentStop,
        HookEvent::PreCompact,
        HookEvent::Notification,
    ];

    /// Event name as it appears in the settings file.
    pub fn name(self) -> &'static str {
        match self {
            Self::SessionStart => "SessionStart",
            Self::SessionEnd => "SessionEnd",
            Self::UserPromptSubmit => "UserPromptSubmit",
            Self::PreToolUse => "PreToolUse",
            Self::PostToolUse => "PostToolUse",
            Self::PermissionRequest => "PermissionRequest",
            Self::Stop => "Stop",
            Self::SubagentStop => "SubagentStop",
            Self::PreCompact => "PreCompact",
            Self::Notification => "Notification",
        }
    }

    /// The CLI subcommand handling this event.
    pub fn subcommand(self) -> &'static str {
        match self {
            Self::SessionStart => "session-start",
            Self::SessionEnd => "session-end",
            Self::UserPromptSubmit => "user-prompt-submit",
            Self::PreToolUse => "pre-tool-use",
            Self::PostToolUse => "post-tool-use",
            Self::PermissionRequest => "permission-request",
            Self::Stop => "stop",
            Self::SubagentStop => "subagent-stop",
            Self::PreCompact => "pre-compact",
            Self::Notification => "notification",
        }
    }
}

/// Render the hooks block for the settings file, invoking `command` with
/// the per-event subcommand.
pub fn render_settings(command: &str) -> Value {
    let mut hooks = serde_json::Map::new();
    for event in HookEvent::ALL {
        hooks.insert(
            event.name().to_string(),
            json!([{
                "matcher": "*",
                "hooks": [{
                    "type": "command",
                    "command": format!("{command} {}", event.subcommand()),
                }]
            }]),
        );
    }
    json!({ "hooks": hooks })
}

/// Check a settings document for unregistered events. Returns the names
/// of every missing event; empty means the registration is complete.
pub fn validate_settings(settings: &Value) -> Vec<&'static str> {
    let hooks = settings.get("hooks").and_then(Value::as_object);

    HookEvent::ALL
        .iter()
        .filter(|event| {
            let registered = hooks
                .and_then(|h| h.get(event.name()))
                .and_then(Value::as_array)
                .map(|entries| !entries.is_empty())
                .unwrap_or(false);
            !registered
        })
        .map(|event| event.name())
        .collect()
}
