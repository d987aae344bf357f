//! Hook stdin/stdout protocol.
//!
//! Hooks receive one JSON object on stdin. The exact fields vary per
//! event, so [`HookInput`] wraps the raw value with typed accessors for
//! the common ones. Non-blocking hooks answer on stdout with a single
//! `hookSpecificOutput` object.

use std::io::Read;

use serde_json::{Map, Value, json};

/// Parsed hook input. Missing or malformed stdin degrades to an empty
/// object; a hook never fails because the host sent nothing.
#[derive(Debug, Clone, Default)]
pub struct HookInput {
    value: Value,
}

impl HookInput {
    /// Wrap an already-parsed value.
    pub fn new(value: Value) -> Self {
        Self { value }
    }

    /// Read and parse stdin, tolerating absence and garbage.
    pub fn from_stdin() -> Self {
        let mut raw = String::new();
        if std::io::stdin().read_to_string(&mut raw).is_err() {
            return Self::default();
        }
        Self::from_str_lossy(&raw)
    }

    /// Parse a string, tolerating garbage.
    pub fn from_str_lossy(raw: &str) -> Self {
        let value = serde_json::from_str(raw).unwrap_or(Value::Null);
        Self { value }
    }

    /// The raw JSON value.
    pub fn raw(&self) -> &Value {
        &self.value
    }

    /// A string field at the top level.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(Value::as_str)
    }

    /// The tool name (pre/post-tool and permission hooks).
    pub fn tool_name(&self) -> Option<&str> {
        self.str_field("tool_name")
    }

    /// The tool input object, empty if absent.
    pub fn tool_input(&self) -> Value {
        self.value.get("tool_input").cloned().unwrap_or(Value::Null)
    }

    /// The tool input as a JSON map for event payloads, sanitized.
    pub fn tool_input_sanitized(&self) -> Map<String, Value> {
        match self.tool_input() {
            Value::Object(map) => triadic_events::sanitize_object(&map),
            _ => Map::new(),
        }
    }

    /// The tool response object (post-tool hook).
    pub fn tool_response(&self) -> Option<&Value> {
        self.value.get("tool_response")
    }

    /// Current working directory as sent by the host.
    pub fn cwd(&self) -> Option<&str> {
        self.str_field("cwd")
    }

    /// The stop-hook response text, inline or via transcript file.
    pub fn response_text(&self) -> Option<String> {
        if let Some(response) = self.str_field("response") {
            return Some(response.to_string());
        }
        let path = self.str_field("transcript_path")?;
        std::fs::read_to_string(path).ok()
    }
}

/// Build the non-blocking hook stdout payload.
pub fn hook_output_json(event_name: &str, additional_context: &str) -> String {
    json!({
        "hookSpecificOutput": {
            "hookEventName": event_name,
            "additionalContext": additional_context,
        }
    })
    .to_string()
}
