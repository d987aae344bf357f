//! Block grammar parser.
//!
//! Agents embed delimited blocks in their final response text:
//!
//! ```text
//! [HANDOFF_REQUEST]
//! next_triad: implementation
//! context: |
//!   | Design is complete.
//!   | Interfaces are in the graph.
//! [/HANDOFF_REQUEST]
//! ```
//!
//! Parsing is a two-phase line machine: a classifier finds `[TAG]` /
//! `[/TAG]` delimiters for the five known kinds, then a key/value
//! accumulator handles `key: value` lines and `|`-prefixed continuation
//! lines. Unknown keys are kept (handlers ignore what they don't need);
//! unknown tags are ignored entirely.

use std::collections::BTreeMap;

/// The five block kinds the orchestrator understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    HandoffRequest,
    WorkflowComplete,
    GraphUpdate,
    ProcessKnowledge,
    PreFlightCheck,
}

impl BlockKind {
    /// All kinds, in dispatch order.
    pub const ALL: [BlockKind; 5] = [
        BlockKind::HandoffRequest,
        BlockKind::WorkflowComplete,
        BlockKind::GraphUpdate,
        BlockKind::ProcessKnowledge,
        BlockKind::PreFlightCheck,
    ];

    /// The tag name between brackets.
    pub fn tag(self) -> &'static str {
        match self {
            Self::HandoffRequest => "HANDOFF_REQUEST",
            Self::WorkflowComplete => "WORKFLOW_COMPLETE",
            Self::GraphUpdate => "GRAPH_UPDATE",
            Self::ProcessKnowledge => "PROCESS_KNOWLEDGE",
            Self::PreFlightCheck => "PRE_FLIGHT_CHECK",
        }
    }
}

/// One parsed block: its kind and a key/value payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    pub fields: BTreeMap<String, String>,
}

impl Block {
    /// Get a field, trimmed, treating empty values as absent.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }
}

/// Extract every recognized block from free text, in order of appearance.
pub fn parse_blocks(text: &str) -> Vec<Block> {
    let mut found: Vec<(usize, Block)> = Vec::new();

    for kind in BlockKind::ALL {
        let open = format!("[{}]", kind.tag());
        let close = format!("[/{}]", kind.tag());

        let mut offset = 0;
        while let Some(start) = text[offset..].find(&open) {
            let body_start = offset + start + open.len();
            let Some(end) = text[body_start..].find(&close) else {
                // Unterminated block: ignore the tail.
                break;
            };
            let body = &text[body_start..body_start + end];
            found.push((
                offset + start,
                Block {
                    kind,
                    fields: parse_fields(body),
                },
            ));
            offset = body_start + end + close.len();
        }
    }

    found.sort_by_key(|(pos, _)| *pos);
    found.into_iter().map(|(_, block)| block).collect()
}

/// Line-oriented `key: value` accumulator with `|` continuations.
///
/// A value of `|` (or nothing) opens a multi-line value; subsequent lines
/// beginning with `|` append to it. Lines that are neither `key: value`
/// nor continuations are skipped.
fn parse_fields(body: &str) -> BTreeMap<String, String> {
    fn flush(
        key: &mut Option<String>,
        lines: &mut Vec<String>,
        fields: &mut BTreeMap<String, String>,
    ) {
        if let Some(k) = key.take()
            && !lines.is_empty()
        {
            fields.insert(k, lines.join("\n"));
        }
        lines.clear();
    }

    let mut fields = BTreeMap::new();
    let mut current_key: Option<String> = None;
    let mut continuation: Vec<String> = Vec::new();

    for raw_line in body.lines() {
        let line = raw_line.trim();

        if let Some(rest) = line.strip_prefix('|') {
            if current_key.is_some() {
                continuation.push(rest.trim().to_string());
            }
            continue;
        }

        if let Some((key, value)) = line.split_once(':') {
            flush(&mut current_key, &mut continuation, &mut fields);

            let key = key.trim().to_string();
            let value = value.trim();
            if key.is_empty() {
                continue;
            }

            if value.is_empty() || value == "|" {
                current_key = Some(key);
            } else {
                fields.insert(key, value.to_string());
                current_key = None;
            }
            continue;
        }

        // Anything else ends a pending multi-line value.
        flush(&mut current_key, &mut continuation, &mut fields);
    }

    flush(&mut current_key, &mut continuation, &mut fields);
    fields
}
