//! The ten hook bodies.
//!
//! Each body runs inside the [`crate::envelope::run_hook`] boundary, so a
//! `?` here never crashes the host; it becomes a failure event and exit
//! 0. The pre-tool hook is the only one that can exit 2.

use serde_json::{Value, json};
use tracing::warn;

use triadic_events::EventCapture;
use triadic_experience::{
    Decision, DecisionPolicy, EngineConfig, ExperienceTracker, QueryEngine, ToolContext,
};
use triadic_graph::{GraphStore, detect_issues, update_queue};
use triadic_orchestrator::{HandoffHandler, StopOrchestrator};
use triadic_workspace::WorkspaceManager;

use crate::envelope::{HookOutcome, run_hook};
use crate::paths::ProjectPaths;
use crate::protocol::{HookInput, hook_output_json};
use crate::registry::HookEvent;

/// Read stdin and run one hook event end to end.
pub fn run(event: HookEvent, paths: &ProjectPaths) -> HookOutcome {
    let input = HookInput::from_stdin();
    run_with_input(event, paths, &input)
}

/// Run one hook event against already-parsed input.
pub fn run_with_input(event: HookEvent, paths: &ProjectPaths, input: &HookInput) -> HookOutcome {
    match event {
        HookEvent::SessionStart => run_hook("session_start", paths, input, |i, ws| {
            session_start(paths, i, ws)
        }),
        HookEvent::SessionEnd => run_hook("session_end", paths, input, |i, ws| {
            session_end(paths, i, ws)
        }),
        HookEvent::UserPromptSubmit => run_hook("user_prompt_submit", paths, input, |i, ws| {
            user_prompt_submit(i, ws)
        }),
        HookEvent::PreToolUse => run_hook("pre_tool_use", paths, input, |i, ws| {
            pre_tool_use(paths, i, ws)
        }),
        HookEvent::PostToolUse => run_hook("post_tool_use", paths, input, |i, ws| {
            post_tool_use(i, ws)
        }),
        HookEvent::PermissionRequest => run_hook("permission_request", paths, input, |i, ws| {
            permission_request(i, ws)
        }),
        HookEvent::Stop => run_hook("stop", paths, input, |i, ws| stop(paths, i, ws)),
        HookEvent::SubagentStop => run_hook("subagent_stop", paths, input, |i, ws| {
            simple_observer(i, ws, &["stop_hook_active"])
        }),
        HookEvent::PreCompact => run_hook("pre_compact", paths, input, |i, ws| {
            simple_observer(i, ws, &["trigger", "custom_instructions"])
        }),
        HookEvent::Notification => run_hook("notification", paths, input, |i, ws| {
            simple_observer(i, ws, &["notification_type", "message"])
        }),
    }
}

fn session_start(
    paths: &ProjectPaths,
    input: &HookInput,
    workspace_id: Option<&str>,
) -> anyhow::Result<HookOutcome> {
    let mut outcome = HookOutcome::silent();
    if let Some(source) = input.str_field("source") {
        outcome.event_data.insert("source".to_string(), json!(source));
    }

    if let Some(workspace_id) = workspace_id {
        append_workspace_session(paths, workspace_id, "session_started");
    }

    // A queued handoff from the previous session becomes context for this
    // one, and is consumed in the same step.
    let handoffs = HandoffHandler::new(&paths.claude_dir());
    if let Some(pending) = handoffs.take_pending() {
        let mut context = format!(
            "Pending handoff: invoke the {} triad ({}).",
            pending.next_triad, pending.request_type
        );
        if !pending.context.is_empty() {
            context.push_str(&format!("\nContext:\n{}", pending.context));
        }
        outcome.stdout = Some(hook_output_json("SessionStart", &context));
        outcome
            .event_data
            .insert("pending_handoff".to_string(), json!(pending.next_triad));
    }

    Ok(outcome)
}

fn session_end(
    paths: &ProjectPaths,
    input: &HookInput,
    workspace_id: Option<&str>,
) -> anyhow::Result<HookOutcome> {
    let mut outcome = HookOutcome::silent();
    if let Some(reason) = input.str_field("reason") {
        outcome.event_data.insert("reason".to_string(), json!(reason));
    }

    if let Some(workspace_id) = workspace_id {
        append_workspace_session(paths, workspace_id, "session_ended");
    }

    // Auto-pause is best-effort; a failure here must never propagate.
    let manager = WorkspaceManager::new(&paths.triads_dir());
    match manager.pause_active("Session ended (auto-pause)") {
        Ok(Some(workspace_id)) => {
            outcome
                .event_data
                .insert("workspace_paused".to_string(), json!(workspace_id));
        }
        Ok(None) => {}
        Err(err) => {
            warn!(error = %format!("{err:#}"), "workspace auto-pause failed");
        }
    }

    Ok(outcome)
}

fn append_workspace_session(paths: &ProjectPaths, workspace_id: &str, event: &str) {
    let manager = WorkspaceManager::new(&paths.triads_dir());
    let line = json!({
        "event": event,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })
    .to_string();
    if let Err(err) = manager.append_session_event(workspace_id, &line) {
        warn!(workspace_id, error = %format!("{err:#}"), "session log append failed");
    }
}

fn user_prompt_submit(input: &HookInput, _workspace_id: Option<&str>) -> anyhow::Result<HookOutcome> {
    let mut outcome = HookOutcome::silent();
    let prompt_length = input.str_field("prompt").map(str::len).unwrap_or(0);
    outcome
        .event_data
        .insert("prompt_length".to_string(), json!(prompt_length));
    Ok(outcome)
}

fn pre_tool_use(
    paths: &ProjectPaths,
    input: &HookInput,
    workspace_id: Option<&str>,
) -> anyhow::Result<HookOutcome> {
    let tool_name = input.tool_name().unwrap_or("unknown").to_string();
    let sanitized = input.tool_input_sanitized();

    let mut outcome = HookOutcome::silent();
    outcome.event_data.insert("tool_name".to_string(), json!(tool_name));
    outcome.event_data.insert(
        "tool_input_keys".to_string(),
        json!(sanitized.keys().cloned().collect::<Vec<_>>()),
    );
    if let Some(tool_use_id) = input.str_field("tool_use_id") {
        outcome
            .event_data
            .insert("tool_use_id".to_string(), json!(tool_use_id));
    }
    outcome
        .event_data
        .insert("has_workspace".to_string(), json!(workspace_id.is_some()));

    let config = EngineConfig::from_env();
    if config.disable_experience {
        return Ok(outcome);
    }

    let ctx = ToolContext {
        tool_name,
        tool_input: input.tool_input(),
        cwd: input.cwd().map(String::from),
    };

    let store = GraphStore::new(&paths.graphs_dir());
    let mut engine = QueryEngine::new(store, config.clone());
    let ranked = engine.query_for_tool_use(&ctx);
    let policy = DecisionPolicy::new(config);

    match policy.decide(&ctx, &ranked) {
        Decision::Block(interjection) => {
            outcome.event_data.insert("decision".to_string(), json!("blocked"));
            outcome.event_data.insert(
                "blocked_by".to_string(),
                json!(ranked[0].knowledge.node_id),
            );
            let event_data = outcome.event_data.clone();
            let mut blocked = HookOutcome::blocking(interjection);
            blocked.event_data = event_data;
            Ok(blocked)
        }
        Decision::Inject(context) => {
            let mut tracker = ExperienceTracker::new(&paths.claude_dir());
            for item in &ranked {
                tracker.record_injection(
                    &item.knowledge.node_id,
                    &item.knowledge.label,
                    &ctx.tool_name,
                );
            }
            outcome.event_data.insert("decision".to_string(), json!("injected"));
            outcome
                .event_data
                .insert("injected_count".to_string(), json!(ranked.len()));
            outcome.stdout = Some(hook_output_json("PreToolUse", &context));
            Ok(outcome)
        }
        Decision::Silent => {
            outcome.event_data.insert("decision".to_string(), json!("silent"));
            Ok(outcome)
        }
    }
}

fn post_tool_use(input: &HookInput, _workspace_id: Option<&str>) -> anyhow::Result<HookOutcome> {
    let mut outcome = HookOutcome::silent();
    outcome.event_data.insert(
        "tool_name".to_string(),
        json!(input.tool_name().unwrap_or("unknown")),
    );
    outcome.event_data.insert(
        "tool_input_keys".to_string(),
        json!(input.tool_input_sanitized().keys().cloned().collect::<Vec<_>>()),
    );

    if let Some(response) = input.tool_response() {
        let is_error = response
            .get("is_error")
            .and_then(Value::as_bool)
            .unwrap_or(false)
            || response
                .get("success")
                .and_then(Value::as_bool)
                .map(|s| !s)
                .unwrap_or(false);
        outcome.event_data.insert("tool_error".to_string(), json!(is_error));
    }

    Ok(outcome)
}

fn permission_request(input: &HookInput, _workspace_id: Option<&str>) -> anyhow::Result<HookOutcome> {
    let mut outcome = HookOutcome::silent();
    outcome.event_data.insert(
        "tool_name".to_string(),
        json!(input.tool_name().unwrap_or("unknown")),
    );
    if let Some(tool_use_id) = input.str_field("tool_use_id") {
        outcome
            .event_data
            .insert("tool_use_id".to_string(), json!(tool_use_id));
    }
    Ok(outcome)
}

fn stop(
    paths: &ProjectPaths,
    input: &HookInput,
    workspace_id: Option<&str>,
) -> anyhow::Result<HookOutcome> {
    let Some(text) = input.response_text() else {
        let mut outcome = HookOutcome::silent();
        outcome
            .event_data
            .insert("response".to_string(), json!("absent"));
        return Ok(outcome);
    };

    let capture = EventCapture::new(&paths.events_path());
    let mut orchestrator = StopOrchestrator::new(&paths.claude_dir());
    let summary = orchestrator.process(&text, Some(&capture), workspace_id);

    // Quality pass over every graph the dispatch touched.
    let mut issues = Vec::new();
    for triad in &summary.touched_triads {
        match orchestrator.store_mut().load(triad) {
            Ok(graph) => issues.extend(detect_issues(&graph, triad)),
            Err(err) => warn!(triad, error = %format!("{err:#}"), "issue scan failed"),
        }
    }
    let queued_issues = if issues.is_empty() {
        0
    } else {
        update_queue(&paths.km_queue_path(), &issues).unwrap_or(0)
    };

    // Close the experience loop for everything injected this session.
    let mut tracker = ExperienceTracker::new(&paths.claude_dir());
    let mut outcomes_applied = 0;
    if !tracker.injections().is_empty() {
        let outcomes = tracker.detect_outcomes(&text);
        outcomes_applied = tracker
            .apply_outcomes(orchestrator.store_mut(), &outcomes)
            .unwrap_or(0);
    }

    let mut outcome = HookOutcome::silent();
    outcome
        .event_data
        .insert("graph_updates_applied".to_string(), json!(summary.graph_updates.applied));
    outcome
        .event_data
        .insert("handoffs_queued".to_string(), json!(summary.handoffs.applied));
    outcome
        .event_data
        .insert("km_issues_queued".to_string(), json!(queued_issues));
    outcome
        .event_data
        .insert("outcomes_applied".to_string(), json!(outcomes_applied));
    Ok(outcome)
}

fn simple_observer(
    input: &HookInput,
    _workspace_id: Option<&str>,
    fields: &[&str],
) -> anyhow::Result<HookOutcome> {
    let mut outcome = HookOutcome::silent();
    for field in fields {
        if let Some(value) = input.raw().get(*field) {
            outcome.event_data.insert((*field).to_string(), value.clone());
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;

    use triadic_events::{EventFilters, EventRepository, JsonlEventRepository};
    use triadic_graph::{KnowledgeGraph, Node};
    use triadic_workspace::Brief;

    use super::*;

    fn paths() -> (tempfile::TempDir, ProjectPaths) {
        let td = tempdir().expect("tempdir");
        let paths = ProjectPaths::at(td.path());
        (td, paths)
    }

    fn input(value: serde_json::Value) -> HookInput {
        HookInput::new(value)
    }

    fn seed_critical_lesson(paths: &ProjectPaths) {
        let mut store = GraphStore::new(&paths.graphs_dir());
        let mut graph = KnowledgeGraph::default();
        let mut node = Node::new("version_bump", "Version bump checklist", "concept")
            .with_confidence(0.95);
        node.content = Some("Update plugin.json version field".to_string());
        node.extra.insert("process_type".to_string(), json!("checklist"));
        node.extra.insert("priority".to_string(), json!("CRITICAL"));
        node.extra.insert(
            "trigger_conditions".to_string(),
            json!({
                "tool_names": ["Write"],
                "file_patterns": ["**/plugin.json"],
                "action_keywords": [],
                "context_keywords": []
            }),
        );
        graph.nodes.push(node);
        store.save("deployment", &graph).expect("save");
    }

    #[test]
    fn critical_write_is_blocked_with_interjection() {
        let (_td, paths) = paths();
        seed_critical_lesson(&paths);

        let outcome = run_with_input(
            HookEvent::PreToolUse,
            &paths,
            &input(json!({
                "tool_name": "Write",
                "tool_input": {"file_path": "/x/plugin.json", "content": "{}"}
            })),
        );

        assert_eq!(outcome.exit_code, 2);
        let stderr = outcome.stderr.expect("interjection");
        assert!(stderr.starts_with("⚠️"));
        assert!(stderr.contains("Version bump checklist"));
    }

    #[test]
    fn read_of_same_file_passes_without_the_item() {
        let (_td, paths) = paths();
        seed_critical_lesson(&paths);

        let outcome = run_with_input(
            HookEvent::PreToolUse,
            &paths,
            &input(json!({
                "tool_name": "Read",
                "tool_input": {"file_path": "/x/plugin.json"}
            })),
        );

        assert_eq!(outcome.exit_code, 0);
        if let Some(stdout) = outcome.stdout {
            assert!(!stdout.contains("Version bump checklist"));
        }
    }

    #[test]
    fn injection_records_lessons_for_the_tracker() {
        let (_td, paths) = paths();
        // HIGH priority never blocks; it injects.
        let mut store = GraphStore::new(&paths.graphs_dir());
        let mut graph = KnowledgeGraph::default();
        let mut node = Node::new("tip", "Helpful tip", "concept").with_confidence(0.9);
        node.extra.insert("process_type".to_string(), json!("pattern"));
        node.extra.insert("priority".to_string(), json!("HIGH"));
        node.extra.insert(
            "trigger_conditions".to_string(),
            json!({"tool_names": ["Write"], "file_patterns": ["**/*.rs"],
                   "action_keywords": [], "context_keywords": []}),
        );
        graph.nodes.push(node);
        store.save("implementation", &graph).expect("save");

        let outcome = run_with_input(
            HookEvent::PreToolUse,
            &paths,
            &input(json!({
                "tool_name": "Write",
                "tool_input": {"file_path": "/x/main.rs", "content": "fn main() {}"}
            })),
        );

        assert_eq!(outcome.exit_code, 0);
        assert!(outcome.stdout.expect("context").contains("Helpful tip"));

        let tracker = ExperienceTracker::new(&paths.claude_dir());
        assert_eq!(tracker.injections().len(), 1);
        assert_eq!(tracker.injections()[0].lesson_id, "tip");
    }

    #[test]
    fn session_end_pauses_active_workspace() {
        let (_td, paths) = paths();
        let manager = WorkspaceManager::new(&paths.triads_dir());
        let id = manager.create(&Brief::feature("Task", "d")).expect("create");

        let outcome = run_with_input(
            HookEvent::SessionEnd,
            &paths,
            &input(json!({"reason": "user_exit"})),
        );
        assert_eq!(outcome.exit_code, 0);

        let state = manager.load(&id).expect("load").state;
        assert_eq!(state.status, "paused");
        assert_eq!(
            state.pause_reason.as_deref(),
            Some("Session ended (auto-pause)")
        );
    }

    #[test]
    fn session_start_surfaces_and_consumes_pending_handoff() {
        let (_td, paths) = paths();
        let handoffs = HandoffHandler::new(&paths.claude_dir());
        handoffs.process(&triadic_orchestrator::parse_blocks(
            "[HANDOFF_REQUEST]\nnext_triad: implementation\nrequest_type: feature_complete\n[/HANDOFF_REQUEST]",
        ));

        let outcome = run_with_input(HookEvent::SessionStart, &paths, &input(json!({})));
        let stdout = outcome.stdout.expect("context");
        assert!(stdout.contains("implementation"));

        // Consumed: the next session starts clean.
        let outcome = run_with_input(HookEvent::SessionStart, &paths, &input(json!({})));
        assert!(outcome.stdout.is_none());
    }

    #[test]
    fn stop_dispatches_blocks_and_queues_issues() {
        let (_td, paths) = paths();
        let response = "Work done.\n\
                        [GRAPH_UPDATE]\ntriad: design\nnode_id: sparse\ntype: entity\n[/GRAPH_UPDATE]";

        let outcome = run_with_input(
            HookEvent::Stop,
            &paths,
            &input(json!({"response": response})),
        );
        assert_eq!(outcome.exit_code, 0);

        let mut store = GraphStore::new(&paths.graphs_dir());
        assert!(store.load("design").expect("load").node("sparse").is_some());
        // A sparse entity with no evidence lands in the issue queue.
        assert!(paths.km_queue_path().exists());
    }

    #[test]
    fn stop_without_response_is_a_quiet_success() {
        let (_td, paths) = paths();
        let outcome = run_with_input(HookEvent::Stop, &paths, &input(json!({})));
        assert_eq!(outcome.exit_code, 0);
    }

    #[test]
    fn observer_hooks_record_their_fields() {
        let (_td, paths) = paths();
        run_with_input(
            HookEvent::Notification,
            &paths,
            &input(json!({"notification_type": "permission_prompt", "message": "waiting"})),
        );

        let repo = JsonlEventRepository::new(&paths.events_path());
        let mut filters = EventFilters::default();
        filters.search = Some("permission_prompt".to_string());
        assert_eq!(repo.count(&filters).expect("count"), 1);
    }

    #[test]
    fn every_event_kind_exits_zero_on_empty_input_except_blocking() {
        let (_td, paths) = paths();
        for event in HookEvent::ALL {
            let outcome = run_with_input(event, &paths, &input(json!({})));
            assert_eq!(outcome.exit_code, 0, "event {:?}", event.name());
        }
    }
}
