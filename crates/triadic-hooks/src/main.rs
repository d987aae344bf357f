use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use triadic_graph::{GraphStore, repair_graph, validate_graph};
use triadic_hooks::registry::{render_settings, validate_settings};
use triadic_hooks::{HookEvent, HookOutcome, ProjectPaths, hooks};
use triadic_workflow::{BypassRequest, DeploymentGate, WorkflowStateManager};

#[derive(Parser, Debug)]
#[command(name = "triadic-hooks", version)]
#[command(about = "Hook pipeline for the triadic agent-orchestration runtime")]
struct Cli {
    /// Project directory (default: CLAUDE_PROJECT_DIR, then PWD, then cwd).
    #[arg(long)]
    project_dir: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// SessionStart hook: surface a pending handoff.
    SessionStart,
    /// SessionEnd hook: auto-pause the active workspace.
    SessionEnd,
    /// UserPromptSubmit hook: record the prompt event.
    UserPromptSubmit,
    /// PreToolUse hook: inject or block with process knowledge.
    PreToolUse,
    /// PostToolUse hook: record the tool result event.
    PostToolUse,
    /// PermissionRequest hook: record the request event.
    PermissionRequest,
    /// Stop hook: parse agent blocks and dispatch to the stores.
    Stop,
    /// SubagentStop hook: record the event.
    SubagentStop,
    /// PreCompact hook: record the event.
    PreCompact,
    /// Notification hook: record the event.
    Notification,
    /// Workflow state and deployment enforcement.
    Workflow {
        #[command(subcommand)]
        cmd: WorkflowCommands,
    },
    /// Workspace lifecycle management.
    Workspace {
        #[command(subcommand)]
        cmd: WorkspaceCommands,
    },
    /// Knowledge graph maintenance.
    Graph {
        #[command(subcommand)]
        cmd: GraphCommands,
    },
    /// Hook registration maintenance.
    Registry {
        #[command(subcommand)]
        cmd: RegistryCommands,
    },
}

#[derive(Subcommand, Debug)]
enum WorkflowCommands {
    /// Validate workflow state before deployment; exits 1 when blocked.
    Enforce {
        /// Request an emergency bypass of the garden-tending gate.
        #[arg(long)]
        force_deploy: bool,
        /// Justification for the bypass (required with --force-deploy).
        #[arg(long)]
        justification: Option<String>,
    },
    /// Mark a triad as completed.
    MarkCompleted { triad: String },
    /// Print the current workflow state.
    Status,
}

#[derive(Subcommand, Debug)]
enum WorkspaceCommands {
    /// Create a workspace and set it active.
    Create {
        /// Brief title (also feeds the workspace id slug).
        title: String,
        /// Brief type: feature, bug, refactor, ...
        #[arg(long, default_value = "feature")]
        brief_type: String,
        /// Brief description.
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Activate an existing workspace.
    Activate { workspace_id: String },
    /// Show the active workspace.
    Status,
    /// Pause the active workspace.
    Pause {
        #[arg(long, default_value = "Paused by operator")]
        reason: String,
    },
    /// Mark a workspace completed.
    Complete { workspace_id: String },
}

#[derive(Subcommand, Debug)]
enum GraphCommands {
    /// Validate graphs; exits 1 on corruption, 2 when repair failed.
    Check {
        /// Check a single triad instead of all graphs.
        #[arg(long)]
        triad: Option<String>,
        /// Attempt auto-repair of corrupted graphs (backs up first).
        #[arg(long)]
        fix: bool,
    },
}

#[derive(Subcommand, Debug)]
enum RegistryCommands {
    /// Verify all ten hook events are registered in settings.json.
    Check,
    /// Print the hooks block for settings.json.
    Render,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("TRIADIC_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let paths = match &cli.project_dir {
        Some(dir) => ProjectPaths::at(dir),
        None => ProjectPaths::discover(),
    };

    let code = match cli.cmd {
        Commands::SessionStart => apply(hooks::run(HookEvent::SessionStart, &paths)),
        Commands::SessionEnd => apply(hooks::run(HookEvent::SessionEnd, &paths)),
        Commands::UserPromptSubmit => apply(hooks::run(HookEvent::UserPromptSubmit, &paths)),
        Commands::PreToolUse => apply(hooks::run(HookEvent::PreToolUse, &paths)),
        Commands::PostToolUse => apply(hooks::run(HookEvent::PostToolUse, &paths)),
        Commands::PermissionRequest => apply(hooks::run(HookEvent::PermissionRequest, &paths)),
        Commands::Stop => apply(hooks::run(HookEvent::Stop, &paths)),
        Commands::SubagentStop => apply(hooks::run(HookEvent::SubagentStop, &paths)),
        Commands::PreCompact => apply(hooks::run(HookEvent::PreCompact, &paths)),
        Commands::Notification => apply(hooks::run(HookEvent::Notification, &paths)),
        Commands::Workflow { cmd } => run_workflow(cmd, &paths),
        Commands::Workspace { cmd } => run_workspace(cmd, &paths),
        Commands::Graph { cmd } => run_graph(cmd, &paths),
        Commands::Registry { cmd } => run_registry(cmd, &paths),
    };

    std::process::exit(code);
}

fn apply(outcome: HookOutcome) -> i32 {
    if let Some(stdout) = &outcome.stdout {
        println!("{stdout}");
    }
    if let Some(stderr) = &outcome.stderr {
        eprint!("{stderr}");
        let _ = std::io::stderr().flush();
    }
    outcome.exit_code
}

fn run_workflow(cmd: WorkflowCommands, paths: &ProjectPaths) -> i32 {
    match cmd {
        WorkflowCommands::Enforce {
            force_deploy,
            justification,
        } => {
            let bypass = force_deploy.then_some(BypassRequest { justification });
            enforce(paths, bypass.as_ref()).unwrap_or_else(|err| {
                eprintln!("[error] enforcement failed: {err:#}");
                1
            })
        }
        WorkflowCommands::MarkCompleted { triad } => {
            let manager = WorkflowStateManager::new(&paths.claude_dir());
            match manager.mark_completed(&triad, None) {
                Ok(state) => {
                    println!("completed: {}", state.completed_triads.join(", "));
                    0
                }
                Err(err) => {
                    eprintln!("[error] {err:#}");
                    1
                }
            }
        }
        WorkflowCommands::Status => {
            let manager = WorkflowStateManager::new(&paths.claude_dir());
            match manager.load() {
                Ok(state) => {
                    println!("session_id: {}", state.session_id);
                    println!(
                        "current_phase: {}",
                        state.current_phase.as_deref().unwrap_or("(none)")
                    );
                    println!("completed_triads: {}", state.completed_triads.join(", "));
                    0
                }
                Err(err) => {
                    eprintln!("[error] {err:#}");
                    1
                }
            }
        }
    }
}

fn enforce(paths: &ProjectPaths, bypass: Option<&BypassRequest>) -> Result<i32> {
    use triadic_workflow::EnforcementOutcome;

    let gate = DeploymentGate::new(&paths.claude_dir()).with_metrics_context(
        triadic_workflow::MetricsContext {
            base_ref: "HEAD~1".to_string(),
            dir: paths.project_dir().to_path_buf(),
        },
    );

    match gate.check(bypass)? {
        EnforcementOutcome::Pass => {
            println!("deployment allowed");
            Ok(0)
        }
        EnforcementOutcome::PassWithBypass { warning } => {
            println!("{warning}");
            Ok(0)
        }
        EnforcementOutcome::Blocked { message, .. } => {
            println!("{message}");
            Ok(1)
        }
        EnforcementOutcome::BypassRejected { message } => {
            println!("{message}");
            Ok(1)
        }
    }
}

fn run_workspace(cmd: WorkspaceCommands, paths: &ProjectPaths) -> i32 {
    use triadic_events::EventCapture;
    use triadic_workspace::{Activation, Brief, WorkspaceManager};

    let manager = WorkspaceManager::new(&paths.triads_dir());
    match cmd {
        WorkspaceCommands::Create {
            title,
            brief_type,
            description,
        } => {
            let previous = manager.get_active().ok().flatten();
            match manager.create(&Brief::with_type(&brief_type, &title, &description)) {
                Ok(workspace_id) => {
                    println!("created: {workspace_id}");
                    if let Some(previous) = previous {
                        // Activation races are last-writer-wins; make the
                        // displacement observable in the event log.
                        let mut data = serde_json::Map::new();
                        data.insert("previous".to_string(), serde_json::json!(previous));
                        data.insert("current".to_string(), serde_json::json!(workspace_id));
                        EventCapture::new(&paths.events_path()).capture(
                            "workspace_cli",
                            "workspace_conflict",
                            data,
                            Some(&workspace_id),
                        );
                    }
                    0
                }
                Err(err) => {
                    eprintln!("[error] {err:#}");
                    1
                }
            }
        }
        WorkspaceCommands::Activate { workspace_id } => match manager.set_active(&workspace_id) {
            Ok(Activation::ReplacedOther { previous }) => {
                println!("active: {workspace_id} (replaced {previous})");
                let mut data = serde_json::Map::new();
                data.insert("previous".to_string(), serde_json::json!(previous));
                data.insert("current".to_string(), serde_json::json!(workspace_id));
                EventCapture::new(&paths.events_path()).capture(
                    "workspace_cli",
                    "workspace_conflict",
                    data,
                    Some(&workspace_id),
                );
                0
            }
            Ok(_) => {
                println!("active: {workspace_id}");
                0
            }
            Err(err) => {
                eprintln!("[error] {err:#}");
                1
            }
        },
        WorkspaceCommands::Status => match manager.get_active() {
            Ok(Some(workspace_id)) => match manager.load(&workspace_id) {
                Ok(workspace) => {
                    println!("workspace: {workspace_id}");
                    println!("status: {}", workspace.state.status);
                    println!("brief: {}", workspace.brief.title);
                    0
                }
                Err(err) => {
                    eprintln!("[error] {err:#}");
                    1
                }
            },
            Ok(None) => {
                println!("no active workspace");
                0
            }
            Err(err) => {
                eprintln!("[error] {err:#}");
                1
            }
        },
        WorkspaceCommands::Pause { reason } => match manager.pause_active(&reason) {
            Ok(Some(workspace_id)) => {
                println!("paused: {workspace_id}");
                0
            }
            Ok(None) => {
                println!("no active workspace to pause");
                0
            }
            Err(err) => {
                eprintln!("[error] {err:#}");
                1
            }
        },
        WorkspaceCommands::Complete { workspace_id } => {
            match manager.mark_completed(&workspace_id) {
                Ok(()) => {
                    println!("completed: {workspace_id}");
                    0
                }
                Err(err) => {
                    eprintln!("[error] {err:#}");
                    1
                }
            }
        }
    }
}

fn run_graph(cmd: GraphCommands, paths: &ProjectPaths) -> i32 {
    match cmd {
        GraphCommands::Check { triad, fix } => check_graphs(paths, triad.as_deref(), fix)
            .unwrap_or_else(|err| {
                eprintln!("[error] graph check failed: {err:#}");
                2
            }),
    }
}

fn check_graphs(paths: &ProjectPaths, only: Option<&str>, fix: bool) -> Result<i32> {
    let mut store = GraphStore::new(&paths.graphs_dir());
    let triads = match only {
        Some(triad) => vec![triad.to_string()],
        None => store.list_triads()?,
    };

    let mut corrupt = 0;
    let mut repair_failed = 0;

    for triad in &triads {
        let mut graph = store.load(triad)?;
        match validate_graph(&graph) {
            Ok(()) => println!("{triad}: ok"),
            Err(err) => {
                println!("{triad}: INVALID ({err})");
                if !fix {
                    corrupt += 1;
                    continue;
                }

                let report = repair_graph(&mut graph);
                for action in &report.actions {
                    println!("{triad}:   {action}");
                }
                match validate_graph(&graph) {
                    Ok(()) => {
                        store.save(triad, &graph)?;
                        println!("{triad}: repaired");
                    }
                    Err(err) => {
                        println!("{triad}: repair failed ({err})");
                        repair_failed += 1;
                    }
                }
            }
        }
    }

    if repair_failed > 0 {
        Ok(2)
    } else if corrupt > 0 {
        Ok(1)
    } else {
        Ok(0)
    }
}

fn run_registry(cmd: RegistryCommands, paths: &ProjectPaths) -> i32 {
    match cmd {
        RegistryCommands::Check => {
            let settings: serde_json::Value =
                triadic_io::load_json_or(&paths.settings_path(), serde_json::json!({}));
            let missing = validate_settings(&settings);
            if missing.is_empty() {
                println!("all {} hook events registered", HookEvent::ALL.len());
                0
            } else {
                println!("unregistered hook events: {}", missing.join(", "));
                1
            }
        }
        RegistryCommands::Render => {
            let settings = render_settings("triadic-hooks");
            match serde_json::to_string_pretty(&settings) {
                Ok(rendered) => {
                    println!("{rendered}");
                    0
                }
                Err(err) => {
                    eprintln!("[error] {err}");
                    1
                }
            }
        }
    }
}
