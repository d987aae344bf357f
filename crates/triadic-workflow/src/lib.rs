//! Workflow phase tracking and deployment enforcement.
//!
//! The workflow is a closed state machine over five triads. Completion
//! state persists in `workflow_state.json` under shared/exclusive advisory
//! locks. Before deployment runs, the [`gate::DeploymentGate`] checks
//! whether substantial implementation work happened without a
//! garden-tending pass and blocks with a structured message if so, unless
//! an explicitly justified, audited emergency bypass rides along.
//!
//! Change metrics come from a pluggable provider registry; the built-in
//! code provider shells out to git with a hard timeout and degrades to
//! "no data" (which never triggers the gate) when git is unavailable.

pub mod bypass;
pub mod code_metrics;
pub mod gate;
pub mod metrics;
pub mod proc;
pub mod state;

pub use bypass::{AuditEntry, AuditLogger, BypassRequest, validate_justification};
pub use code_metrics::CodeMetricsProvider;
pub use gate::{DeploymentGate, EnforcementOutcome};
pub use metrics::{
    Complexity, MetricsContext, MetricsError, MetricsProvider, MetricsRegistry, MetricsResult,
    classify_complexity,
};
pub use state::{
    VALID_TRIADS, WorkflowState, WorkflowStateManager, is_valid_transition, is_valid_triad,
};
