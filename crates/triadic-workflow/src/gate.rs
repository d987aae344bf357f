//! Deployment gate: blocks deployment when substantial implementation
//! work happened without garden tending.

use serde_json::{Map, Value};
use tracing::warn;

use crate::bypass::{AuditLogger, BypassRequest, validate_justification};
use crate::metrics::{
    Complexity, MetricsContext, MetricsRegistry, MetricsResult, SUBSTANTIAL_COMPONENTS,
    SUBSTANTIAL_QUANTITY,
};
use crate::state::WorkflowStateManager;

/// Outcome of the enforcement check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnforcementOutcome {
    /// Deployment may proceed.
    Pass,
    /// Deployment may proceed under an accepted, audited bypass.
    PassWithBypass { warning: String },
    /// Deployment is blocked; `message` is the user-visible explanation.
    Blocked {
        message: String,
        triggers: Vec<String>,
    },
    /// A bypass was requested but its justification was rejected.
    BypassRejected { message: String },
}

impl EnforcementOutcome {
    /// Whether deployment may proceed.
    pub fn allows_deployment(&self) -> bool {
        matches!(self, Self::Pass | Self::PassWithBypass { .. })
    }
}

/// The enforcement entry point, called at the start of deployment.
pub struct DeploymentGate {
    state: WorkflowStateManager,
    registry: MetricsRegistry,
    audit: AuditLogger,
    metrics_context: MetricsContext,
}

impl DeploymentGate {
    /// Gate over a state directory, using the default provider registry.
    pub fn new(state_dir: &std::path::Path) -> Self {
        Self {
            state: WorkflowStateManager::new(state_dir),
            registry: MetricsRegistry::with_defaults(),
            audit: AuditLogger::new(state_dir),
            metrics_context: MetricsContext::default(),
        }
    }

    /// Replace the provider registry (tests, non-code domains).
    pub fn with_registry(mut self, registry: MetricsRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Override the metrics context (base ref, directory).
    pub fn with_metrics_context(mut self, context: MetricsContext) -> Self {
        self.metrics_context = context;
        self
    }

    /// Run the check.
    ///
    /// Order: garden tending done → pass; implementation not done → pass
    /// (the requirement has not arisen); metrics missing or below
    /// substantial → pass; otherwise blocked, unless a valid bypass rides
    /// along, which is audited before it passes.
    pub fn check(&self, bypass: Option<&BypassRequest>) -> anyhow::Result<EnforcementOutcome> {
        let state = self.state.load()?;

        if state.is_completed("garden-tending") {
            return Ok(EnforcementOutcome::Pass);
        }
        if !state.is_completed("implementation") {
            return Ok(EnforcementOutcome::Pass);
        }

        let metrics = self.calculate_metrics();
        let triggers = substantial_triggers(&metrics);
        if triggers.is_empty() {
            return Ok(EnforcementOutcome::Pass);
        }

        if let Some(request) = bypass {
            return self.try_bypass(request, &metrics, &triggers);
        }

        Ok(EnforcementOutcome::Blocked {
            message: block_message(&triggers),
            triggers,
        })
    }

    fn calculate_metrics(&self) -> MetricsResult {
        let Some(provider) = self.registry.get("code") else {
            return MetricsResult::empty("code", "lines");
        };
        match provider.calculate(&self.metrics_context) {
            Ok(metrics) => metrics,
            Err(err) => {
                // Missing metrics must never block deployment.
                warn!(%err, "metrics calculation failed, treating as no data");
                MetricsResult::empty("code", "lines")
            }
        }
    }

    fn try_bypass(
        &self,
        request: &BypassRequest,
        metrics: &MetricsResult,
        triggers: &[String],
    ) -> anyhow::Result<EnforcementOutcome> {
        if let Err(reason) = validate_justification(request.justification.as_deref()) {
            return Ok(EnforcementOutcome::BypassRejected {
                message: bypass_rejected_message(&reason),
            });
        }

        let justification = request.justification.as_deref().unwrap_or_default();

        let mut metadata = Map::new();
        metadata.insert(
            "quantity".to_string(),
            Value::from(metrics.content_created.quantity),
        );
        metadata.insert(
            "components_modified".to_string(),
            Value::from(metrics.components_modified),
        );
        metadata.insert("triggers".to_string(), Value::from(triggers.to_vec()));
        self.audit.log_bypass(justification, metadata)?;

        Ok(EnforcementOutcome::PassWithBypass {
            warning: bypass_warning(justification),
        })
    }
}

/// The specific thresholds that fired, as user-readable strings. Only
/// substantial-level findings block deployment.
fn substantial_triggers(metrics: &MetricsResult) -> Vec<String> {
    let mut triggers = Vec::new();

    if metrics.complexity == Complexity::Substantial {
        let quantity = metrics.content_created.quantity;
        if quantity > SUBSTANTIAL_QUANTITY {
            triggers.push(format!(
                "{quantity} {} changed (threshold: {SUBSTANTIAL_QUANTITY})",
                metrics.content_created.units
            ));
        }
        let components = metrics.components_modified;
        if components > SUBSTANTIAL_COMPONENTS {
            triggers.push(format!(
                "{components} components changed (threshold: {SUBSTANTIAL_COMPONENTS})"
            ));
        }
    }

    if metrics.has_new_features() {
        triggers.push("new features detected".to_string());
    }

    triggers
}

fn block_message(triggers: &[String]) -> String {
    let mut out = String::new();
    out.push_str("ERROR: Garden Tending Required Before Deployment\n\n");
    out.push_str("Your changes require garden tending before deployment:\n");
    for trigger in triggers {
        out.push_str(&format!("  - {trigger}\n"));
    }
    out.push_str("\nRequired action:\n");
    out.push_str("  Run the garden-tending triad, then retry deployment.\n\n");
    out.push_str("Or to bypass (not recommended):\n");
    out.push_str("  --force-deploy --justification 'detailed reason for bypass'\n");
    out
}

fn bypass_rejected_message(reason: &str) -> String {
    format!(
        "ERROR: Invalid Emergency Bypass\n\n{reason}\n\n\
         Usage:\n  --force-deploy --justification 'detailed reason for bypass'\n"
    )
}

fn bypass_warning(justification: &str) -> String {
    format!(
        "WARNING: Emergency bypass activated\n\n\
         Justification: {justification}\n\n\
         This bypass has been logged for audit purposes.\n\
         Garden tending is still recommended after deployment.\n"
    )
}
