//! Domain-agnostic work metrics and the provider registry.
//!
//! A provider measures "how much work happened" in its own domain (code,
//! documents, ...) and reports it in one generic shape so the workflow
//! validator never needs domain knowledge.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Work magnitude classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Minimal,
    Moderate,
    Substantial,
}

impl Complexity {
    /// Display form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Moderate => "moderate",
            Self::Substantial => "substantial",
        }
    }
}

/// Substantial: quantity over 100 or components over 5.
pub const SUBSTANTIAL_QUANTITY: u64 = 100;
pub const SUBSTANTIAL_COMPONENTS: u64 = 5;
/// Moderate: quantity over 30 or components over 2.
pub const MODERATE_QUANTITY: u64 = 30;
pub const MODERATE_COMPONENTS: u64 = 2;

/// Classify work by quantity and component count.
pub fn classify_complexity(quantity: u64, components: u64) -> Complexity {
    if quantity > SUBSTANTIAL_QUANTITY || components > SUBSTANTIAL_COMPONENTS {
        Complexity::Substantial
    } else if quantity > MODERATE_QUANTITY || components > MODERATE_COMPONENTS {
        Complexity::Moderate
    } else {
        Complexity::Minimal
    }
}

/// What a provider measured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentCreated {
    /// Domain-specific type, e.g. "code".
    #[serde(rename = "type")]
    pub content_type: String,
    /// Numeric measure (lines, pages, ...).
    pub quantity: u64,
    /// What `quantity` measures.
    pub units: String,
}

/// Generic metrics result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsResult {
    pub content_created: ContentCreated,
    pub components_modified: u64,
    pub complexity: Complexity,
    /// Provider-specific raw data for auditing.
    #[serde(default)]
    pub raw_data: Map<String, Value>,
}

impl MetricsResult {
    /// An empty result: nothing measured, never triggers enforcement.
    pub fn empty(content_type: &str, units: &str) -> Self {
        Self {
            content_created: ContentCreated {
                content_type: content_type.to_string(),
                quantity: 0,
                units: units.to_string(),
            },
            components_modified: 0,
            complexity: Complexity::Minimal,
            raw_data: Map::new(),
        }
    }

    /// Whether the work is at least moderate.
    pub fn is_substantial(&self) -> bool {
        matches!(self.complexity, Complexity::Moderate | Complexity::Substantial)
    }

    /// Whether a new-feature signal was recorded by the provider.
    pub fn has_new_features(&self) -> bool {
        self.raw_data
            .get("has_new_features")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Metrics calculation failures.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// The underlying subprocess exceeded its deadline.
    #[error("metrics subprocess timed out: {0}")]
    Timeout(String),

    /// The provider could not produce a result.
    #[error("metrics calculation failed: {0}")]
    Provider(String),
}

/// Context handed to providers.
#[derive(Debug, Clone)]
pub struct MetricsContext {
    /// Reference to diff against (e.g. `HEAD~1`).
    pub base_ref: String,
    /// Directory the measurement runs in.
    pub dir: PathBuf,
}

impl Default for MetricsContext {
    fn default() -> Self {
        Self {
            base_ref: "HEAD~1".to_string(),
            dir: PathBuf::from("."),
        }
    }
}

/// A domain-specific metrics calculator.
pub trait MetricsProvider {
    /// Domain this provider handles, e.g. "code".
    fn domain(&self) -> &str;

    /// Measure the work described by the context.
    fn calculate(&self, context: &MetricsContext) -> Result<MetricsResult, MetricsError>;
}

/// Registry of providers keyed by domain.
#[derive(Default)]
pub struct MetricsRegistry {
    providers: HashMap<String, Box<dyn MetricsProvider>>,
}

impl MetricsRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in code provider registered.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(crate::code_metrics::CodeMetricsProvider::new()));
        registry
    }

    /// Register a provider, replacing any existing one for its domain.
    pub fn register(&mut self, provider: Box<dyn MetricsProvider>) {
        self.providers.insert(provider.domain().to_string(), provider);
    }

    /// Look up a provider by domain.
    pub fn get(&self, domain: &str) -> Option<&dyn MetricsProvider> {
        self.providers.get(domain).map(Box::as_ref)
    }

    /// Registered domains, sorted.
    pub fn domains(&self) -> Vec<String> {
        let mut domains: Vec<String> = self.providers.keys().cloned().collect();
        domains.sort();
        domains
    }
}

/// Garden-tending requirement flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct GardenTendingFlags {
    /// Force the requirement on.
    pub require: bool,
    /// Force the requirement off.
    pub skip: bool,
}

/// Whether garden tending is required. `require` wins, then `skip`, then
/// the metrics: at least moderate work or a new-feature signal.
pub fn requires_garden_tending(metrics: &MetricsResult, flags: GardenTendingFlags) -> bool {
    if flags.require {
        return true;
    }
    if flags.skip {
        return false;
    }
    metrics.is_substantial() || metrics.has_new_features()
}
