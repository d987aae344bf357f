//! Confidence scoring for process knowledge.
//!
//! Initial confidence comes from the strength of the evidence source;
//! later outcomes multiply it up or down. The asymmetry is deliberate:
//! negative evidence outweighs positive, and human feedback outweighs
//! observed outcomes.

/// Minimum confidence before a lesson auto-deprecates.
pub const DEPRECATION_THRESHOLD: f64 = 0.30;
/// Ceiling for updated confidence.
pub const CAP_MAX: f64 = 0.99;
/// Floor for updated confidence; the record stays for the audit trail.
pub const FLOOR_MIN: f64 = 0.10;

/// Where a lesson came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// A human pointed out the mistake directly.
    UserCorrection,
    /// An explicit `[PROCESS_KNOWLEDGE]` block from an agent.
    ProcessKnowledgeBlock,
    /// The same mistake observed more than once.
    RepeatedMistake,
    /// An agent inferred the lesson without direct evidence.
    AgentInference,
    /// A tentative suggestion.
    Suggestion,
}

impl Source {
    /// Parse the wire spelling (e.g. `user_correction`). Unknown sources
    /// get a conservative default weight.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "user_correction" => Some(Self::UserCorrection),
            "process_knowledge_block" => Some(Self::ProcessKnowledgeBlock),
            "repeated_mistake" => Some(Self::RepeatedMistake),
            "agent_inference" => Some(Self::AgentInference),
            "suggestion" => Some(Self::Suggestion),
            _ => None,
        }
    }

    fn base_confidence(self) -> f64 {
        match self {
            Self::UserCorrection => 0.95,
            Self::ProcessKnowledgeBlock => 0.90,
            Self::RepeatedMistake => 0.75,
            Self::AgentInference => 0.65,
            Self::Suggestion => 0.50,
        }
    }
}

/// Outcome of a lesson being applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The lesson was followed and the operation held up.
    Success,
    /// A human validated the lesson.
    Confirmation,
    /// The lesson was followed and things went wrong anyway.
    Failure,
    /// A human rejected the lesson.
    Contradiction,
}

impl Outcome {
    /// Multiplier applied to the current confidence.
    pub fn multiplier(self) -> f64 {
        match self {
            Self::Success => 1.15,
            Self::Confirmation => 1.10,
            Self::Failure => 0.60,
            Self::Contradiction => 0.40,
        }
    }

    /// Wire spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Confirmation => "confirmation",
            Self::Failure => "failure",
            Self::Contradiction => "contradiction",
        }
    }
}

/// Initial confidence for a new lesson, in [0.50, 0.95].
///
/// Repetition boosts repeated-mistake lessons by 0.05 per extra occurrence
/// (capped at +0.15). CRITICAL priority multiplies by 1.05; known
/// conflicting evidence multiplies by 0.85.
pub fn initial_confidence(
    source: Option<Source>,
    priority: &str,
    repetition_count: u32,
    conflicting_evidence: bool,
) -> f64 {
    let mut confidence = source.map(Source::base_confidence).unwrap_or(0.60);

    if source == Some(Source::RepeatedMistake) && repetition_count >= 2 {
        let boost = (f64::from(repetition_count - 1) * 0.05).min(0.15);
        confidence += boost;
    }

    if priority.eq_ignore_ascii_case("critical") {
        confidence = (confidence * 1.05).min(0.95);
    }

    if conflicting_evidence {
        confidence *= 0.85;
    }

    confidence.clamp(0.50, 0.95)
}

/// Multiplicative confidence update, bounded [0.10, 0.99].
pub fn update_confidence(current: f64, outcome: Outcome) -> f64 {
    (current * outcome.multiplier()).clamp(FLOOR_MIN, CAP_MAX)
}

/// Lesson status from confidence and priority. At or above 0.70 a lesson
/// is active (the 0.70–0.80 band carries less emphasis downstream);
/// between 0.50 and 0.70 it needs validation; below that it is archived.
pub fn assign_status(confidence: f64, _priority: &str) -> &'static str {
    if confidence >= 0.70 {
        "active"
    } else if confidence >= 0.50 {
        "needs_validation"
    } else {
        "archived"
    }
}

/// Whether a lesson should be deprecated: confidence collapsed, it fails
/// consistently, or humans contradicted it more than once.
pub fn check_deprecation(
    confidence: f64,
    failure_count: u64,
    success_count: u64,
    contradiction_count: u64,
) -> bool {
    confidence < DEPRECATION_THRESHOLD
        || (failure_count >= 3 && success_count == 0)
        || contradiction_count >= 2
}
