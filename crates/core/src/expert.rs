//! Experts, expert tasks, and routing decisions.

use serde::{Deserialize, Serialize};

/// One of the three fixed responder variants.
///
/// Variant order is the canonical priority order; `Ord` follows it, so
/// ordered maps keyed by `Expert` iterate compliance first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expert {
    ComplianceAuditor,
    TechnicalSpecialist,
    SupportConcierge,
}

impl Expert {
    /// Canonical priority order used for routing output and response merging.
    pub const CANONICAL_ORDER: [Expert; 3] = [
        Expert::ComplianceAuditor,
        Expert::TechnicalSpecialist,
        Expert::SupportConcierge,
    ];

    /// The snake_case wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ComplianceAuditor => "compliance_auditor",
            Self::TechnicalSpecialist => "technical_specialist",
            Self::SupportConcierge => "support_concierge",
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ComplianceAuditor => "Compliance Auditor",
            Self::TechnicalSpecialist => "Technical Specialist",
            Self::SupportConcierge => "Support Concierge",
        }
    }

    /// Look up an expert by wire name. Exact match only.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::CANONICAL_ORDER
            .into_iter()
            .find(|expert| expert.as_str() == name)
    }
}

impl std::fmt::Display for Expert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of work for one expert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpertTask {
    pub expert: Expert,
    pub query: String,
}

impl ExpertTask {
    pub fn new(expert: Expert, query: impl Into<String>) -> Self {
        Self {
            expert,
            query: query.into(),
        }
    }
}

/// The router's output: 1 to 3 tasks, each expert at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoutingDecision {
    tasks: Vec<ExpertTask>,
}

impl RoutingDecision {
    /// Upper bound on tasks per turn.
    pub const MAX_TASKS: usize = 3;

    /// Build a decision, rejecting empty, oversized, or duplicate task lists.
    pub fn new(tasks: Vec<ExpertTask>) -> Option<Self> {
        if tasks.is_empty() || tasks.len() > Self::MAX_TASKS {
            return None;
        }
        let mut seen = Vec::with_capacity(tasks.len());
        for task in &tasks {
            if seen.contains(&task.expert) {
                return None;
            }
            seen.push(task.expert);
        }
        Some(Self { tasks })
    }

    /// A decision with exactly one task. Always valid.
    pub fn single(task: ExpertTask) -> Self {
        Self { tasks: vec![task] }
    }

    pub fn tasks(&self) -> &[ExpertTask] {
        &self.tasks
    }

    pub fn experts(&self) -> Vec<Expert> {
        self.tasks.iter().map(|t| t.expert).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Always false for a constructed decision; present for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn into_tasks(self) -> Vec<ExpertTask> {
        self.tasks
    }
}
