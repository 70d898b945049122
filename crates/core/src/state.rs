//! Per-turn orchestration state and its merge-policy table.
//!
//! Every field of [`TurnState`] is described by a [`StateField`], which
//! carries the field's scope (conversation vs. turn) and how concurrent
//! writes combine. The table drives both the turn-start reset and the
//! merge of expert deltas at the scheduler's join point.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::expert::{Expert, ExpertTask};
use crate::message::{Message, Role};

/// How long a field's value lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldScope {
    /// Survives across turns (restored from checkpoints).
    Conversation,
    /// Re-initialized at the start of every turn.
    Turn,
}

/// How writes to a field combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// New items are appended in order.
    Append,
    /// Map union; keys written by different branches must be disjoint.
    Union,
    /// Last write replaces the value.
    Overwrite,
}

/// Identifies a field of [`TurnState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateField {
    Messages,
    PendingTasks,
    CurrentTask,
    ExpertOutputs,
    TtftMsByExpert,
    LatencyMsByExpert,
    Response,
    ManualSha256,
    SystemPrefixHash,
}

impl StateField {
    pub const ALL: [StateField; 9] = [
        StateField::Messages,
        StateField::PendingTasks,
        StateField::CurrentTask,
        StateField::ExpertOutputs,
        StateField::TtftMsByExpert,
        StateField::LatencyMsByExpert,
        StateField::Response,
        StateField::ManualSha256,
        StateField::SystemPrefixHash,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Messages => "messages",
            Self::PendingTasks => "pending_tasks",
            Self::CurrentTask => "current_task",
            Self::ExpertOutputs => "expert_outputs",
            Self::TtftMsByExpert => "ttft_ms_by_expert",
            Self::LatencyMsByExpert => "latency_ms_by_expert",
            Self::Response => "response",
            Self::ManualSha256 => "manual_sha256",
            Self::SystemPrefixHash => "system_prefix_hash",
        }
    }

    pub const fn scope(self) -> FieldScope {
        match self {
            Self::Messages => FieldScope::Conversation,
            _ => FieldScope::Turn,
        }
    }

    pub const fn merge_policy(self) -> MergePolicy {
        match self {
            Self::Messages => MergePolicy::Append,
            Self::ExpertOutputs | Self::TtftMsByExpert | Self::LatencyMsByExpert => {
                MergePolicy::Union
            }
            _ => MergePolicy::Overwrite,
        }
    }
}

impl std::fmt::Display for StateField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content hashes of the manual and of the shared system prefix.
///
/// Only these digests ever enter the state; the prefix text does not.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PromptFingerprint {
    pub manual_sha256: String,
    pub system_prefix_hash: String,
}

/// What one expert contributes to the turn.
///
/// A delta only ever names its own expert, so deltas from concurrent
/// branches touch disjoint keys.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpertDelta {
    pub expert: Expert,
    pub output: String,
    pub ttft_ms: Option<f64>,
    pub latency_ms: Option<f64>,
}

impl ExpertDelta {
    /// A text-only delta with no timing metrics.
    pub fn text(expert: Expert, output: impl Into<String>) -> Self {
        Self {
            expert,
            output: output.into(),
            ttft_ms: None,
            latency_ms: None,
        }
    }

    pub fn with_timing(mut self, ttft_ms: f64, latency_ms: f64) -> Self {
        self.ttft_ms = Some(ttft_ms);
        self.latency_ms = Some(latency_ms);
        self
    }
}

/// The state of one turn, plus the conversation it extends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnState {
    pub messages: Vec<Message>,
    pub pending_tasks: VecDeque<ExpertTask>,
    pub current_task: Option<ExpertTask>,
    pub expert_outputs: BTreeMap<Expert, String>,
    pub ttft_ms_by_expert: BTreeMap<Expert, f64>,
    pub latency_ms_by_expert: BTreeMap<Expert, f64>,
    pub response: String,
    pub manual_sha256: String,
    pub system_prefix_hash: String,
}

impl TurnState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a restored conversation.
    pub fn with_messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    /// Re-initialize every turn-scoped field and stamp the fingerprint.
    ///
    /// Conversation-scoped fields are left untouched.
    pub fn begin_turn(&mut self, fingerprint: &PromptFingerprint) {
        for field in StateField::ALL {
            if field.scope() == FieldScope::Turn {
                self.reset(field);
            }
        }
        self.manual_sha256 = fingerprint.manual_sha256.clone();
        self.system_prefix_hash = fingerprint.system_prefix_hash.clone();
    }

    fn reset(&mut self, field: StateField) {
        match field {
            StateField::Messages => self.messages.clear(),
            StateField::PendingTasks => self.pending_tasks.clear(),
            StateField::CurrentTask => self.current_task = None,
            StateField::ExpertOutputs => self.expert_outputs.clear(),
            StateField::TtftMsByExpert => self.ttft_ms_by_expert.clear(),
            StateField::LatencyMsByExpert => self.latency_ms_by_expert.clear(),
            StateField::Response => self.response.clear(),
            StateField::ManualSha256 => self.manual_sha256.clear(),
            StateField::SystemPrefixHash => self.system_prefix_hash.clear(),
        }
    }

    /// Merge an expert delta according to the field policies.
    ///
    /// All keyed fields are checked before any is written, so a conflicting
    /// delta leaves the state unchanged.
    pub fn apply(&mut self, delta: ExpertDelta) -> Result<()> {
        let expert = delta.expert;
        check_keyed(&self.expert_outputs, StateField::ExpertOutputs, expert)?;
        if delta.ttft_ms.is_some() {
            check_keyed(&self.ttft_ms_by_expert, StateField::TtftMsByExpert, expert)?;
        }
        if delta.latency_ms.is_some() {
            check_keyed(&self.latency_ms_by_expert, StateField::LatencyMsByExpert, expert)?;
        }

        self.expert_outputs.insert(expert, delta.output);
        if let Some(ttft) = delta.ttft_ms {
            self.ttft_ms_by_expert.insert(expert, ttft);
        }
        if let Some(latency) = delta.latency_ms {
            self.latency_ms_by_expert.insert(expert, latency);
        }
        Ok(())
    }

    /// Text of the most recent user message, if any.
    pub fn latest_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

fn check_keyed<V>(map: &BTreeMap<Expert, V>, field: StateField, expert: Expert) -> Result<()> {
    match field.merge_policy() {
        MergePolicy::Union if map.contains_key(&expert) => {
            Err(Error::MergeConflict { field, expert })
        }
        MergePolicy::Union | MergePolicy::Overwrite => Ok(()),
        MergePolicy::Append => Err(Error::Internal(format!("{field} is not a keyed field"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fingerprint() -> PromptFingerprint {
        PromptFingerprint {
            manual_sha256: "m".into(),
            system_prefix_hash: "p".into(),
        }
    }

    #[test]
    fn policy_table() {
        assert_eq!(StateField::Messages.scope(), FieldScope::Conversation);
        assert_eq!(StateField::Messages.merge_policy(), MergePolicy::Append);
        assert_eq!(StateField::ExpertOutputs.merge_policy(), MergePolicy::Union);
        assert_eq!(StateField::LatencyMsByExpert.merge_policy(), MergePolicy::Union);
        assert_eq!(StateField::Response.merge_policy(), MergePolicy::Overwrite);
        let turn_scoped = StateField::ALL
            .iter()
            .filter(|f| f.scope() == FieldScope::Turn)
            .count();
        assert_eq!(turn_scoped, 8);
    }

    #[test]
    fn begin_turn_resets_turn_fields_only() {
        let mut state = TurnState::with_messages(vec![Message::user("a"), Message::assistant("b")]);
        state
            .pending_tasks
            .push_back(ExpertTask::new(Expert::SupportConcierge, "old"));
        state.current_task = Some(ExpertTask::new(Expert::SupportConcierge, "old"));
        state.expert_outputs.insert(Expert::SupportConcierge, "old".into());
        state.ttft_ms_by_expert.insert(Expert::SupportConcierge, 1.0);
        state.latency_ms_by_expert.insert(Expert::SupportConcierge, 2.0);
        state.response = "old".into();

        state.begin_turn(&fingerprint());

        assert_eq!(state.messages.len(), 2);
        assert!(state.pending_tasks.is_empty());
        assert!(state.current_task.is_none());
        assert!(state.expert_outputs.is_empty());
        assert!(state.ttft_ms_by_expert.is_empty());
        assert!(state.latency_ms_by_expert.is_empty());
        assert!(state.response.is_empty());
        assert_eq!(state.manual_sha256, "m");
        assert_eq!(state.system_prefix_hash, "p");
    }

    #[test]
    fn apply_unions_disjoint_deltas() {
        let mut state = TurnState::new();
        state
            .apply(ExpertDelta::text(Expert::TechnicalSpecialist, "tech"))
            .unwrap();
        state
            .apply(ExpertDelta::text(Expert::ComplianceAuditor, "comp").with_timing(5.0, 9.0))
            .unwrap();

        assert_eq!(state.expert_outputs.len(), 2);
        assert_eq!(state.ttft_ms_by_expert.len(), 1);
        assert_eq!(state.latency_ms_by_expert[&Expert::ComplianceAuditor], 9.0);
        let keys: Vec<_> = state.expert_outputs.keys().copied().collect();
        assert_eq!(keys, vec![Expert::ComplianceAuditor, Expert::TechnicalSpecialist]);
    }

    #[test]
    fn apply_rejects_colliding_delta_without_partial_write() {
        let mut state = TurnState::new();
        state
            .apply(ExpertDelta::text(Expert::SupportConcierge, "first"))
            .unwrap();
        let err = state
            .apply(ExpertDelta::text(Expert::SupportConcierge, "second").with_timing(1.0, 1.0))
            .unwrap_err();

        assert!(matches!(
            err,
            Error::MergeConflict {
                field: StateField::ExpertOutputs,
                expert: Expert::SupportConcierge
            }
        ));
        assert_eq!(state.expert_outputs[&Expert::SupportConcierge], "first");
        assert!(state.ttft_ms_by_expert.is_empty());
    }

    #[test]
    fn latest_user_text_skips_assistant() {
        let state = TurnState::with_messages(vec![
            Message::user("question"),
            Message::assistant("answer"),
        ]);
        assert_eq!(state.latest_user_text(), Some("question"));
        assert_eq!(TurnState::new().latest_user_text(), None);
    }

    #[test]
    fn state_json_uses_expert_names_as_keys() {
        let mut state = TurnState::new();
        state
            .apply(ExpertDelta::text(Expert::TechnicalSpecialist, "x").with_timing(1.5, 2.5))
            .unwrap();
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["expert_outputs"]["technical_specialist"], "x");
        assert_eq!(json["ttft_ms_by_expert"]["technical_specialist"], 1.5);

        let restored: TurnState = serde_json::from_value(json).unwrap();
        assert_eq!(restored, state);
    }
}
