//! Model-assisted routing.
//!
//! The model is asked for `{"tasks":[{"expert":..,"query":..}]}`. Its reply
//! is parsed leniently (surrounding prose and code fences are tolerated)
//! and normalized into a valid [`RoutingDecision`].

use std::collections::BTreeMap;

use cachelm_core::error::{Result, RoutingError};
use cachelm_core::expert::{Expert, ExpertTask, RoutingDecision};
use cachelm_core::message::{Message, Role};
use serde_json::Value;
use tracing::debug;

use crate::client::ModelClient;

const ROUTER_SYSTEM_PROMPT: &[&str] = &[
    "You are a router for a banking assistant.",
    "Decide which specialist expert(s) should answer the user's request.",
    "",
    "Experts:",
    "- compliance_auditor: policy/regulation/can-cannot/allowed/prohibited questions",
    "- technical_specialist: API limits, specs, errors, troubleshooting questions",
    "- support_concierge: step-by-step procedures, summaries, user guidance",
    "",
    "Rules:",
    "- Return JSON ONLY (no prose, no markdown).",
    "- Output schema: {\"tasks\":[{\"expert\":\"<name>\",\"query\":\"<string>\"}, ...]}",
    "- tasks length: 1 to 3",
    "- expert must be one of: compliance_auditor, technical_specialist, support_concierge",
    "- If multiple experts are needed, include multiple tasks.",
    "- Prefer keeping the same query string for all tasks unless rewriting is necessary.",
    "- Prefer deterministic ordering: compliance_auditor, technical_specialist, support_concierge.",
    "- If unsure, choose support_concierge.",
];

pub fn router_system_prompt() -> String {
    ROUTER_SYSTEM_PROMPT.join("\n")
}

/// `USER:`/`ASSISTANT:` lines for the last `max_messages` messages.
pub fn render_history(messages: &[Message], max_messages: usize) -> String {
    let start = messages.len().saturating_sub(max_messages);
    messages[start..]
        .iter()
        .filter_map(|m| {
            let prefix = match m.role {
                Role::User => "USER",
                Role::Assistant => "ASSISTANT",
                Role::System => return None,
            };
            let content = m.content.trim();
            (!content.is_empty()).then(|| format!("{prefix}: {content}"))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// The user message sent to the routing model.
pub fn router_user_prompt(utterance: &str, history: &[Message], max_messages: usize) -> String {
    let rendered = render_history(history, max_messages);
    let mut prompt = format!("User input:\n{utterance}");
    if !rendered.is_empty() {
        prompt.push_str("\n\nRecent conversation:\n");
        prompt.push_str(&rendered);
    }
    prompt.trim().to_string()
}

/// The span from the first `{` to the last `}`, or the trimmed text.
fn extract_json_object(text: &str) -> &str {
    let trimmed = text.trim();
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

/// Parse and normalize a routing reply.
///
/// Non-object entries and unknown experts are dropped; a blank or missing
/// query becomes the utterance. A repeated expert keeps its last entry.
/// The result is in canonical order and capped at three tasks.
pub fn parse_routing_json(
    model_text: &str,
    utterance: &str,
) -> std::result::Result<RoutingDecision, RoutingError> {
    let value: Value = serde_json::from_str(extract_json_object(model_text))
        .map_err(|e| RoutingError::InvalidJson(e.to_string()))?;

    let object = value.as_object().ok_or(RoutingError::NotAnObject)?;
    let entries = object
        .get("tasks")
        .and_then(Value::as_array)
        .ok_or(RoutingError::MissingTasks)?;

    let mut by_expert: BTreeMap<Expert, String> = BTreeMap::new();
    for entry in entries {
        let Some(entry) = entry.as_object() else {
            continue;
        };
        let Some(expert) = entry
            .get("expert")
            .and_then(Value::as_str)
            .and_then(Expert::from_name)
        else {
            continue;
        };
        let query = entry
            .get("query")
            .and_then(Value::as_str)
            .filter(|q| !q.trim().is_empty())
            .unwrap_or(utterance);
        by_expert.insert(expert, query.to_string());
    }

    let tasks: Vec<ExpertTask> = by_expert
        .into_iter()
        .take(RoutingDecision::MAX_TASKS)
        .map(|(expert, query)| ExpertTask::new(expert, query))
        .collect();

    RoutingDecision::new(tasks).ok_or(RoutingError::NoValidTasks)
}

/// Routes by asking the model.
#[derive(Debug, Clone)]
pub struct ModelRouter {
    client: ModelClient,
    history_messages: usize,
}

impl ModelRouter {
    pub fn new(client: ModelClient, history_messages: usize) -> Self {
        Self {
            client,
            history_messages,
        }
    }

    /// One non-streaming call, then parse. Errors are for the caller to
    /// recover from.
    pub async fn route(&self, utterance: &str, history: &[Message]) -> Result<RoutingDecision> {
        let messages = vec![
            Message::system(router_system_prompt()),
            Message::user(router_user_prompt(utterance, history, self.history_messages)),
        ];

        let response = self
            .client
            .provider()
            .complete(self.client.request(messages))
            .await?;

        debug!(model = %response.model, reply = %response.message.content, "Router model replied");

        Ok(parse_routing_json(&response.message.content, utterance)?)
    }
}
