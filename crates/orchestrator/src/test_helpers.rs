//! Shared test helpers.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use cachelm_core::error::{ProviderError, Result};
use cachelm_core::expert::{Expert, ExpertTask};
use cachelm_core::message::Message;
use cachelm_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use cachelm_core::state::ExpertDelta;

use crate::executor::ExpertHandler;

/// A mock provider that replays scripted replies and records requests.
///
/// Once the script runs out it answers `answer to: <last user message>`.
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<&str>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(String::from).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError> {
        let reply = self.replies.lock().unwrap().pop_front().unwrap_or_else(|| {
            let last = request.messages.last().map(|m| m.content.as_str()).unwrap_or("");
            format!("answer to: {last}")
        });
        self.requests.lock().unwrap().push(request);
        Ok(make_text_response(&reply))
    }
}

/// A provider whose every call fails.
pub struct FailingProvider;

#[async_trait]
impl Provider for FailingProvider {
    fn name(&self) -> &str {
        "failing_mock"
    }

    async fn complete(&self, _request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError> {
        Err(ProviderError::Network("connection refused".into()))
    }
}

/// Create a simple text response.
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

/// An expert handler with fixed outputs and per-expert delays.
///
/// Delays let tests force a branch completion order.
#[derive(Default)]
pub struct ScriptedHandler {
    outputs: BTreeMap<Expert, String>,
    delays: BTreeMap<Expert, Duration>,
    failing: Option<Expert>,
}

impl ScriptedHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn output(mut self, expert: Expert, text: &str) -> Self {
        self.outputs.insert(expert, text.to_string());
        self
    }

    pub fn delay(mut self, expert: Expert, ms: u64) -> Self {
        self.delays.insert(expert, Duration::from_millis(ms));
        self
    }

    pub fn fail_on(mut self, expert: Expert) -> Self {
        self.failing = Some(expert);
        self
    }
}

#[async_trait]
impl ExpertHandler for ScriptedHandler {
    async fn execute(&self, task: &ExpertTask, _history: &[Message]) -> Result<ExpertDelta> {
        if let Some(delay) = self.delays.get(&task.expert) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing == Some(task.expert) {
            return Err(ProviderError::StreamInterrupted(format!("{} failed", task.expert)).into());
        }
        let output = self
            .outputs
            .get(&task.expert)
            .cloned()
            .unwrap_or_else(|| format!("{}: {}", task.expert, task.query));
        Ok(ExpertDelta::text(task.expert, output))
    }
}
