//! Expert execution.
//!
//! The scheduler drives any [`ExpertHandler`]. Two are provided:
//! - [`StubExpert`] returns a fixed placeholder answer without model calls
//! - [`ModelExpert`] streams from the model and records TTFT and latency

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use cachelm_core::error::Result;
use cachelm_core::expert::{Expert, ExpertTask};
use cachelm_core::message::Message;
use cachelm_core::state::ExpertDelta;
use tracing::debug;

use crate::client::ModelClient;
use crate::manual::ReferenceDocument;
use crate::prompt;

/// Produces one expert's contribution to a turn.
///
/// `history` is the conversation so far, including the current utterance.
/// The returned delta must name `task.expert`.
#[async_trait]
pub trait ExpertHandler: Send + Sync {
    async fn execute(&self, task: &ExpertTask, history: &[Message]) -> Result<ExpertDelta>;
}

/// Placeholder text used when no model is wired in.
pub fn stub_output(expert: Expert, query: &str) -> String {
    format!(
        "{} (stub): I will answer from the manual once LLM calls are wired in. Query: {query}",
        expert.label()
    )
}

/// Deterministic answers, no timing metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubExpert;

#[async_trait]
impl ExpertHandler for StubExpert {
    async fn execute(&self, task: &ExpertTask, _history: &[Message]) -> Result<ExpertDelta> {
        Ok(ExpertDelta::text(task.expert, stub_output(task.expert, &task.query)))
    }
}

/// Streams an answer from the model, grounded in the manual.
#[derive(Debug, Clone)]
pub struct ModelExpert {
    client: ModelClient,
    document: Arc<ReferenceDocument>,
}

impl ModelExpert {
    pub fn new(client: ModelClient, document: Arc<ReferenceDocument>) -> Self {
        Self { client, document }
    }
}

fn elapsed_ms(from: Instant, to: Instant) -> f64 {
    to.duration_since(from).as_secs_f64() * 1000.0
}

#[async_trait]
impl ExpertHandler for ModelExpert {
    async fn execute(&self, task: &ExpertTask, history: &[Message]) -> Result<ExpertDelta> {
        let messages = prompt::build_messages(task.expert, &self.document, history, &task.query);
        let request = self.client.request(messages).streaming();

        let start = Instant::now();
        let mut first_fragment: Option<Instant> = None;
        let mut output = String::new();

        let mut rx = self.client.provider().stream(request).await?;
        while let Some(chunk) = rx.recv().await {
            let chunk = chunk?;
            if let Some(content) = chunk.content.as_deref().filter(|c| !c.is_empty()) {
                first_fragment.get_or_insert_with(Instant::now);
                output.push_str(content);
            }
            if chunk.done {
                break;
            }
        }

        let end = Instant::now();
        let ttft_ms = elapsed_ms(start, first_fragment.unwrap_or(end));
        let latency_ms = elapsed_ms(start, end);

        debug!(
            expert = %task.expert,
            ttft_ms,
            latency_ms,
            chars = output.len(),
            "Expert stream complete"
        );

        Ok(ExpertDelta::text(task.expert, output.trim()).with_timing(ttft_ms, latency_ms))
    }
}
