//! End-to-end tests for the cachelm turn pipeline.
//!
//! These exercise config → manual → router → scheduler → finalizer →
//! checkpoint, the same wiring the `run` command uses.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use cachelm_checkpoint::{InMemoryStore, SqliteStore};
use cachelm_config::{AppConfig, ExpertExecution, Mode, RouterMode};
use cachelm_core::checkpoint::{CheckpointStore, ThreadId};
use cachelm_core::error::ProviderError;
use cachelm_core::expert::Expert;
use cachelm_core::message::{Message, Role};
use cachelm_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use cachelm_orchestrator::prompt::{MANUAL_BEGIN, MANUAL_END};
use cachelm_orchestrator::router::route_by_rules;
use cachelm_orchestrator::{Orchestrator, ReferenceDocument, render_metrics};
use serde_json::json;

const MANUAL: &str = "# Operations Manual\n\n## API\nThe partner API allows 100 requests per minute.\n\n## Policy\nCustomer data cannot leave the EU.\n";

// ── Mock Provider ────────────────────────────────────────────────────────

/// Replays scripted replies in order; records every request.
struct ScriptedProvider {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .expect("ScriptedProvider exhausted");
        self.requests.lock().unwrap().push(request);
        Ok(ProviderResponse {
            message: Message::assistant(reply),
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model: "mock-model".into(),
        })
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────

struct Fixture {
    _dir: tempfile::TempDir,
    manual_path: PathBuf,
    db_path: PathBuf,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let manual_path = dir.path().join("operations_manual.md");
    std::fs::write(&manual_path, MANUAL).unwrap();
    let db_path = dir.path().join("state").join("checkpoints.sqlite");
    Fixture {
        _dir: dir,
        manual_path,
        db_path,
    }
}

fn config(fixture: &Fixture, execution: ExpertExecution) -> AppConfig {
    let mut config = AppConfig::default();
    config.manual_path = fixture.manual_path.clone();
    config.expert_execution = execution;
    config
}

fn stub_orchestrator(fixture: &Fixture, execution: ExpertExecution) -> Orchestrator {
    let config = config(fixture, execution);
    let document = Arc::new(ReferenceDocument::load(&config.manual_path).unwrap());
    Orchestrator::from_config(&config, document, None).unwrap()
}

fn experts(state: &cachelm_core::TurnState) -> Vec<Expert> {
    state.expert_outputs.keys().copied().collect()
}

// ── Examples ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn single_technical_question() {
    let fx = fixture();
    let state = stub_orchestrator(&fx, ExpertExecution::Sequential)
        .run_turn("What is the API limit?", None)
        .await
        .unwrap();

    assert_eq!(experts(&state), vec![Expert::TechnicalSpecialist]);
    assert!(state.response.contains("Technical Specialist (stub)"));
    assert!(render_metrics(&state).is_none());
}

#[tokio::test]
async fn three_part_question_reaches_every_expert() {
    let fx = fixture();
    let input = "Can I do this under policy, what are the API limits, and summarize in steps?";

    for execution in [ExpertExecution::Sequential, ExpertExecution::Parallel] {
        let state = stub_orchestrator(&fx, execution).run_turn(input, None).await.unwrap();
        assert_eq!(
            experts(&state),
            vec![Expert::ComplianceAuditor, Expert::TechnicalSpecialist, Expert::SupportConcierge]
        );

        let sections: Vec<&str> = state.response.split("\n\n").collect();
        assert_eq!(sections.len(), 3);
        assert!(sections[0].starts_with("Compliance Auditor (stub)"));
        assert!(sections[1].starts_with("Technical Specialist (stub)"));
        assert!(sections[2].starts_with("Support Concierge (stub)"));
    }
}

#[tokio::test]
async fn non_json_router_output_matches_rule_routing() {
    let fx = fixture();
    let mut config = config(&fx, ExpertExecution::Sequential);
    config.router_mode = Some(RouterMode::Llm);
    config.llm.api_key = Some("sk-test".into());

    let input = "Is it allowed to raise the API timeout?";
    let provider = Arc::new(ScriptedProvider::new(&["Sure! I think the compliance team should look."]));
    let document = Arc::new(ReferenceDocument::load(&config.manual_path).unwrap());
    let orchestrator = Orchestrator::from_config(&config, document, Some(provider.clone())).unwrap();

    let state = orchestrator.run_turn(input, None).await.unwrap();
    assert_eq!(experts(&state), route_by_rules(input).experts());
    assert_eq!(provider.requests().len(), 1);
}

#[tokio::test]
async fn fenced_router_json_with_blank_query_uses_utterance() {
    let fx = fixture();
    let mut config = config(&fx, ExpertExecution::Parallel);
    config.mode = Mode::Llm;
    config.llm.api_key = Some("sk-test".into());

    let input = "Walk me through data exports";
    let provider = Arc::new(ScriptedProvider::new(&[
        "```json\n{\"tasks\": [{\"expert\": \"support_concierge\", \"query\": \"  \"}]}\n```",
        "1. Open the export screen.",
    ]));
    let document = Arc::new(ReferenceDocument::load(&config.manual_path).unwrap());
    let orchestrator = Orchestrator::from_config(&config, document, Some(provider.clone())).unwrap();

    let state = orchestrator.run_turn(input, None).await.unwrap();
    assert_eq!(experts(&state), vec![Expert::SupportConcierge]);
    assert_eq!(state.response, "1. Open the export screen.");

    // The expert request ends with the utterance as its query.
    let expert_request = &provider.requests()[1];
    assert!(expert_request.stream);
    assert_eq!(expert_request.messages.last(), Some(&Message::user(input)));
    assert!(expert_request.messages[0].content.contains(MANUAL_BEGIN));
    assert!(expert_request.messages[0].content.contains(MANUAL_END));

    let metrics = render_metrics(&state).unwrap();
    assert!(metrics.starts_with("metrics:\n- support_concierge: ttft_ms="));
    assert!(metrics.contains("latency_ms="));
}

#[tokio::test]
async fn list_of_blocks_content_routes_on_flattened_text() {
    let fx = fixture();
    let raw = json!([
        {
            "type": "human",
            "content": [
                {"type": "text", "text": "What is the "},
                "API ",
                {"type": "text", "content": "limit?"}
            ]
        }
    ]);
    let incoming: Vec<Message> = raw
        .as_array()
        .unwrap()
        .iter()
        .map(|v| Message::from_json(v).unwrap())
        .collect();
    assert_eq!(incoming[0].role, Role::User);
    assert_eq!(incoming[0].content, "What is the API limit?");

    let state = stub_orchestrator(&fx, ExpertExecution::Sequential)
        .run_messages(incoming, None)
        .await
        .unwrap();
    assert_eq!(experts(&state), vec![Expert::TechnicalSpecialist]);
}

// ── Scheduling ───────────────────────────────────────────────────────────

#[tokio::test]
async fn sequential_and_parallel_agree() {
    let fx = fixture();
    let inputs = [
        "hello there",
        "Is this prohibited by regulation?",
        "Explain the rate limit error and whether I must report it",
    ];

    for input in inputs {
        let sequential = stub_orchestrator(&fx, ExpertExecution::Sequential)
            .run_turn(input, None)
            .await
            .unwrap();
        let parallel = stub_orchestrator(&fx, ExpertExecution::Parallel)
            .run_turn(input, None)
            .await
            .unwrap();

        assert_eq!(sequential.response, parallel.response, "input: {input}");
        assert_eq!(sequential.expert_outputs, parallel.expert_outputs);
        assert!(sequential.pending_tasks.is_empty() && parallel.pending_tasks.is_empty());
        assert!(sequential.current_task.is_none() && parallel.current_task.is_none());
    }
}

// ── Persistence ──────────────────────────────────────────────────────────

#[tokio::test]
async fn sqlite_thread_survives_restart() {
    let fx = fixture();
    let thread = ThreadId::from("ops-7");
    let turns = [
        "What is the API limit?",
        "Is sharing data allowed?",
        "How do I rotate a key?",
    ];

    for (i, input) in turns.iter().enumerate() {
        // Fresh store and orchestrator each turn, as separate CLI runs would be.
        let store = Arc::new(SqliteStore::open(&fx.db_path).await.unwrap());
        let orchestrator = stub_orchestrator(&fx, ExpertExecution::Sequential).with_store(store);
        let state = orchestrator.run_turn(input, Some(&thread)).await.unwrap();
        assert_eq!(state.messages.len(), 2 * (i + 1));
    }

    let store = SqliteStore::open(&fx.db_path).await.unwrap();
    assert_eq!(store.list_threads().await.unwrap(), vec![thread.clone()]);

    let saved = store.load(&thread).await.unwrap().unwrap().state;
    assert_eq!(saved.messages.len(), 6);
    assert_eq!(experts(&saved), vec![Expert::SupportConcierge]);

    let roles: Vec<Role> = saved.messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        vec![Role::User, Role::Assistant, Role::User, Role::Assistant, Role::User, Role::Assistant]
    );

    let json = serde_json::to_string(&saved).unwrap();
    assert!(!json.contains("100 requests per minute"));
    assert!(!json.contains(MANUAL_BEGIN));
}

#[tokio::test]
async fn threads_are_isolated() {
    let fx = fixture();
    let store = Arc::new(InMemoryStore::new());
    let orchestrator = stub_orchestrator(&fx, ExpertExecution::Parallel).with_store(store.clone());

    let a = ThreadId::from("a");
    let b = ThreadId::from("b");
    orchestrator.run_turn("What is the API limit?", Some(&a)).await.unwrap();
    orchestrator.run_turn("What is the API limit?", Some(&a)).await.unwrap();
    let state_b = orchestrator.run_turn("hello", Some(&b)).await.unwrap();

    assert_eq!(state_b.messages.len(), 2);
    assert_eq!(store.load(&a).await.unwrap().unwrap().state.messages.len(), 4);
    assert!(store.delete(&a).await.unwrap());
    assert_eq!(store.list_threads().await.unwrap(), vec![b]);
}

#[tokio::test]
async fn fingerprint_tracks_manual_bytes() {
    let fx = fixture();
    let before = stub_orchestrator(&fx, ExpertExecution::Sequential).run_turn("hi", None).await.unwrap();
    let again = stub_orchestrator(&fx, ExpertExecution::Sequential).run_turn("hi", None).await.unwrap();
    assert_eq!(before.manual_sha256, again.manual_sha256);
    assert_eq!(before.system_prefix_hash, again.system_prefix_hash);

    std::fs::write(&fx.manual_path, MANUAL.replace("100", "101")).unwrap();
    let after = stub_orchestrator(&fx, ExpertExecution::Sequential).run_turn("hi", None).await.unwrap();
    assert_ne!(before.manual_sha256, after.manual_sha256);
    assert_ne!(before.system_prefix_hash, after.system_prefix_hash);
}

#[tokio::test]
async fn missing_api_key_fails_before_any_call() {
    let fx = fixture();
    let mut config = config(&fx, ExpertExecution::Sequential);
    config.mode = Mode::Llm;

    let err = cachelm_providers::build_from_config(&config).err().unwrap();
    assert!(err.to_string().contains("OPENAI_API_KEY"));
}
