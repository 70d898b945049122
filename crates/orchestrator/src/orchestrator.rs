//! The turn entrypoint.
//!
//! One turn runs **Restore → Route → Schedule → Finalize → Save**:
//!
//! 1. **Restore** `messages` from the thread's snapshot, if any
//! 2. **Reset** every turn-scoped field and stamp the prompt fingerprint
//! 3. **Route** the latest user utterance to 1–3 experts
//! 4. **Schedule** the experts sequentially or in parallel, then finalize
//! 5. **Save** the whole state under the thread id

use std::sync::Arc;

use cachelm_config::{AppConfig, Mode, RouterMode};
use cachelm_core::checkpoint::{CheckpointStore, ThreadId};
use cachelm_core::error::{Error, Result, StoreError};
use cachelm_core::message::Message;
use cachelm_core::provider::Provider;
use cachelm_core::state::{PromptFingerprint, TurnState};
use tracing::{debug, info, warn};

use crate::client::ModelClient;
use crate::executor::{ExpertHandler, ModelExpert, StubExpert};
use crate::manual::ReferenceDocument;
use crate::prompt;
use crate::router::{ModelRouter, Router};
use crate::scheduler::{ExecutionTrace, Scheduler};

/// Routes, executes and persists turns over one reference document.
pub struct Orchestrator {
    /// Routing strategy
    router: Router,

    /// Expert execution strategy
    scheduler: Scheduler,

    /// The manual every expert answers from
    document: Arc<ReferenceDocument>,

    /// Optional snapshot store for threaded conversations
    store: Option<Arc<dyn CheckpointStore>>,
}

impl Orchestrator {
    pub fn new(router: Router, scheduler: Scheduler, document: Arc<ReferenceDocument>) -> Self {
        Self {
            router,
            scheduler,
            document,
            store: None,
        }
    }

    /// Attach a checkpoint store so turns with a thread id are persisted.
    pub fn with_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Wire router and experts from configuration.
    ///
    /// `provider` must be present whenever the router or the experts use
    /// the model.
    pub fn from_config(
        config: &AppConfig,
        document: Arc<ReferenceDocument>,
        provider: Option<Arc<dyn Provider>>,
    ) -> Result<Self> {
        let client = match provider {
            Some(provider) => Some(ModelClient::from_settings(provider, &config.llm_settings()?)),
            None if config.needs_model() => {
                return Err(Error::config(
                    "A model-backed mode is selected but no model client is configured",
                ));
            }
            None => None,
        };

        let router = match (config.effective_router_mode(), &client) {
            (RouterMode::Llm, Some(client)) => {
                Router::Model(ModelRouter::new(client.clone(), config.router_history))
            }
            _ => Router::Rules,
        };

        let handler: Arc<dyn ExpertHandler> = match (config.mode, client) {
            (Mode::Llm, Some(client)) => Arc::new(ModelExpert::new(client, Arc::clone(&document))),
            _ => Arc::new(StubExpert),
        };

        debug!(
            mode = ?config.mode,
            router = router.name(),
            execution = ?config.expert_execution,
            "Orchestrator configured"
        );

        Ok(Self::new(
            router,
            Scheduler::new(handler, config.expert_execution),
            document,
        ))
    }

    pub fn document(&self) -> &ReferenceDocument {
        &self.document
    }

    /// Digests of the manual and of the shared system prefix.
    pub fn fingerprint(&self) -> PromptFingerprint {
        prompt::fingerprint(&self.document)
    }

    pub fn store(&self) -> Option<&Arc<dyn CheckpointStore>> {
        self.store.as_ref()
    }

    /// Answer one user utterance.
    pub async fn run_turn(&self, input: &str, thread_id: Option<&ThreadId>) -> Result<TurnState> {
        self.run_messages(vec![Message::user(input)], thread_id).await
    }

    /// Answer a turn whose new messages are already normalized.
    ///
    /// `incoming` is appended to the restored conversation; the latest user
    /// message is what gets routed.
    pub async fn run_messages(
        &self,
        incoming: Vec<Message>,
        thread_id: Option<&ThreadId>,
    ) -> Result<TurnState> {
        let (state, _trace) = self.run_traced(incoming, thread_id).await?;
        Ok(state)
    }

    /// Like [`Self::run_messages`], also returning the scheduler trace.
    pub async fn run_traced(
        &self,
        incoming: Vec<Message>,
        thread_id: Option<&ThreadId>,
    ) -> Result<(TurnState, ExecutionTrace)> {
        let store = match (thread_id, &self.store) {
            (Some(_), None) => {
                return Err(Error::config(
                    "A thread id was given but no checkpoint store is configured",
                ));
            }
            (_, store) => store.as_ref(),
        };

        let mut state = match (thread_id, store) {
            (Some(thread_id), Some(store)) => restore(store.as_ref(), thread_id).await?,
            _ => TurnState::new(),
        };

        let restored = state.messages.len();
        state.begin_turn(&self.fingerprint());
        state.messages.extend(incoming);

        let utterance = state
            .latest_user_text()
            .map(str::to_owned)
            .ok_or_else(|| Error::Validation("No user message to route".into()))?;

        info!(
            thread_id = thread_id.map(ThreadId::as_str),
            restored,
            manual_sha256 = %state.manual_sha256,
            "Starting turn"
        );

        let decision = self.router.route(&utterance, &state.messages).await;
        state.pending_tasks = decision.into_tasks().into();

        let trace = self.scheduler.run(&mut state).await?;

        if let (Some(thread_id), Some(store)) = (thread_id, store) {
            store.save(thread_id, &state).await?;
            debug!(thread_id = %thread_id, messages = state.messages.len(), "Saved checkpoint");
        }

        info!(
            experts = ?trace.experts_run(),
            execution = ?self.scheduler.execution(),
            response_chars = state.response.len(),
            "Turn complete"
        );

        Ok((state, trace))
    }
}

/// Load a thread's conversation. A corrupt snapshot starts the thread over.
async fn restore(store: &dyn CheckpointStore, thread_id: &ThreadId) -> Result<TurnState> {
    match store.load(thread_id).await {
        Ok(Some(checkpoint)) => {
            debug!(
                thread_id = %thread_id,
                messages = checkpoint.state.messages.len(),
                "Restored checkpoint"
            );
            Ok(TurnState::with_messages(checkpoint.state.messages))
        }
        Ok(None) => Ok(TurnState::new()),
        Err(StoreError::Corrupt { reason, .. }) => {
            warn!(thread_id = %thread_id, reason = %reason, "Ignoring corrupt checkpoint");
            Ok(TurnState::new())
        }
        Err(e) => Err(e.into()),
    }
}
