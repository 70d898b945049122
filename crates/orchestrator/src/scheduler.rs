//! Task scheduling.
//!
//! # Sequential
//!
//! ```text
//! SelectNext ──► Dispatch ──► Expert(e) ──┐
//!     ▲                                   │
//!     └───────────────────────────────────┘
//!     │ (queue empty)
//!     ▼
//! Finalize
//! ```
//!
//! # Parallel
//!
//! The queue is drained and every task runs on its own tokio task with a
//! shared read-only copy of the history. Each branch writes only its own
//! slot; slots are merged after the join barrier, then `Finalize` runs.
//! Branches are never cancelled: a failure is reported after every
//! dispatched branch has finished.

use std::sync::Arc;

use cachelm_config::ExpertExecution;
use cachelm_core::error::{Error, Result};
use cachelm_core::expert::{Expert, ExpertTask};
use cachelm_core::message::Message;
use cachelm_core::state::{ExpertDelta, TurnState};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::executor::ExpertHandler;
use crate::finalize::finalize;

/// A state-machine step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    SelectNext,
    Dispatch,
    Expert(Expert),
    Finalize,
}

/// One recorded step with the `current_task` it observed.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub step: Step,
    pub current_task: Option<ExpertTask>,
}

/// Every step a turn went through, in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionTrace {
    transitions: Vec<Transition>,
}

impl ExecutionTrace {
    fn record(&mut self, step: Step, current_task: Option<ExpertTask>) {
        debug!(
            ?step,
            current = current_task.as_ref().map(|t| t.expert.as_str()),
            "Scheduler transition"
        );
        self.transitions.push(Transition { step, current_task });
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn steps(&self) -> Vec<Step> {
        self.transitions.iter().map(|t| t.step).collect()
    }

    /// Experts in the order their deltas were produced.
    pub fn experts_run(&self) -> Vec<Expert> {
        self.transitions
            .iter()
            .filter_map(|t| match t.step {
                Step::Expert(e) => Some(e),
                _ => None,
            })
            .collect()
    }
}

/// Runs the routed tasks with one strategy.
pub struct Scheduler {
    handler: Arc<dyn ExpertHandler>,
    execution: ExpertExecution,
}

impl Scheduler {
    pub fn new(handler: Arc<dyn ExpertHandler>, execution: ExpertExecution) -> Self {
        Self { handler, execution }
    }

    pub fn execution(&self) -> ExpertExecution {
        self.execution
    }

    /// Execute `state.pending_tasks` and finalize.
    ///
    /// On return `pending_tasks` is empty and `current_task` is `None`.
    pub async fn run(&self, state: &mut TurnState) -> Result<ExecutionTrace> {
        match self.execution {
            ExpertExecution::Sequential => self.run_sequential(state).await,
            ExpertExecution::Parallel => self.run_parallel(state).await,
        }
    }

    async fn run_sequential(&self, state: &mut TurnState) -> Result<ExecutionTrace> {
        let mut trace = ExecutionTrace::default();
        let mut step = Step::SelectNext;

        loop {
            step = match step {
                Step::SelectNext => {
                    state.current_task = state.pending_tasks.pop_front();
                    trace.record(step, state.current_task.clone());
                    if state.current_task.is_some() {
                        Step::Dispatch
                    } else {
                        Step::Finalize
                    }
                }
                Step::Dispatch => {
                    trace.record(step, state.current_task.clone());
                    match &state.current_task {
                        Some(task) => Step::Expert(task.expert),
                        None => Step::Finalize,
                    }
                }
                Step::Expert(expert) => {
                    let task = state
                        .current_task
                        .clone()
                        .ok_or_else(|| Error::Internal(format!("{expert} dispatched without a task")))?;
                    let delta = self.handler.execute(&task, &state.messages).await?;
                    check_delta(&task, &delta)?;
                    state.apply(delta)?;
                    trace.record(step, Some(task));
                    Step::SelectNext
                }
                Step::Finalize => {
                    finalize(state);
                    trace.record(step, None);
                    break;
                }
            };
        }

        Ok(trace)
    }

    async fn run_parallel(&self, state: &mut TurnState) -> Result<ExecutionTrace> {
        let mut trace = ExecutionTrace::default();
        let tasks: Vec<ExpertTask> = state.pending_tasks.drain(..).collect();
        state.current_task = None;

        if !tasks.is_empty() {
            let history: Arc<[Message]> = state.messages.clone().into();
            let mut slots: Vec<Option<ExpertDelta>> = vec![None; tasks.len()];
            let mut join_set = JoinSet::new();

            for (slot, task) in tasks.iter().cloned().enumerate() {
                let handler = Arc::clone(&self.handler);
                let history = Arc::clone(&history);

                join_set.spawn(async move {
                    let result = handler.execute(&task, &history).await;
                    (slot, task, result)
                });
            }

            // Every dispatched branch runs to completion; the first error is
            // reported once all have joined.
            let mut first_error: Option<Error> = None;
            while let Some(joined) = join_set.join_next().await {
                let outcome = joined
                    .map_err(|e| Error::Internal(format!("Expert task failed to join: {e}")))
                    .and_then(|(slot, task, result)| {
                        let delta = result?;
                        check_delta(&task, &delta)?;
                        Ok((slot, task, delta))
                    });

                match outcome {
                    Ok((slot, task, delta)) => {
                        trace.record(Step::Expert(task.expert), Some(task));
                        slots[slot] = Some(delta);
                    }
                    Err(e) => {
                        warn!(error = %e, "Expert branch failed");
                        first_error.get_or_insert(e);
                    }
                }
            }

            if let Some(e) = first_error {
                return Err(e);
            }

            for delta in slots.into_iter().flatten() {
                state.apply(delta)?;
            }
        }

        finalize(state);
        trace.record(Step::Finalize, None);
        Ok(trace)
    }
}

fn check_delta(task: &ExpertTask, delta: &ExpertDelta) -> Result<()> {
    if delta.expert != task.expert {
        return Err(Error::Internal(format!(
            "{} handler returned a delta for {}",
            task.expert, delta.expert
        )));
    }
    Ok(())
}
