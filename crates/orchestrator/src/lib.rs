//! The cachelm orchestration engine.
//!
//! A turn flows **Router → Scheduler → Experts → Finalizer** over one
//! [`TurnState`](cachelm_core::TurnState):
//!
//! 1. The [`Router`] picks 1–3 experts for the latest user utterance
//! 2. The [`Scheduler`] runs them one at a time or concurrently
//! 3. Each [`ExpertHandler`] answers from the shared manual prefix
//! 4. [`finalize`](finalize::finalize) merges outputs in canonical order
//!
//! [`Orchestrator`] wraps the turn with optional per-thread persistence.

pub mod client;
pub mod executor;
pub mod finalize;
pub mod manual;
pub mod metrics;
pub mod orchestrator;
pub mod prompt;
pub mod router;
pub mod scheduler;

#[cfg(test)]
mod test_helpers;

pub use client::ModelClient;
pub use executor::{ExpertHandler, ModelExpert, StubExpert};
pub use manual::{ManualCache, ReferenceDocument};
pub use metrics::render_metrics;
pub use orchestrator::Orchestrator;
pub use router::Router;
pub use scheduler::{ExecutionTrace, Scheduler, Step, Transition};
