//! # cachelm Core
//!
//! Domain types, traits, and error definitions for the cachelm expert
//! orchestrator. It performs no I/O; it defines the domain model that all
//! other crates implement against.
//!
//! ## Design Philosophy
//!
//! The model client and the checkpoint store are traits here. Implementations
//! live in their respective crates, so the orchestration engine can be driven
//! by scripted providers and in-memory stores in tests.

pub mod checkpoint;
pub mod error;
pub mod expert;
pub mod message;
pub mod provider;
pub mod state;

// Re-export key types at crate root for ergonomics
pub use checkpoint::{Checkpoint, CheckpointStore, ThreadId};
pub use error::{Error, ProviderError, Result, RoutingError, StoreError};
pub use expert::{Expert, ExpertTask, RoutingDecision};
pub use message::{Message, Role, content_to_text};
pub use provider::{ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk, Usage};
pub use state::{ExpertDelta, FieldScope, MergePolicy, PromptFingerprint, StateField, TurnState};
