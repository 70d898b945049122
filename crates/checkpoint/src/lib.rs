//! Checkpoint store implementations for cachelm.
//!
//! Both backends implement `cachelm_core::CheckpointStore` and keep one
//! snapshot per thread; saving replaces the previous snapshot.

pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use in_memory::InMemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
