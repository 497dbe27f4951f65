//! Memory system for Memoria: per-device turn logs, the device link graph,
//! and the key-value backings they persist through.

pub mod context_store;
pub mod file_backend;
pub mod in_memory;
pub mod link_registry;
mod retry;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use context_store::ContextStore;
pub use file_backend::FileKv;
pub use in_memory::InMemoryKv;
pub use link_registry::{LinkGraph, LinkRegistry};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteKv;
