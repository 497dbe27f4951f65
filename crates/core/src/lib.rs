//! # Memoria Core
//!
//! Domain types, traits, and error definitions for the Memoria conversation
//! memory and model routing runtime. This crate has **zero framework
//! dependencies**: it defines the domain model that all other crates
//! implement against.
//!
//! ## Design Philosophy
//!
//! Storage and model backends are defined as traits here. Implementations
//! live in their respective crates. This enables:
//! - Swapping storage technology via configuration
//! - Easy testing with scripted model backends
//! - Clean dependency graph (all crates depend inward on core)

pub mod backend;
pub mod error;
pub mod link;
pub mod model;
pub mod store;
pub mod turn;

// Re-export key types at crate root for ergonomics
pub use backend::{ContextTurn, GenerateRequest, ModelBackend};
pub use error::{Error, ModelError, Result, RoutingError, StorageError};
pub use link::Link;
pub use model::{
    Availability, LatencyClass, ModelDescriptor, RamClass, ReasonCode, ResourceCost,
    RoutingDecision, TaskCategory,
};
pub use store::KvStore;
pub use turn::{ConversationId, DeviceId, Role, Turn};
