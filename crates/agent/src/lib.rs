//! The request path of Memoria.
//!
//! For every message:
//!
//! 1. **Assemble** the device's context (own turns + linked devices' turns)
//! 2. **Classify** the message into a task category
//! 3. **Route** the category to an ordered fallback chain
//! 4. **Invoke** models down the chain under a timeout
//! 5. **Commit** the user and assistant turns, and audit the outcome
//!
//! [`ChatService`] wires these together behind the send-message, link,
//! unlink, read-memory and model-status operations.

pub mod audit;
pub mod context;
pub mod invoker;
pub mod service;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use audit::{AuditEntry, AuditLog, AuditOutcome, AuditSink, TracingSink};
pub use context::{AssembledContext, AssemblyMetadata, ContextAssembler, ContextWindow};
pub use invoker::{Invocation, InvocationOutcome, Invoker, InvokerSettings};
pub use service::{ChatService, ChatServiceBuilder, SendMessage, SendMessageResponse, open_kv};
