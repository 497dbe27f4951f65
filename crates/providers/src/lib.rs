//! Model selection for Memoria.
//!
//! The classifier labels a message, the registry tracks which models exist
//! and how healthy they are, and the router turns a label plus a registry
//! snapshot into an ordered fallback chain. Backends implement
//! `memoria_core::ModelBackend`; the probe keeps registry health current.

pub mod backends;
pub mod classifier;
pub mod echo;
pub mod openai_compat;
pub mod probe;
pub mod registry;
pub mod router;

pub use backends::{BackendSet, build_from_config};
pub use classifier::{Classifier, KeywordClassifier, classify};
pub use echo::EchoBackend;
pub use openai_compat::OpenAiCompatBackend;
pub use probe::{HealthProbe, ProbeReport};
pub use registry::{ModelRegistry, ModelStatus};
pub use router::{ResourceBudget, Router};
