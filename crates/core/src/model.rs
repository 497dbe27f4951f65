//! Model catalog and routing domain types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The classifier's output label, used to select eligible models.
///
/// Variant order is the tie-break priority: earlier wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    Coding,
    ComplexAnalysis,
    General,
    Simple,
}

impl TaskCategory {
    /// All categories in tie-break priority order.
    pub const ALL: [TaskCategory; 4] = [
        TaskCategory::Coding,
        TaskCategory::ComplexAnalysis,
        TaskCategory::General,
        TaskCategory::Simple,
    ];

    /// The capability tag models declare for this category.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Coding => "coding",
            Self::ComplexAnalysis => "complex_analysis",
            Self::General => "general",
            Self::Simple => "simple",
        }
    }

    /// The generic tag used when no model declares a specific category.
    pub const GENERIC_TAG: &'static str = "general";
}

impl std::fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown task category: {s}"))
    }
}

/// Current health of a model. The only descriptor field that changes at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Healthy,
    Degraded,
    Unavailable,
}

impl Availability {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unavailable => "unavailable",
        }
    }
}

/// Memory footprint class, ordered small → large.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RamClass {
    Small,
    Medium,
    Large,
}

/// Response latency class, ordered fast → slow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LatencyClass {
    Fast,
    Moderate,
    Slow,
}

/// What it costs to run a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceCost {
    pub ram: RamClass,
    pub latency: LatencyClass,
}

impl Default for ResourceCost {
    fn default() -> Self {
        Self {
            ram: RamClass::Medium,
            latency: LatencyClass::Moderate,
        }
    }
}

/// The registry's record of a model's capabilities, cost, and health.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub id: String,
    pub capability_tags: BTreeSet<String>,
    #[serde(default)]
    pub resource_cost: ResourceCost,
    pub availability: Availability,
    /// Lower rank = preferred.
    pub priority_rank: u32,
}

impl ModelDescriptor {
    /// A healthy descriptor with the given tags and rank.
    pub fn new<I, S>(id: impl Into<String>, tags: I, priority_rank: u32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            capability_tags: tags.into_iter().map(Into::into).collect(),
            resource_cost: ResourceCost::default(),
            availability: Availability::Healthy,
            priority_rank,
        }
    }

    pub fn with_cost(mut self, ram: RamClass, latency: LatencyClass) -> Self {
        self.resource_cost = ResourceCost { ram, latency };
        self
    }

    pub fn with_availability(mut self, availability: Availability) -> Self {
        self.availability = availability;
        self
    }

    pub fn supports(&self, tag: &str) -> bool {
        self.capability_tags.contains(tag)
    }
}

/// Why a routing decision (or a terminal failure) came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    /// A model declaring the category was chosen.
    CategoryMatch,
    /// No model declares the category; a generic-tagged model was chosen.
    GenericTag,
    /// Nothing eligible was healthy; the designated generic model was used.
    GenericFallback,
    /// The caller named a healthy model explicitly.
    ModelOverride,
    /// A model answered.
    Served,
    /// Nothing could be routed.
    NoModelAvailable,
    /// Every attempt in the chain failed.
    AllModelsFailed,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CategoryMatch => "category_match",
            Self::GenericTag => "generic_tag",
            Self::GenericFallback => "generic_fallback",
            Self::ModelOverride => "model_override",
            Self::Served => "served",
            Self::NoModelAvailable => "no_model_available",
            Self::AllModelsFailed => "all_models_failed",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The router's output: a chosen model plus the ordered chain to fall back through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub chosen_model_id: String,
    /// Full ordered chain; `fallback_chain[0] == chosen_model_id`.
    pub fallback_chain: Vec<String>,
    pub reason_code: ReasonCode,
}
