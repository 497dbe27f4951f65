//! Router: turns a task category into an ordered fallback chain.
//!
//! Selection over one registry snapshot:
//!
//! 1. Models tagged with the category. If no model in the catalog declares
//!    the category at all, models tagged with the generic tag instead.
//! 2. Drop models over the resource budget.
//! 3. Drop models that are not healthy.
//! 4. Sort by priority rank (ties by id).
//! 5. If nothing is left, fall back to the designated generic model unless
//!    it is unavailable.

use memoria_core::error::RoutingError;
use memoria_core::model::{
    Availability, LatencyClass, ModelDescriptor, RamClass, ReasonCode, ResourceCost,
    RoutingDecision, TaskCategory,
};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::registry::ModelRegistry;

/// Upper bounds on what a routed model may cost. `None` means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceBudget {
    pub max_ram: Option<RamClass>,
    pub max_latency: Option<LatencyClass>,
}

impl ResourceBudget {
    pub fn allows(&self, cost: &ResourceCost) -> bool {
        self.max_ram.is_none_or(|max| cost.ram <= max)
            && self.max_latency.is_none_or(|max| cost.latency <= max)
    }
}

pub struct Router {
    registry: Arc<ModelRegistry>,
    generic_model: String,
    budget: ResourceBudget,
    retry_after_secs: u64,
}

impl Router {
    pub fn new(registry: Arc<ModelRegistry>, generic_model: impl Into<String>) -> Self {
        Self {
            registry,
            generic_model: generic_model.into(),
            budget: ResourceBudget::default(),
            retry_after_secs: 30,
        }
    }

    pub fn with_budget(mut self, budget: ResourceBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Hint returned to callers when nothing can be routed.
    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after_secs = secs;
        self
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn generic_model(&self) -> &str {
        &self.generic_model
    }

    /// Route against the registry's current state.
    pub fn route(&self, category: TaskCategory) -> Result<RoutingDecision, RoutingError> {
        let snapshot = self.registry.descriptors();
        self.route_snapshot(category, &snapshot)
    }

    /// Route against an explicit snapshot. Deterministic for a given input.
    pub fn route_snapshot(
        &self,
        category: TaskCategory,
        snapshot: &[ModelDescriptor],
    ) -> Result<RoutingDecision, RoutingError> {
        let declared = snapshot.iter().any(|d| d.supports(category.as_str()));
        let (tag, reason) = if declared {
            (category.as_str(), ReasonCode::CategoryMatch)
        } else {
            (TaskCategory::GENERIC_TAG, ReasonCode::GenericTag)
        };

        let mut eligible: Vec<&ModelDescriptor> = snapshot
            .iter()
            .filter(|d| d.supports(tag))
            .filter(|d| self.budget.allows(&d.resource_cost))
            .filter(|d| d.availability.is_healthy())
            .collect();
        eligible.sort_by(|a, b| a.priority_rank.cmp(&b.priority_rank).then_with(|| a.id.cmp(&b.id)));

        if let Some(first) = eligible.first() {
            let decision = RoutingDecision {
                chosen_model_id: first.id.clone(),
                fallback_chain: eligible.iter().map(|d| d.id.clone()).collect(),
                reason_code: reason,
            };
            debug!(
                category = %category,
                chosen = %decision.chosen_model_id,
                chain_len = decision.fallback_chain.len(),
                reason = %decision.reason_code,
                "Routed"
            );
            return Ok(decision);
        }

        let generic = snapshot
            .iter()
            .find(|d| d.id == self.generic_model && d.availability != Availability::Unavailable);
        match generic {
            Some(model) => {
                warn!(category = %category, model = %model.id, "No healthy model for category, using generic fallback");
                Ok(RoutingDecision {
                    chosen_model_id: model.id.clone(),
                    fallback_chain: vec![model.id.clone()],
                    reason_code: ReasonCode::GenericFallback,
                })
            }
            None => {
                warn!(category = %category, "No model available");
                Err(RoutingError::NoModelAvailable {
                    category: category.as_str().to_string(),
                    retry_after_secs: self.retry_after_secs,
                })
            }
        }
    }

    /// A single-model decision for an explicitly requested model, if it
    /// exists and is healthy.
    pub fn route_override(&self, model_id: &str) -> Option<RoutingDecision> {
        let descriptor = self.registry.get(model_id)?;
        if !descriptor.availability.is_healthy() {
            debug!(model_id, state = descriptor.availability.as_str(), "Override model not healthy, routing normally");
            return None;
        }
        Some(RoutingDecision {
            chosen_model_id: descriptor.id.clone(),
            fallback_chain: vec![descriptor.id],
            reason_code: ReasonCode::ModelOverride,
        })
    }
}
