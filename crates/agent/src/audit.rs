//! Audit logging: one record per request that reaches a terminal state.
//!
//! Entries are kept in a bounded in-memory ring and forwarded to sinks.
//! The default sink writes to `tracing` under the `audit` target.

use chrono::{DateTime, Utc};
use memoria_core::model::{ReasonCode, TaskCategory};
use memoria_core::turn::DeviceId;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

/// How a request ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// A model answered and the turns were committed.
    Success,
    /// Routing or every attempt in the chain failed.
    Exhausted,
}

/// A single audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub device_id: DeviceId,
    pub outcome: AuditOutcome,
    pub reason_code: ReasonCode,
    /// Why the chain was chosen, when routing succeeded.
    pub routing_reason: Option<ReasonCode>,
    pub category: Option<TaskCategory>,
    pub model_used: Option<String>,
    pub attempts: usize,
    pub chain: Vec<String>,
}

/// Where audit entries are written besides the in-memory ring.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &AuditEntry);
}

/// Logs entries via `tracing::info!` with target `audit`.
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn record(&self, entry: &AuditEntry) {
        tracing::info!(
            target: "audit",
            request_id = %entry.request_id,
            device_id = %entry.device_id,
            outcome = ?entry.outcome,
            reason_code = %entry.reason_code,
            category = ?entry.category,
            model = ?entry.model_used,
            attempts = entry.attempts,
            "AUDIT"
        );
    }
}

pub struct AuditLog {
    entries: Mutex<VecDeque<AuditEntry>>,
    capacity: usize,
    sinks: Vec<Box<dyn AuditSink>>,
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("entry_count", &self.count())
            .field("capacity", &self.capacity)
            .field("sink_count", &self.sinks.len())
            .finish()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl AuditLog {
    /// A log keeping the newest `capacity` entries, with the tracing sink.
    pub fn new(capacity: usize) -> Self {
        Self::with_sinks(capacity, vec![Box::new(TracingSink)])
    }

    pub fn with_sinks(capacity: usize, sinks: Vec<Box<dyn AuditSink>>) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
            sinks,
        }
    }

    pub fn record(&self, entry: AuditEntry) {
        for sink in &self.sinks {
            sink.record(&entry);
        }

        let mut entries = self.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// All retained entries, oldest first.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.lock().iter().cloned().collect()
    }

    pub fn entries_by_outcome(&self, outcome: AuditOutcome) -> Vec<AuditEntry> {
        self.lock()
            .iter()
            .filter(|e| e.outcome == outcome)
            .cloned()
            .collect()
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<AuditEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}
