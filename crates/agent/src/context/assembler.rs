//! Context assembly: builds the bounded history a model sees for one request.
//!
//! 1. Read the requesting device's recent turns.
//! 2. Read each linked device's recent turns.
//! 3. Merge by timestamp ascending (ties by device id, then log position).
//! 4. Drop from the oldest end until the total character count fits **C**.
//! 5. Drop from the oldest end until the turn count fits **W**.
//!
//! Every included turn carries its origin device and whether it came from
//! a link. With no links the output is the device's own truncated history.
//!
//! # Determinism
//!
//! [`merge_and_truncate`] is a pure function of its inputs; nothing here
//! reads the clock.

use memoria_core::backend::ContextTurn;
use memoria_core::error::StorageError;
use memoria_core::turn::{DeviceId, Turn};
use memoria_memory::{ContextStore, LinkRegistry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// The two bounds on an assembled context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextWindow {
    /// W
    pub max_turns: usize,
    /// C
    pub max_chars: usize,
}

impl Default for ContextWindow {
    fn default() -> Self {
        Self {
            max_turns: 20,
            max_chars: 8000,
        }
    }
}

/// The assembled context, ready for a model call.
#[derive(Debug, Clone, Default)]
pub struct AssembledContext {
    /// Included turns, oldest first.
    pub turns: Vec<ContextTurn>,
    pub metadata: AssemblyMetadata,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn total_chars(&self) -> usize {
        self.turns.iter().map(|t| t.content.chars().count()).sum()
    }
}

/// What assembly considered and what it dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyMetadata {
    /// Linked devices whose turns were read.
    pub linked_devices: Vec<DeviceId>,
    /// Turns read before truncation.
    pub candidates: usize,
    pub own_turns: usize,
    pub linked_turns: usize,
    /// Dropped to fit the character budget.
    pub dropped_for_chars: usize,
    /// Dropped to fit the turn budget.
    pub dropped_for_turns: usize,
    pub total_chars: usize,
}

pub struct ContextAssembler {
    store: Arc<ContextStore>,
    links: Arc<LinkRegistry>,
    window: ContextWindow,
}

impl ContextAssembler {
    pub fn new(store: Arc<ContextStore>, links: Arc<LinkRegistry>, window: ContextWindow) -> Self {
        Self {
            store,
            links,
            window,
        }
    }

    pub fn window(&self) -> ContextWindow {
        self.window
    }

    /// Assemble the context for `device` from the store and the current
    /// link snapshot.
    pub async fn assemble(&self, device: &DeviceId) -> Result<AssembledContext, StorageError> {
        // No device can contribute more than W turns to the result.
        let limit = self.window.max_turns;
        let own = self.store.read(device, limit).await?;

        let mut linked = Vec::new();
        for neighbor in self.links.neighbors(device) {
            let turns = self.store.read(&neighbor, limit).await?;
            linked.push((neighbor, turns));
        }

        let assembled = merge_and_truncate(self.window, device, own, linked);
        debug!(
            device_id = %device,
            turns = assembled.turns.len(),
            chars = assembled.metadata.total_chars,
            linked_devices = assembled.metadata.linked_devices.len(),
            "Context assembled"
        );
        Ok(assembled)
    }
}

/// Merge a device's turns with its neighbors' and apply the window.
pub fn merge_and_truncate(
    window: ContextWindow,
    device: &DeviceId,
    own: Vec<Turn>,
    linked: Vec<(DeviceId, Vec<Turn>)>,
) -> AssembledContext {
    let mut metadata = AssemblyMetadata {
        linked_devices: linked.iter().map(|(d, _)| d.clone()).collect(),
        ..AssemblyMetadata::default()
    };

    let mut merged: Vec<(usize, bool, Turn)> = own
        .into_iter()
        .enumerate()
        .map(|(i, t)| (i, false, t))
        .collect();
    for (_, turns) in linked {
        merged.extend(turns.into_iter().enumerate().map(|(i, t)| (i, true, t)));
    }
    metadata.candidates = merged.len();

    merged.sort_by(|(ia, _, a), (ib, _, b)| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.device_id.cmp(&b.device_id))
            .then_with(|| ia.cmp(ib))
    });

    let mut total_chars: usize = merged.iter().map(|(_, _, t)| t.char_len()).sum();
    let mut start = 0;

    while total_chars > window.max_chars && start < merged.len() {
        total_chars -= merged[start].2.char_len();
        start += 1;
        metadata.dropped_for_chars += 1;
    }
    while merged.len() - start > window.max_turns {
        total_chars -= merged[start].2.char_len();
        start += 1;
        metadata.dropped_for_turns += 1;
    }

    let turns: Vec<ContextTurn> = merged
        .into_iter()
        .skip(start)
        .map(|(_, linked, turn)| ContextTurn {
            linked: linked && turn.device_id != *device,
            origin_device: turn.device_id,
            role: turn.role,
            content: turn.content,
            timestamp: turn.timestamp,
        })
        .collect();

    metadata.linked_turns = turns.iter().filter(|t| t.linked).count();
    metadata.own_turns = turns.len() - metadata.linked_turns;
    metadata.total_chars = total_chars;

    AssembledContext { turns, metadata }
}
