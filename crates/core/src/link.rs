//! Device links: symmetric, revocable visibility grants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::turn::DeviceId;

/// An unordered pair of devices that can see each other's recent turns.
///
/// The pair is stored in canonical order (`device_a <= device_b`) so that
/// `Link::new(a, b) == Link::new(b, a)` up to `created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub device_a: DeviceId,
    pub device_b: DeviceId,
    pub created_at: DateTime<Utc>,
}

impl Link {
    pub fn new(a: DeviceId, b: DeviceId) -> Self {
        let (device_a, device_b) = Self::canonical(a, b);
        Self {
            device_a,
            device_b,
            created_at: Utc::now(),
        }
    }

    /// Order a pair so that the smaller id comes first.
    pub fn canonical(a: DeviceId, b: DeviceId) -> (DeviceId, DeviceId) {
        if a <= b { (a, b) } else { (b, a) }
    }

    /// The canonical key of this pair.
    pub fn key(&self) -> (DeviceId, DeviceId) {
        (self.device_a.clone(), self.device_b.clone())
    }

    /// Given one endpoint, return the other one.
    pub fn other(&self, device: &DeviceId) -> Option<&DeviceId> {
        if &self.device_a == device {
            Some(&self.device_b)
        } else if &self.device_b == device {
            Some(&self.device_a)
        } else {
            None
        }
    }
}
