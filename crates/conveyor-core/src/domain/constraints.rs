//! Execution constraints and the system-condition snapshot they are
//! evaluated against.

use serde::{Deserialize, Serialize};

/// Environmental predicates that must all hold before a task may be
/// dispatched. The empty set is always satisfied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraints {
    #[serde(default)]
    pub requires_charging: bool,

    #[serde(default)]
    pub requires_battery_not_low: bool,

    #[serde(default)]
    pub requires_storage_not_low: bool,

    #[serde(default)]
    pub requires_network: bool,
}

impl Constraints {
    /// No constraints: always dispatchable.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn charging(mut self) -> Self {
        self.requires_charging = true;
        self
    }

    pub fn battery_not_low(mut self) -> Self {
        self.requires_battery_not_low = true;
        self
    }

    pub fn storage_not_low(mut self) -> Self {
        self.requires_storage_not_low = true;
        self
    }

    pub fn network(mut self) -> Self {
        self.requires_network = true;
        self
    }

    /// Pure evaluation against a snapshot; no side effects.
    ///
    /// Re-run on every scheduling pass; a task that was satisfiable at
    /// enqueue time but is not at dispatch time simply stays enqueued.
    pub fn satisfied_by(&self, conditions: &SystemConditions) -> bool {
        (!self.requires_charging || conditions.charging)
            && (!self.requires_battery_not_low || conditions.battery_not_low)
            && (!self.requires_storage_not_low || conditions.storage_not_low)
            && (!self.requires_network || conditions.network_available)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Point-in-time snapshot of the conditions the scheduler cares about.
/// Supplied by an external provider; never mutated by the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemConditions {
    pub charging: bool,
    pub battery_not_low: bool,
    pub storage_not_low: bool,
    pub network_available: bool,
}

impl Default for SystemConditions {
    /// A healthy device: everything available.
    fn default() -> Self {
        Self {
            charging: true,
            battery_not_low: true,
            storage_not_low: true,
            network_available: true,
        }
    }
}
