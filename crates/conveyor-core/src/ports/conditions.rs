//! SystemConditions provider port.

use std::sync::{Arc, RwLock};

use crate::domain::SystemConditions;

/// Supplies the current environmental snapshot on demand.
///
/// The scheduler polls this on every scheduling pass; it never caches a
/// snapshot across passes, so a provider can change its answer at any
/// time. Call `Scheduler::conditions_changed()` after a change to get an
/// immediate re-evaluation instead of waiting for the next poll tick.
pub trait ConditionsProvider: Send + Sync {
    fn current(&self) -> SystemConditions;
}

/// A settable provider backed by a shared snapshot.
///
/// Clone it, hand one copy to the scheduler and keep the other wherever
/// the platform events arrive (battery/network callbacks, tests, ...).
#[derive(Debug, Clone, Default)]
pub struct SharedConditions {
    inner: Arc<RwLock<SystemConditions>>,
}

impl SharedConditions {
    pub fn new(initial: SystemConditions) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    pub fn set(&self, conditions: SystemConditions) {
        *self.inner.write().expect("conditions lock poisoned") = conditions;
    }

    /// In-place tweak, e.g. `conditions.update(|c| c.charging = false)`.
    pub fn update(&self, f: impl FnOnce(&mut SystemConditions)) {
        f(&mut self.inner.write().expect("conditions lock poisoned"));
    }
}

impl ConditionsProvider for SharedConditions {
    fn current(&self) -> SystemConditions {
        *self.inner.read().expect("conditions lock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_conditions_reflect_updates() {
        let shared = SharedConditions::default();
        assert!(shared.current().charging);

        shared.update(|c| c.charging = false);
        assert!(!shared.current().charging);

        shared.set(SystemConditions::default());
        assert!(shared.current().charging);
    }

    #[test]
    fn clones_share_the_snapshot() {
        let a = SharedConditions::default();
        let b = a.clone();
        a.update(|c| c.network_available = false);
        assert!(!b.current().network_available);
    }
}
