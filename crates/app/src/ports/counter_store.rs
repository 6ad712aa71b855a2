//! Counter store port: the few numbers that survive restarts.

use std::future::Future;

use nudge_domain::error::NudgeError;
use nudge_domain::interaction::PersistedCounters;

/// Loads and saves per-pack counters.
pub trait CounterStore {
    /// Load counters for a pack. Missing state yields zeroed counters.
    fn load(&self, pack_id: &str) -> impl Future<Output = Result<PersistedCounters, NudgeError>> + Send;

    fn save(
        &self,
        pack_id: &str,
        counters: PersistedCounters,
    ) -> impl Future<Output = Result<(), NudgeError>> + Send;
}

impl<T: CounterStore + Send + Sync> CounterStore for std::sync::Arc<T> {
    fn load(&self, pack_id: &str) -> impl Future<Output = Result<PersistedCounters, NudgeError>> + Send {
        (**self).load(pack_id)
    }

    fn save(
        &self,
        pack_id: &str,
        counters: PersistedCounters,
    ) -> impl Future<Output = Result<(), NudgeError>> + Send {
        (**self).save(pack_id, counters)
    }
}
