//! Persisted sync bookkeeping: checkpoints, active provider, sync switch

use super::{keys, LocalStore};
use crate::config::ProviderKind;
use crate::error::Result;

/// Per-provider checkpoints and the active-provider pointer.
#[derive(Clone)]
pub struct SyncStateStore {
    store: LocalStore,
}

impl SyncStateStore {
    pub const fn new(store: LocalStore) -> Self {
        Self { store }
    }

    /// Unix millis of the last completed reconciliation against `provider`,
    /// or 0 if it never completed.
    pub fn last_sync_at(&self, provider: ProviderKind) -> Result<i64> {
        self.store.read(&keys::checkpoint(provider))
    }

    pub fn set_last_sync_at(&self, provider: ProviderKind, millis: i64) -> Result<()> {
        self.store.write(&keys::checkpoint(provider), &millis)
    }

    /// Provider recorded by the last switch, if any.
    pub fn active_provider(&self) -> Result<Option<ProviderKind>> {
        self.store.read_opt(keys::ACTIVE_PROVIDER)
    }

    /// Flip the active provider and store the given checkpoints in one write.
    pub fn commit_switch(
        &self,
        provider: ProviderKind,
        checkpoints: &[(ProviderKind, i64)],
    ) -> Result<()> {
        let checkpoint_keys: Vec<(String, i64)> = checkpoints
            .iter()
            .map(|(kind, millis)| (keys::checkpoint(*kind), *millis))
            .collect();
        let mut entries = vec![(keys::ACTIVE_PROVIDER, serde_json::to_value(provider)?)];
        for (key, millis) in &checkpoint_keys {
            entries.push((key.as_str(), serde_json::Value::from(*millis)));
        }
        self.store.write_all(&entries)
    }

    /// Stored sync switch, `None` when never set.
    pub fn cloud_sync_enabled(&self) -> Result<Option<bool>> {
        self.store.read_opt(keys::CLOUD_SYNC_ENABLED)
    }

    pub fn set_cloud_sync_enabled(&self, enabled: bool) -> Result<()> {
        self.store.write(keys::CLOUD_SYNC_ENABLED, &enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoints_are_per_provider() {
        let state = SyncStateStore::new(LocalStore::open_in_memory().unwrap());
        assert_eq!(state.last_sync_at(ProviderKind::D1).unwrap(), 0);

        state.set_last_sync_at(ProviderKind::D1, 1_000).unwrap();
        assert_eq!(state.last_sync_at(ProviderKind::D1).unwrap(), 1_000);
        assert_eq!(state.last_sync_at(ProviderKind::Supabase).unwrap(), 0);
    }

    #[test]
    fn commit_switch_writes_pointer_and_checkpoints_together() {
        let state = SyncStateStore::new(LocalStore::open_in_memory().unwrap());
        state.set_last_sync_at(ProviderKind::D1, 5).unwrap();
        state.set_last_sync_at(ProviderKind::Supabase, 7).unwrap();

        state
            .commit_switch(
                ProviderKind::Supabase,
                &[(ProviderKind::D1, 42), (ProviderKind::Supabase, 0)],
            )
            .unwrap();

        assert_eq!(state.active_provider().unwrap(), Some(ProviderKind::Supabase));
        assert_eq!(state.last_sync_at(ProviderKind::D1).unwrap(), 42);
        assert_eq!(state.last_sync_at(ProviderKind::Supabase).unwrap(), 0);
    }

    #[test]
    fn cloud_sync_switch_round_trips() {
        let state = SyncStateStore::new(LocalStore::open_in_memory().unwrap());
        assert_eq!(state.cloud_sync_enabled().unwrap(), None);
        state.set_cloud_sync_enabled(true).unwrap();
        assert_eq!(state.cloud_sync_enabled().unwrap(), Some(true));
    }
}
