//! Deletion tombstones pending remote propagation

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use super::{keys, LocalStore};
use crate::error::Result;
use crate::models::{NoteId, Tombstone};

/// Persistent list of locally deleted note ids.
///
/// A tombstone lives until the remote delete for its id succeeds.
#[derive(Clone)]
pub struct TombstoneTracker {
    store: LocalStore,
}

impl TombstoneTracker {
    pub const fn new(store: LocalStore) -> Self {
        Self { store }
    }

    /// Record a deletion of `id` now.
    pub fn record(&self, id: &NoteId) -> Result<()> {
        self.record_at(id, Utc::now())
    }

    /// Record a deletion of `id` at `deleted_at`. Re-recording an id keeps the
    /// original deletion time.
    pub fn record_at(&self, id: &NoteId, deleted_at: DateTime<Utc>) -> Result<()> {
        let mut tombstones = self.list()?;
        if tombstones.iter().any(|tombstone| &tombstone.id == id) {
            return Ok(());
        }
        tombstones.push(Tombstone::new(id.clone(), deleted_at));
        self.store.write(keys::TOMBSTONES, &tombstones)?;
        tracing::debug!("Recorded tombstone for {}", id);
        Ok(())
    }

    /// All pending tombstones, oldest first.
    pub fn list(&self) -> Result<Vec<Tombstone>> {
        self.store.read(keys::TOMBSTONES)
    }

    /// Ids of all pending tombstones.
    pub fn ids(&self) -> Result<HashSet<NoteId>> {
        Ok(self.list()?.into_iter().map(|tombstone| tombstone.id).collect())
    }

    /// Drop tombstones for `ids` after their remote deletes succeeded.
    pub fn clear(&self, ids: &[NoteId]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut tombstones = self.list()?;
        let before = tombstones.len();
        tombstones.retain(|tombstone| !ids.contains(&tombstone.id));
        if tombstones.len() != before {
            self.store.write(keys::TOMBSTONES, &tombstones)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn record_list_clear() {
        let tracker = TombstoneTracker::new(LocalStore::open_in_memory().unwrap());
        let a = NoteId::from("a");
        let b = NoteId::from("b");
        tracker.record(&a).unwrap();
        tracker.record(&b).unwrap();

        let ids: Vec<_> = tracker.list().unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![a.clone(), b.clone()]);

        tracker.clear(&[a]).unwrap();
        assert_eq!(tracker.ids().unwrap(), HashSet::from([b]));
    }

    #[test]
    fn rerecording_keeps_first_deletion_time() {
        let tracker = TombstoneTracker::new(LocalStore::open_in_memory().unwrap());
        let id = NoteId::from("x");
        let first = Utc::now() - Duration::minutes(5);
        tracker.record_at(&id, first).unwrap();
        tracker.record(&id).unwrap();

        let tombstones = tracker.list().unwrap();
        assert_eq!(tombstones.len(), 1);
        assert_eq!(tombstones[0].deleted_at, first);
    }

    #[test]
    fn tombstones_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memo.db");
        TombstoneTracker::new(LocalStore::open(&path).unwrap())
            .record(&NoteId::from("gone"))
            .unwrap();

        let tracker = TombstoneTracker::new(LocalStore::open(&path).unwrap());
        assert!(tracker.ids().unwrap().contains(&NoteId::from("gone")));
    }
}
