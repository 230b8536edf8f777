//! In-process remote used for offline runs and tests

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::wire::RemoteSettings;
use super::{NoteScope, RemoteAdapter};
use crate::config::ProviderKind;
use crate::error::{Error, Result};
use crate::models::{Note, NoteId};

#[derive(Default)]
struct MemoryState {
    notes: BTreeMap<NoteId, Note>,
    settings: Option<RemoteSettings>,
    fail_primary_list: bool,
    fail_secondary_list: bool,
    fail_upserts: HashSet<NoteId>,
    fail_deletes: HashSet<NoteId>,
    fail_settings: bool,
    deleted: Vec<NoteId>,
    upserted: Vec<NoteId>,
}

/// A remote that keeps its rows in memory.
///
/// Clones share state, so a test can hand one clone to the reconciler and
/// inspect or sabotage another.
#[derive(Clone)]
pub struct MemoryRemote {
    kind: ProviderKind,
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryRemote {
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            state: Arc::new(Mutex::new(MemoryState::default())),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed rows as if another client had written them.
    pub fn insert(&self, note: Note) {
        self.state().notes.insert(note.id.clone(), note);
    }

    pub fn notes(&self) -> Vec<Note> {
        self.state().notes.values().cloned().collect()
    }

    pub fn get(&self, id: &NoteId) -> Option<Note> {
        self.state().notes.get(id).cloned()
    }

    pub fn settings(&self) -> Option<RemoteSettings> {
        self.state().settings.clone()
    }

    pub fn set_settings(&self, settings: RemoteSettings) {
        self.state().settings = Some(settings);
    }

    /// Ids passed to successful `delete_note` calls, in order.
    pub fn deleted(&self) -> Vec<NoteId> {
        self.state().deleted.clone()
    }

    /// Ids passed to successful `upsert_note` calls, in order.
    pub fn upserted(&self) -> Vec<NoteId> {
        self.state().upserted.clone()
    }

    pub fn fail_primary_list(&self, fail: bool) {
        self.state().fail_primary_list = fail;
    }

    pub fn fail_secondary_list(&self, fail: bool) {
        self.state().fail_secondary_list = fail;
    }

    pub fn fail_upsert(&self, id: &NoteId, fail: bool) {
        let mut state = self.state();
        if fail {
            state.fail_upserts.insert(id.clone());
        } else {
            state.fail_upserts.remove(id);
        }
    }

    pub fn fail_delete(&self, id: &NoteId, fail: bool) {
        let mut state = self.state();
        if fail {
            state.fail_deletes.insert(id.clone());
        } else {
            state.fail_deletes.remove(id);
        }
    }

    pub fn fail_settings(&self, fail: bool) {
        self.state().fail_settings = fail;
    }

    fn list(&self, scope: NoteScope) -> Vec<Note> {
        let mut notes: Vec<Note> = self
            .state()
            .notes
            .values()
            .filter(|note| !scope.is_public_only() || note.is_public)
            .cloned()
            .collect();
        notes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        notes
    }

    fn unavailable(&self, what: &str) -> Error {
        Error::Network(format!("{} {what} unavailable", self.kind))
    }
}

impl RemoteAdapter for MemoryRemote {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn list_notes(&self, scope: NoteScope) -> Result<Vec<Note>> {
        if self.state().fail_primary_list {
            return Err(self.unavailable("primary list"));
        }
        Ok(self.list(scope))
    }

    async fn list_notes_secondary(&self, scope: NoteScope) -> Result<Vec<Note>> {
        if self.state().fail_secondary_list {
            return Err(self.unavailable("secondary list"));
        }
        Ok(self.list(scope))
    }

    async fn upsert_note(&self, note: &Note) -> Result<()> {
        let mut state = self.state();
        if state.fail_upserts.contains(&note.id) {
            return Err(Error::Network(format!("upsert of {} rejected", note.id)));
        }
        let mut row = note.clone();
        row.local.clear();
        if let Some(existing) = state.notes.get(&note.id) {
            row.created_at = existing.created_at;
            row.updated_at = row.updated_at.max(row.created_at);
        }
        state.notes.insert(row.id.clone(), row);
        state.upserted.push(note.id.clone());
        Ok(())
    }

    async fn delete_note(&self, id: &NoteId) -> Result<()> {
        let mut state = self.state();
        if state.fail_deletes.contains(id) {
            return Err(Error::Network(format!("delete of {id} rejected")));
        }
        state.notes.remove(id);
        state.deleted.push(id.clone());
        Ok(())
    }

    async fn get_settings(&self) -> Result<Option<RemoteSettings>> {
        let state = self.state();
        if state.fail_settings {
            return Err(self.unavailable("settings"));
        }
        Ok(state.settings.clone())
    }

    async fn upsert_settings(&self, settings: &RemoteSettings) -> Result<()> {
        let mut state = self.state();
        if state.fail_settings {
            return Err(self.unavailable("settings"));
        }
        state.settings = Some(settings.clone());
        Ok(())
    }

    async fn health(&self) -> bool {
        !self.state().fail_primary_list
    }
}
