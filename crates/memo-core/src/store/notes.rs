//! Note operations on the local snapshot

use std::sync::Arc;

use chrono::Utc;

use super::{keys, LocalStore, TombstoneTracker};
use crate::error::{Error, Result};
use crate::events::{ChangeFeed, DataPart};
use crate::models::{extract_tags, AudioClip, Note, NoteId};

/// Optional fields for a new note.
#[derive(Debug, Clone, Default)]
pub struct NoteDraft {
    /// Explicit tags, merged with `#tags` found in the content
    pub tags: Vec<String>,
    pub backlinks: Vec<NoteId>,
    pub audio_clips: Vec<AudioClip>,
    pub is_public: bool,
}

/// Which list a note currently lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Main,
    Pinned,
}

impl Placement {
    const fn key(self) -> &'static str {
        match self {
            Self::Main => keys::NOTES,
            Self::Pinned => keys::PINNED,
        }
    }

    const fn part(self) -> DataPart {
        match self {
            Self::Main => DataPart::Notes,
            Self::Pinned => DataPart::Pinned,
        }
    }
}

/// User-facing note mutations.
///
/// The main list and the pinned overlay are stored under separate keys; a note
/// lives in exactly one of them. Every mutation emits a change notification.
#[derive(Clone)]
pub struct NoteStore {
    store: LocalStore,
    tombstones: TombstoneTracker,
    changes: Arc<ChangeFeed>,
}

impl NoteStore {
    pub fn new(store: LocalStore, changes: Arc<ChangeFeed>) -> Self {
        Self {
            tombstones: TombstoneTracker::new(store.clone()),
            store,
            changes,
        }
    }

    /// Main notes list, as stored (newest first after a merge).
    pub fn notes(&self) -> Result<Vec<Note>> {
        self.store.read(keys::NOTES)
    }

    /// Pinned overlay.
    pub fn pinned(&self) -> Result<Vec<Note>> {
        self.store.read(keys::PINNED)
    }

    /// Pinned notes first, then the main list newest first.
    pub fn list(&self) -> Result<Vec<Note>> {
        let mut notes = self.notes()?;
        notes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let mut all = self.pinned()?;
        all.extend(notes);
        Ok(all)
    }

    /// Look up a note in either list.
    pub fn get(&self, id: &NoteId) -> Result<Option<Note>> {
        Ok(self.list()?.into_iter().find(|note| &note.id == id))
    }

    /// Notes whose id starts with `prefix`.
    pub fn find_by_prefix(&self, prefix: &str) -> Result<Vec<Note>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|note| note.id.as_str().starts_with(prefix))
            .collect())
    }

    /// Create a note with a fresh id.
    pub fn create(&self, content: impl Into<String>, draft: NoteDraft) -> Result<Note> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(Error::InvalidInput("note content cannot be empty".to_string()));
        }

        let mut note = Note::new(content);
        note.tags = merge_tags(&note.content, &draft.tags);
        note.backlinks = draft.backlinks;
        note.audio_clips = draft.audio_clips;
        note.is_public = draft.is_public;

        let mut notes = self.notes()?;
        notes.insert(0, note.clone());
        self.store.write(keys::NOTES, &notes)?;
        self.changes.emit(DataPart::Notes);
        tracing::debug!("Created note {}", note.id);
        Ok(note)
    }

    /// Replace a note's content, re-deriving its tags.
    pub fn update(&self, id: &NoteId, content: impl Into<String>) -> Result<Note> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(Error::InvalidInput("note content cannot be empty".to_string()));
        }
        self.modify(id, |note| note.set_content(content, Utc::now()))
    }

    pub fn set_public(&self, id: &NoteId, is_public: bool) -> Result<Note> {
        self.modify(id, |note| {
            note.is_public = is_public;
            note.touch(Utc::now());
        })
    }

    pub fn add_backlink(&self, id: &NoteId, target: &NoteId) -> Result<Note> {
        if id == target {
            return Err(Error::InvalidInput("a note cannot link to itself".to_string()));
        }
        self.modify(id, |note| {
            if !note.backlinks.contains(target) {
                note.backlinks.push(target.clone());
                note.touch(Utc::now());
            }
        })
    }

    pub fn remove_backlink(&self, id: &NoteId, target: &NoteId) -> Result<Note> {
        self.modify(id, |note| {
            let before = note.backlinks.len();
            note.backlinks.retain(|link| link != target);
            if note.backlinks.len() != before {
                note.touch(Utc::now());
            }
        })
    }

    pub fn add_audio_clip(&self, id: &NoteId, clip: AudioClip) -> Result<Note> {
        self.modify(id, |note| {
            note.audio_clips.push(clip);
            note.touch(Utc::now());
        })
    }

    /// Delete a note from whichever list holds it and record a tombstone.
    pub fn delete(&self, id: &NoteId) -> Result<Note> {
        let (placement, mut list, index) = self.locate(id)?;
        let note = list.remove(index);
        self.store.write(placement.key(), &list)?;
        self.tombstones.record(id)?;
        self.changes.emit(placement.part());
        self.changes.emit(DataPart::Deletions);
        tracing::debug!("Deleted note {}", id);
        Ok(note)
    }

    /// Move a note into the pinned overlay.
    pub fn pin(&self, id: &NoteId) -> Result<Note> {
        self.move_between(id, Placement::Main, Placement::Pinned)
    }

    /// Move a pinned note back into the main list.
    pub fn unpin(&self, id: &NoteId) -> Result<Note> {
        self.move_between(id, Placement::Pinned, Placement::Main)
    }

    /// Overwrite both lists without emitting change notifications.
    pub(crate) fn replace_all(&self, notes: &[Note], pinned: &[Note]) -> Result<()> {
        self.store.write_all(&[
            (keys::NOTES, serde_json::to_value(notes)?),
            (keys::PINNED, serde_json::to_value(pinned)?),
        ])
    }

    /// Overwrite the main list without emitting change notifications.
    pub(crate) fn replace_notes(&self, notes: &[Note]) -> Result<()> {
        self.store.write(keys::NOTES, notes)
    }

    fn locate(&self, id: &NoteId) -> Result<(Placement, Vec<Note>, usize)> {
        for placement in [Placement::Main, Placement::Pinned] {
            let list: Vec<Note> = self.store.read(placement.key())?;
            if let Some(index) = list.iter().position(|note| &note.id == id) {
                return Ok((placement, list, index));
            }
        }
        Err(Error::NotFound(id.to_string()))
    }

    fn modify(&self, id: &NoteId, edit: impl FnOnce(&mut Note)) -> Result<Note> {
        let (placement, mut list, index) = self.locate(id)?;
        edit(&mut list[index]);
        let note = list[index].clone();
        self.store.write(placement.key(), &list)?;
        self.changes.emit(placement.part());
        Ok(note)
    }

    fn move_between(&self, id: &NoteId, from: Placement, to: Placement) -> Result<Note> {
        let (placement, mut source, index) = self.locate(id)?;
        if placement != from {
            return Ok(source.remove(index));
        }
        let note = source.remove(index);
        let mut target: Vec<Note> = self.store.read(to.key())?;
        target.insert(0, note.clone());
        self.store.write_all(&[
            (from.key(), serde_json::to_value(&source)?),
            (to.key(), serde_json::to_value(&target)?),
        ])?;
        self.changes.emit(DataPart::Pinned);
        self.changes.emit(DataPart::Notes);
        Ok(note)
    }
}

fn merge_tags(content: &str, explicit: &[String]) -> Vec<String> {
    let mut tags = extract_tags(content);
    for tag in explicit {
        let tag = tag.trim().trim_start_matches('#').to_lowercase();
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags.sort();
    tags
}
