//! Pure merge rules for notes and settings.
//!
//! Nothing here touches storage or the network; the reconciler feeds in a
//! consistent snapshot and writes back the result.

use std::collections::{HashMap, HashSet};

use crate::models::{Note, NoteId, SettingsBlob, SettingsSnapshot};
use crate::remote::RemoteSettings;
use crate::store::PresentSettings;

/// A local note missing remotely is only treated as remotely deleted when it
/// was last modified more than this long before the checkpoint.
pub const DELETION_SAFETY_WINDOW_MS: i64 = 30_000;

/// One side-by-side view of local and remote state.
#[derive(Debug, Clone, Copy)]
pub struct MergeInput<'a> {
    pub local: &'a [Note],
    pub pinned: &'a [Note],
    pub remote: &'a [Note],
    pub tombstones: &'a HashSet<NoteId>,
    /// Unix millis of the last completed run against this remote, 0 if never
    pub last_sync_at: i64,
}

/// Merged lists plus what changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeOutcome {
    /// Main list, newest `created_at` first
    pub notes: Vec<Note>,
    /// Pinned overlay, original order
    pub pinned: Vec<Note>,
    /// Local ids dropped as remote deletions
    pub dropped: Vec<NoteId>,
    /// Remote notes added locally
    pub added: usize,
    /// Local notes overwritten by newer remote copies
    pub updated: usize,
    /// Pinned entries refreshed from remote
    pub pinned_updated: usize,
}

/// Merge local notes with a remote listing.
pub fn merge_notes(input: MergeInput<'_>) -> MergeOutcome {
    let MergeInput {
        local,
        pinned,
        remote,
        tombstones,
        last_sync_at,
    } = input;

    let remote_ids: HashSet<&NoteId> = remote.iter().map(|note| &note.id).collect();
    let mut outcome = MergeOutcome::default();
    let mut merged: Vec<Note> = Vec::with_capacity(local.len() + remote.len());
    let mut dropped: HashSet<&NoteId> = HashSet::new();

    for note in local {
        if tombstones.contains(&note.id) {
            continue;
        }
        if remote_ids.contains(&note.id) || !is_remote_deletion(note, last_sync_at) {
            merged.push(note.clone());
        } else {
            tracing::debug!("Note {} is gone remotely, dropping local copy", note.id);
            dropped.insert(&note.id);
            outcome.dropped.push(note.id.clone());
        }
    }

    let mut index: HashMap<NoteId, usize> = merged
        .iter()
        .enumerate()
        .map(|(position, note)| (note.id.clone(), position))
        .collect();

    // Safety net: anything local, live and not deliberately dropped stays.
    for note in local {
        if tombstones.contains(&note.id) || dropped.contains(&note.id) || index.contains_key(&note.id) {
            continue;
        }
        tracing::warn!("Keeping local note {} missed by the merge", note.id);
        index.insert(note.id.clone(), merged.len());
        merged.push(note.clone());
    }

    let mut pinned: Vec<Note> = pinned
        .iter()
        .filter(|note| !tombstones.contains(&note.id) && !dropped.contains(&note.id))
        .cloned()
        .collect();
    let pinned_index: HashMap<NoteId, usize> = pinned
        .iter()
        .enumerate()
        .map(|(position, note)| (note.id.clone(), position))
        .collect();

    for remote_note in remote {
        if tombstones.contains(&remote_note.id) {
            continue;
        }
        if let Some(&position) = pinned_index.get(&remote_note.id) {
            let entry = &mut pinned[position];
            if remote_note.updated_at > entry.last_modified() {
                entry.apply_remote(remote_note);
                outcome.pinned_updated += 1;
            }
            continue;
        }
        match index.get(&remote_note.id) {
            None => {
                index.insert(remote_note.id.clone(), merged.len());
                merged.push(remote_note.clone());
                outcome.added += 1;
            }
            Some(&position) => {
                let local_note = &mut merged[position];
                if remote_note.updated_at > local_note.last_modified() {
                    local_note.apply_remote(remote_note);
                    outcome.updated += 1;
                }
            }
        }
    }

    // A note must not live in both lists.
    let pinned_ids: HashSet<NoteId> = pinned.iter().map(|note| note.id.clone()).collect();
    merged.retain(|note| !pinned_ids.contains(&note.id));

    sort_newest_first(&mut merged);
    outcome.notes = merged;
    outcome.pinned = pinned;
    outcome
}

fn is_remote_deletion(note: &Note, last_sync_at: i64) -> bool {
    if last_sync_at <= 0 {
        return false;
    }
    let modified = note.last_modified().timestamp_millis();
    last_sync_at.saturating_sub(modified) > DELETION_SAFETY_WINDOW_MS
}

/// Sort by `created_at`, newest first.
pub fn sort_newest_first(notes: &mut [Note]) {
    notes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

/// Adopt the remote pinned list when the local overlay is empty.
///
/// Adopted entries leave the main list so nothing is listed twice.
pub fn adopt_remote_pinned(
    outcome: &mut MergeOutcome,
    remote_pinned: Option<&[Note]>,
    tombstones: &HashSet<NoteId>,
) {
    if !outcome.pinned.is_empty() {
        return;
    }
    let Some(remote_pinned) = remote_pinned else {
        return;
    };
    let mut seen = HashSet::new();
    outcome.pinned = remote_pinned
        .iter()
        .filter(|note| !tombstones.contains(&note.id) && seen.insert(note.id.clone()))
        .cloned()
        .collect();
    if outcome.pinned.is_empty() {
        return;
    }
    outcome.notes.retain(|note| !seen.contains(&note.id));
}

/// Union several note sources id by id; the latest `updated_at` wins.
///
/// Tombstoned ids are excluded.
pub fn union_latest<'a>(
    sources: impl IntoIterator<Item = &'a [Note]>,
    tombstones: &HashSet<NoteId>,
) -> Vec<Note> {
    let mut by_id: HashMap<NoteId, Note> = HashMap::new();
    for source in sources {
        for note in source {
            if tombstones.contains(&note.id) {
                continue;
            }
            match by_id.get_mut(&note.id) {
                Some(existing) => {
                    if note.last_modified() > existing.last_modified() {
                        existing.apply_remote(note);
                    }
                }
                None => {
                    by_id.insert(note.id.clone(), note.clone());
                }
            }
        }
    }
    let mut notes: Vec<Note> = by_id.into_values().collect();
    sort_newest_first(&mut notes);
    notes
}

/// Pick the local blob when it carries anything, else the remote one.
fn pick<B: SettingsBlob>(local: Option<B>, remote: Option<B>) -> B {
    match local {
        Some(local) if !local.is_default() => local,
        local => remote.or(local).unwrap_or_default(),
    }
}

/// Merge settings blobs. Local wins whenever it is present and non-default.
///
/// Blobs the remote does not sync (AI assistant, shortcuts) stay local.
pub fn merge_settings(local: PresentSettings, remote: Option<RemoteSettings>) -> SettingsSnapshot {
    let remote = remote.unwrap_or_default();
    SettingsSnapshot {
        theme: pick(local.theme, remote.theme),
        font: pick(local.font, remote.font),
        background: pick(local.background, remote.background),
        avatar: pick(local.avatar, remote.avatar),
        hitokoto: pick(local.hitokoto, remote.hitokoto),
        ai: local.ai.unwrap_or_default(),
        shortcuts: local.shortcuts.unwrap_or_default(),
        music: pick(local.music, remote.music),
        object_storage: pick(local.object_storage, remote.object_storage),
        canvas: pick(local.canvas, remote.canvas),
    }
}

/// Build the settings payload to upload.
pub fn remote_settings_from(snapshot: &SettingsSnapshot, pinned: &[Note]) -> RemoteSettings {
    RemoteSettings {
        pinned: Some(pinned.to_vec()),
        theme: Some(snapshot.theme.clone()),
        font: Some(snapshot.font.clone()),
        background: Some(snapshot.background.clone()),
        avatar: Some(snapshot.avatar.clone()),
        hitokoto: Some(snapshot.hitokoto.clone()),
        music: Some(snapshot.music.clone()),
        object_storage: Some(snapshot.object_storage.clone()),
        canvas: (!snapshot.canvas.0.is_null()).then(|| snapshot.canvas.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FontConfig, ThemeConfig};
    use chrono::{DateTime, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + seconds, 0).unwrap()
    }

    fn note(id: &str, content: &str, created: i64, updated: i64) -> Note {
        let mut note = Note::new(content);
        note.id = NoteId::from(id);
        note.created_at = at(created);
        note.updated_at = at(updated);
        note
    }

    fn ids(notes: &[Note]) -> Vec<&str> {
        notes.iter().map(|note| note.id.as_str()).collect()
    }

    fn merge(
        local: &[Note],
        pinned: &[Note],
        remote: &[Note],
        tombstones: &HashSet<NoteId>,
        last_sync_at: i64,
    ) -> MergeOutcome {
        merge_notes(MergeInput {
            local,
            pinned,
            remote,
            tombstones,
            last_sync_at,
        })
    }

    #[test]
    fn tombstoned_remote_note_is_not_resurrected() {
        let local = vec![note("1", "x", 0, 10)];
        let remote = vec![note("2", "stale", 0, 5), note("3", "new", 20, 20)];
        let tombstones = HashSet::from([NoteId::from("2")]);

        let outcome = merge(&local, &[], &remote, &tombstones, 0);

        assert_eq!(ids(&outcome.notes), vec!["3", "1"]);
        assert_eq!(outcome.added, 1);
    }

    #[test]
    fn tombstones_win_over_every_source() {
        let tombstones = HashSet::from([NoteId::from("a")]);
        let local = vec![note("a", "local", 0, 50)];
        let pinned = vec![note("a", "pinned", 0, 50)];
        let remote = vec![note("a", "remote", 0, 100)];

        let outcome = merge(&local, &pinned, &remote, &tombstones, at(1_000).timestamp_millis());

        assert!(outcome.notes.is_empty());
        assert!(outcome.pinned.is_empty());
    }

    #[test]
    fn empty_remote_without_checkpoint_keeps_everything() {
        let local = vec![note("b", "b", 10, 10), note("a", "a", 0, 0)];
        let outcome = merge(&local, &[], &[], &HashSet::new(), 0);
        assert_eq!(outcome.notes, local);
        assert!(outcome.dropped.is_empty());
    }

    #[test]
    fn deletion_window_keeps_recent_and_drops_old() {
        let local = vec![note("n", "n", 0, 0)];
        let recent_checkpoint = at(10).timestamp_millis();
        let old_checkpoint = at(40).timestamp_millis();

        let kept = merge(&local, &[], &[], &HashSet::new(), recent_checkpoint);
        assert_eq!(ids(&kept.notes), vec!["n"]);

        let dropped = merge(&local, &[], &[], &HashSet::new(), old_checkpoint);
        assert!(dropped.notes.is_empty());
        assert_eq!(dropped.dropped, vec![NoteId::from("n")]);
    }

    #[test]
    fn deletion_window_uses_latest_timestamp() {
        // Created long ago but edited right before the checkpoint.
        let local = vec![note("n", "n", 0, 100)];
        let outcome = merge(&local, &[], &[], &HashSet::new(), at(110).timestamp_millis());
        assert_eq!(ids(&outcome.notes), vec!["n"]);
    }

    #[test]
    fn newest_side_wins() {
        let local = vec![note("1", "local", 0, 10), note("2", "local", 0, 30)];
        let mut remote_one = note("1", "remote", 0, 20);
        remote_one.is_public = true;
        let remote = vec![remote_one, note("2", "remote", 0, 20)];

        let outcome = merge(&local, &[], &remote, &HashSet::new(), 0);
        let by_id: HashMap<&str, &Note> =
            outcome.notes.iter().map(|n| (n.id.as_str(), n)).collect();

        assert_eq!(by_id["1"].content, "remote");
        assert!(by_id["1"].is_public);
        assert_eq!(by_id["2"].content, "local");
        assert_eq!(outcome.updated, 1);
    }

    #[test]
    fn equal_timestamps_keep_local() {
        let local = vec![note("1", "local", 0, 10)];
        let remote = vec![note("1", "remote", 0, 10)];
        let outcome = merge(&local, &[], &remote, &HashSet::new(), 0);
        assert_eq!(outcome.notes[0].content, "local");
    }

    #[test]
    fn remote_update_to_pinned_note_stays_in_overlay() {
        let pinned = vec![note("p", "old", 0, 10)];
        let remote = vec![note("p", "fresh", 0, 20)];

        let outcome = merge(&[], &pinned, &remote, &HashSet::new(), 0);

        assert!(outcome.notes.is_empty());
        assert_eq!(outcome.pinned.len(), 1);
        assert_eq!(outcome.pinned[0].content, "fresh");
        assert_eq!(outcome.pinned_updated, 1);
    }

    #[test]
    fn pinned_entry_is_pruned_with_dropped_note() {
        let local = vec![note("x", "x", 0, 0)];
        let pinned = vec![note("x", "x", 0, 0), note("y", "y", 0, 0)];
        let outcome = merge(&local, &pinned, &[], &HashSet::new(), at(100).timestamp_millis());
        assert_eq!(ids(&outcome.pinned), vec!["y"]);
    }

    #[test]
    fn result_is_sorted_newest_first() {
        let local = vec![note("old", "", 0, 0)];
        let remote = vec![note("mid", "", 50, 50), note("new", "", 100, 100)];
        let outcome = merge(&local, &[], &remote, &HashSet::new(), 0);
        assert_eq!(ids(&outcome.notes), vec!["new", "mid", "old"]);
    }

    #[test]
    fn merging_twice_is_stable() {
        let local = vec![note("1", "a", 0, 10), note("2", "b", 5, 5)];
        let remote = vec![note("1", "a2", 0, 20), note("3", "c", 30, 30)];
        let tombstones = HashSet::new();
        let checkpoint = at(31).timestamp_millis();

        let first = merge(&local, &[], &remote, &tombstones, checkpoint);
        let second = merge(&first.notes, &first.pinned, &remote, &tombstones, checkpoint);

        assert_eq!(first.notes, second.notes);
        assert_eq!(first.pinned, second.pinned);
    }

    #[test]
    fn apply_remote_preserves_local_fields() {
        let mut local_note = note("1", "local", 0, 10);
        local_note
            .local
            .insert("draft".to_string(), serde_json::Value::Bool(true));
        let outcome = merge(
            &[local_note],
            &[],
            &[note("1", "remote", 0, 20)],
            &HashSet::new(),
            0,
        );
        assert_eq!(outcome.notes[0].content, "remote");
        assert!(outcome.notes[0].local.contains_key("draft"));
    }

    #[test]
    fn union_of_three_sources() {
        let local = vec![note("A", "a", 0, 1), note("B", "b-local", 0, 2)];
        let old_remote = vec![note("B", "b-old", 0, 3), note("C", "c", 0, 4)];
        let new_remote = vec![note("C", "c-new", 0, 5), note("D", "d", 0, 6)];

        let union = union_latest(
            [local.as_slice(), old_remote.as_slice(), new_remote.as_slice()],
            &HashSet::new(),
        );

        let mut union_ids = ids(&union);
        union_ids.sort_unstable();
        assert_eq!(union_ids, vec!["A", "B", "C", "D"]);
        let by_id: HashMap<&str, &Note> = union.iter().map(|n| (n.id.as_str(), n)).collect();
        assert_eq!(by_id["B"].content, "b-old");
        assert_eq!(by_id["C"].content, "c-new");
    }

    #[test]
    fn union_skips_tombstones() {
        let local = vec![note("A", "a", 0, 1)];
        let remote = vec![note("Z", "z", 0, 1)];
        let union = union_latest(
            [local.as_slice(), remote.as_slice()],
            &HashSet::from([NoteId::from("Z")]),
        );
        assert_eq!(ids(&union), vec!["A"]);
    }

    #[test]
    fn remote_pinned_adopted_only_when_local_empty() {
        let mut outcome = MergeOutcome {
            notes: vec![note("p", "p", 0, 0), note("q", "q", 0, 0)],
            ..MergeOutcome::default()
        };
        let remote_pinned = vec![note("p", "p", 0, 0), note("gone", "g", 0, 0)];
        let tombstones = HashSet::from([NoteId::from("gone")]);

        adopt_remote_pinned(&mut outcome, Some(remote_pinned.as_slice()), &tombstones);

        assert_eq!(ids(&outcome.pinned), vec!["p"]);
        assert_eq!(ids(&outcome.notes), vec!["q"]);

        let before = outcome.clone();
        let other = vec![note("r", "r", 0, 0)];
        adopt_remote_pinned(&mut outcome, Some(other.as_slice()), &HashSet::new());
        assert_eq!(outcome, before);
    }

    #[test]
    fn settings_prefer_non_default_local() {
        let local = PresentSettings {
            font: Some(FontConfig {
                font_size: 20,
                ..FontConfig::default()
            }),
            theme: Some(ThemeConfig::default()),
            ..PresentSettings::default()
        };
        let remote = RemoteSettings {
            font: Some(FontConfig {
                font_size: 12,
                ..FontConfig::default()
            }),
            theme: Some(ThemeConfig {
                dark_mode: true,
                ..ThemeConfig::default()
            }),
            ..RemoteSettings::default()
        };

        let merged = merge_settings(local, Some(remote));

        assert_eq!(merged.font.font_size, 20);
        assert!(merged.theme.dark_mode);
        assert_eq!(merged.music, crate::models::MusicConfig::default());
    }

    #[test]
    fn settings_without_remote_fall_back_to_defaults() {
        let merged = merge_settings(PresentSettings::default(), None);
        assert_eq!(merged, SettingsSnapshot::default());
    }

    #[test]
    fn checkpoint_boundary_is_exclusive() {
        let local = vec![note("n", "n", 0, 0)];
        let exactly_window = at(0).timestamp_millis() + DELETION_SAFETY_WINDOW_MS;
        let outcome = merge(&local, &[], &[], &HashSet::new(), exactly_window);
        assert_eq!(ids(&outcome.notes), vec!["n"]);

        let just_past = exactly_window + 1;
        let outcome = merge(&local, &[], &[], &HashSet::new(), just_past);
        assert!(outcome.notes.is_empty());
    }
}
