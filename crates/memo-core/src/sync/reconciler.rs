//! Reconciliation runs against the active remote.
//!
//! A run pulls the remote listing, merges it with the latest local snapshot,
//! writes the merge back, then pushes deletes, notes and settings. At most one
//! run is in flight; requests arriving meanwhile collapse into one chained run.
//! Provider switches hold the same run lock.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Mutex as AsyncMutex;

use super::merge::{
    adopt_remote_pinned, merge_notes, merge_settings, remote_settings_from, sort_newest_first,
    union_latest, MergeInput,
};
use super::report::{PullSource, RestoreOutcome, SwitchReport, SyncReport};
use crate::config::ProviderKind;
use crate::error::{Error, Result};
use crate::events::ChangeFeed;
use crate::models::{Note, NoteId, Tombstone};
use crate::remote::{NoteScope, RemoteAdapter, RemoteSettings};
use crate::store::{LocalStore, NoteStore, SettingsStore, SyncStateStore, TombstoneTracker};
use crate::util::unix_millis_now;

/// Where a reconciliation run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunPhase {
    #[default]
    Idle,
    Pulling,
    Merging,
    Pushing,
    Switching,
}

#[derive(Debug, Default)]
struct RunState {
    phase: RunPhase,
    in_flight: bool,
    pending: bool,
}

/// Clears the in-flight flag when a run ends, however it ends.
struct InFlight<'a> {
    state: &'a Mutex<RunState>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.in_flight = false;
        state.phase = RunPhase::Idle;
    }
}

/// Notes fetched from a remote and how they were obtained.
#[derive(Debug, Clone)]
pub struct Pulled {
    pub notes: Vec<Note>,
    pub source: PullSource,
}

/// Fetch notes through the primary path, then the secondary path.
///
/// When both fail the result is empty and marked unavailable, except that an
/// authentication failure is returned as an error.
pub async fn pull_notes<R: RemoteAdapter>(remote: &R, scope: NoteScope) -> Result<Pulled> {
    match remote.list_notes(scope).await {
        Ok(notes) => {
            return Ok(Pulled {
                notes,
                source: PullSource::Primary,
            });
        }
        Err(Error::AuthRequired) => return Err(Error::AuthRequired),
        Err(error) => {
            tracing::warn!("{} primary list failed, trying secondary: {}", remote.kind(), error);
        }
    }

    match remote.list_notes_secondary(scope).await {
        Ok(notes) => Ok(Pulled {
            notes,
            source: PullSource::Secondary,
        }),
        Err(Error::AuthRequired) => Err(Error::AuthRequired),
        Err(error) => {
            tracing::warn!("{} secondary list failed, merging against empty remote: {}", remote.kind(), error);
            Ok(Pulled {
                notes: Vec::new(),
                source: PullSource::Unavailable,
            })
        }
    }
}

/// The sync engine.
///
/// Generic over the remote so tests can run it against [`crate::remote::MemoryRemote`].
pub struct Reconciler<R> {
    notes: NoteStore,
    settings: SettingsStore,
    tombstones: TombstoneTracker,
    sync_state: SyncStateStore,
    remotes: Vec<R>,
    active: Mutex<ProviderKind>,
    authenticated: AtomicBool,
    sync_enabled: AtomicBool,
    run_state: Mutex<RunState>,
    run_lock: AsyncMutex<()>,
}

impl<R: RemoteAdapter> Reconciler<R> {
    /// Create a reconciler over `remotes`.
    ///
    /// The active provider is the one recorded by the last switch, else
    /// `preferred`, else the first remote given.
    pub fn new(
        store: LocalStore,
        changes: Arc<ChangeFeed>,
        remotes: Vec<R>,
        preferred: ProviderKind,
    ) -> Result<Self> {
        let sync_state = SyncStateStore::new(store.clone());
        let recorded = sync_state.active_provider()?;
        let available = |kind: ProviderKind| remotes.iter().any(|remote| remote.kind() == kind);
        let active = recorded
            .filter(|kind| available(*kind))
            .or_else(|| available(preferred).then_some(preferred))
            .or_else(|| remotes.first().map(|remote| remote.kind()))
            .unwrap_or(preferred);
        let sync_enabled = sync_state.cloud_sync_enabled()?.unwrap_or(false);

        Ok(Self {
            notes: NoteStore::new(store.clone(), Arc::clone(&changes)),
            settings: SettingsStore::new(store.clone(), changes),
            tombstones: TombstoneTracker::new(store),
            sync_state,
            remotes,
            active: Mutex::new(active),
            authenticated: AtomicBool::new(false),
            sync_enabled: AtomicBool::new(sync_enabled),
            run_state: Mutex::new(RunState::default()),
            run_lock: AsyncMutex::new(()),
        })
    }

    /// Set whether a user session is present.
    pub fn set_authenticated(&self, authenticated: bool) {
        self.authenticated.store(authenticated, Ordering::SeqCst);
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    /// Turn authenticated sync on or off, persisting the choice.
    pub fn set_sync_enabled(&self, enabled: bool) -> Result<()> {
        self.sync_state.set_cloud_sync_enabled(enabled)?;
        self.sync_enabled.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_sync_enabled(&self) -> bool {
        self.sync_enabled.load(Ordering::SeqCst)
    }

    /// Whether scheduled syncs should run.
    pub fn can_sync(&self) -> bool {
        self.is_authenticated() && self.is_sync_enabled() && self.active_remote().is_ok()
    }

    pub fn active_provider(&self) -> ProviderKind {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self) -> RunPhase {
        self.state().phase
    }

    pub fn notes(&self) -> &NoteStore {
        &self.notes
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn remotes(&self) -> &[R] {
        &self.remotes
    }

    fn state(&self) -> MutexGuard<'_, RunState> {
        self.run_state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: RunPhase) {
        self.state().phase = phase;
    }

    fn remote(&self, kind: ProviderKind) -> Result<&R> {
        self.remotes
            .iter()
            .find(|remote| remote.kind() == kind)
            .ok_or_else(|| Error::SyncUnavailable(format!("provider {kind} is not configured")))
    }

    fn active_remote(&self) -> Result<&R> {
        self.remote(self.active_provider())
    }

    /// Run a full reconciliation against the active provider.
    ///
    /// If a run is already in flight the request is recorded and the returned
    /// report is marked coalesced; the in-flight run chains one more pass.
    pub async fn sync(&self) -> Result<SyncReport> {
        if !self.is_authenticated() {
            return Err(Error::AuthRequired);
        }
        if !self.is_sync_enabled() {
            return Err(Error::SyncUnavailable("cloud sync is turned off".to_string()));
        }
        let remote = self.active_remote()?;

        {
            let mut state = self.state();
            if state.in_flight {
                state.pending = true;
                tracing::debug!("Sync already running, coalescing request");
                return Ok(SyncReport::coalesced(remote.kind()));
            }
            state.in_flight = true;
        }
        let _in_flight = InFlight {
            state: &self.run_state,
        };
        let _run = self.run_lock.lock().await;

        let remote = self.active_remote()?;
        let mut report = self.run_once(remote).await?;
        loop {
            let chained = std::mem::take(&mut self.state().pending);
            if !chained {
                break;
            }
            tracing::debug!("Running chained sync");
            let next = self.run_once(remote).await?;
            report = next.chained_after(report);
        }
        Ok(report)
    }

    /// Record a sync request without running it; used while a switch holds the lock.
    pub fn request_pending(&self) {
        self.state().pending = true;
    }

    /// Whether a coalesced request is waiting.
    pub fn has_pending(&self) -> bool {
        self.state().pending
    }

    async fn run_once(&self, remote: &R) -> Result<SyncReport> {
        let kind = remote.kind();
        let mut report = SyncReport::new(kind);

        self.set_phase(RunPhase::Pulling);
        // Notes written after this instant are not covered by the run.
        report.started_at = unix_millis_now();
        let last_sync_at = self.sync_state.last_sync_at(kind)?;
        let pulled = pull_notes(remote, NoteScope::All).await?;
        report.pulled = pulled.notes.len();
        report.pull_source = pulled.source;
        let remote_settings = match remote.get_settings().await {
            Ok(settings) => settings,
            Err(Error::AuthRequired) => return Err(Error::AuthRequired),
            Err(error) => {
                tracing::warn!("Failed to fetch {} settings: {}", kind, error);
                None
            }
        };

        self.set_phase(RunPhase::Merging);
        // Re-read so edits made during a slow pull are not lost.
        let local = self.notes.notes()?;
        let pinned = self.notes.pinned()?;
        let tombstone_ids = self.tombstones.ids()?;
        let mut outcome = merge_notes(MergeInput {
            local: &local,
            pinned: &pinned,
            remote: &pulled.notes,
            tombstones: &tombstone_ids,
            last_sync_at,
        });
        adopt_remote_pinned(
            &mut outcome,
            remote_settings.as_ref().and_then(|settings| settings.pinned.as_deref()),
            &tombstone_ids,
        );
        self.notes.replace_all(&outcome.notes, &outcome.pinned)?;

        let snapshot = merge_settings(self.settings.present()?, remote_settings);
        report.warning = self.settings.write_merged(&snapshot)?;
        report.added = outcome.added;
        report.updated = outcome.updated + outcome.pinned_updated;
        report.dropped = outcome.dropped.len();
        report.merged = outcome.notes.len() + outcome.pinned.len();

        self.set_phase(RunPhase::Pushing);
        let tombstones = self.tombstones.list()?;
        let accepted = self.push_deletes(remote, &tombstones, &mut report).await?;
        self.tombstones.clear(&accepted)?;
        let all_notes: Vec<Note> = outcome.pinned.iter().chain(&outcome.notes).cloned().collect();
        self.push_notes(remote, &all_notes, &mut report).await?;
        let payload = remote_settings_from(&snapshot, &outcome.pinned);
        report.settings_pushed = push_settings(remote, &payload).await?;

        if report.pull_source != PullSource::Unavailable && report.push_failures == 0 {
            self.sync_state.set_last_sync_at(kind, report.started_at)?;
        } else {
            tracing::info!("Keeping {} checkpoint until a clean run", kind);
        }

        tracing::info!(
            "Synced with {}: pulled {}, added {}, updated {}, dropped {}, pushed {} ({} failed), deleted {} ({} failed)",
            kind,
            report.pulled,
            report.added,
            report.updated,
            report.dropped,
            report.pushed,
            report.push_failures,
            report.deletes_propagated,
            report.deletes_failed
        );
        Ok(report)
    }

    /// Send each tombstoned delete to `remote` and return the ids it accepted.
    /// Tombstones are left for the caller to clear.
    async fn push_deletes(
        &self,
        remote: &R,
        tombstones: &[Tombstone],
        report: &mut SyncReport,
    ) -> Result<Vec<NoteId>> {
        let mut accepted: Vec<NoteId> = Vec::new();
        for tombstone in tombstones {
            match remote.delete_note(&tombstone.id).await {
                Ok(()) => accepted.push(tombstone.id.clone()),
                Err(Error::AuthRequired) => return Err(Error::AuthRequired),
                Err(error) => {
                    tracing::warn!(
                        "Failed to delete {} on {}: {}",
                        tombstone.id,
                        remote.kind(),
                        error
                    );
                    report.deletes_failed += 1;
                }
            }
        }
        report.deletes_propagated = accepted.len();
        Ok(accepted)
    }

    async fn push_notes(&self, remote: &R, notes: &[Note], report: &mut SyncReport) -> Result<()> {
        for note in notes {
            match remote.upsert_note(note).await {
                Ok(()) => report.pushed += 1,
                Err(Error::AuthRequired) => return Err(Error::AuthRequired),
                Err(error) => {
                    tracing::warn!("Failed to push note {}: {}", note.id, error);
                    report.push_failures += 1;
                }
            }
        }
        Ok(())
    }

    /// Guest read path: refresh the main list from public notes.
    ///
    /// Replaces the local list only when the id set or count changed. Never
    /// pushes and never deletes remotely.
    pub async fn refresh_public(&self) -> Result<bool> {
        if self.is_authenticated() {
            return Ok(false);
        }
        let remote = self.active_remote()?;
        let pulled = pull_notes(remote, NoteScope::PublicOnly).await?;
        if pulled.source == PullSource::Unavailable {
            return Ok(false);
        }

        let current = self.notes.notes()?;
        let known: HashSet<&NoteId> = current.iter().map(|note| &note.id).collect();
        let changed = pulled.notes.len() != current.len()
            || pulled.notes.iter().any(|note| !known.contains(&note.id));
        if changed {
            tracing::info!("Public notes changed ({} -> {})", current.len(), pulled.notes.len());
            self.notes.replace_notes(&pulled.notes)?;
        }
        Ok(changed)
    }

    /// Seed an empty local store from the remote.
    ///
    /// Pulls every note when authenticated, public notes otherwise. When local
    /// data exists nothing is overwritten; the caller should request a sync.
    pub async fn restore_if_empty(&self) -> Result<RestoreOutcome> {
        let has_local = !self.notes.notes()?.is_empty() || !self.notes.pinned()?.is_empty();
        if has_local {
            return Ok(if self.can_sync() {
                RestoreOutcome::NeedsMerge
            } else {
                RestoreOutcome::KeptLocal
            });
        }

        let remote = self.active_remote()?;
        let scope = if self.is_authenticated() {
            NoteScope::All
        } else {
            NoteScope::PublicOnly
        };
        let pulled = pull_notes(remote, scope).await?;
        if pulled.source == PullSource::Unavailable {
            return Ok(RestoreOutcome::Unavailable);
        }

        let tombstone_ids = self.tombstones.ids()?;
        let mut notes: Vec<Note> = pulled
            .notes
            .into_iter()
            .filter(|note| !tombstone_ids.contains(&note.id))
            .collect();
        sort_newest_first(&mut notes);
        self.notes.replace_notes(&notes)?;
        tracing::info!("Restored {} notes from {}", notes.len(), remote.kind());

        Ok(RestoreOutcome::Restored {
            count: notes.len(),
            needs_sync: self.can_sync(),
        })
    }

    /// Move the active provider to `target` without losing data on either side.
    ///
    /// Both providers are pulled concurrently and unioned with the local
    /// snapshot (latest `updated_at` wins), the union is written locally and
    /// pushed to both, then the pointer flips. A provider's checkpoint moves
    /// to the switch time only if it was read and took every upsert; otherwise
    /// it drops to 0 so the next run cannot mistake missing rows for deletes.
    /// Tombstones are cleared only once both providers accepted the delete.
    pub async fn switch_provider(&self, target: ProviderKind) -> Result<SwitchReport> {
        if !self.is_authenticated() {
            return Err(Error::AuthRequired);
        }
        let from = self.active_provider();
        let old_remote = self.remote(from)?;
        let new_remote = self.remote(target)?;
        if from == target {
            return Ok(SwitchReport::unchanged(target));
        }

        let _run = self.run_lock.lock().await;
        self.set_phase(RunPhase::Switching);
        let result = self.switch_locked(old_remote, new_remote).await;
        self.set_phase(RunPhase::Idle);
        result
    }

    async fn switch_locked(&self, old_remote: &R, new_remote: &R) -> Result<SwitchReport> {
        let from = old_remote.kind();
        let target = new_remote.kind();
        tracing::info!("Switching provider {} -> {}", from, target);
        let started_at = unix_millis_now();

        let (old_pull, new_pull) = tokio::join!(
            pull_notes(old_remote, NoteScope::All),
            pull_notes(new_remote, NoteScope::All)
        );
        let (old_pull, new_pull) = (old_pull?, new_pull?);
        let (old_settings, new_settings) =
            tokio::join!(old_remote.get_settings(), new_remote.get_settings());
        let remote_settings = pick_settings(new_settings, old_settings);

        let local = self.notes.notes()?;
        let pinned = self.notes.pinned()?;
        let tombstones = self.tombstones.list()?;
        let tombstone_ids: HashSet<NoteId> =
            tombstones.iter().map(|tombstone| tombstone.id.clone()).collect();

        let pinned_ids: HashSet<NoteId> = pinned.iter().map(|note| note.id.clone()).collect();
        let mut notes = union_latest(
            [local.as_slice(), old_pull.notes.as_slice(), new_pull.notes.as_slice()],
            &tombstone_ids,
        );
        // Pinned entries take the newest remote content but stay in the overlay.
        let mut pinned_out = pinned.clone();
        for entry in &mut pinned_out {
            if let Some(newer) = notes
                .iter()
                .find(|note| note.id == entry.id && note.last_modified() > entry.last_modified())
            {
                entry.apply_remote(newer);
            }
        }
        pinned_out.retain(|note| !tombstone_ids.contains(&note.id));
        notes.retain(|note| !pinned_ids.contains(&note.id));
        self.notes.replace_all(&notes, &pinned_out)?;

        let snapshot = merge_settings(self.settings.present()?, remote_settings);
        let warning = self.settings.write_merged(&snapshot)?;
        let payload = remote_settings_from(&snapshot, &pinned_out);
        let all_notes: Vec<Note> = pinned_out.iter().chain(&notes).cloned().collect();

        let mut report = SwitchReport::new(from, target);
        report.merged = all_notes.len();
        report.warning = warning;
        let mut checkpoints = Vec::with_capacity(2);
        let mut accepted_by: Vec<HashSet<NoteId>> = Vec::with_capacity(2);
        for (remote, pulled) in [(old_remote, &old_pull), (new_remote, &new_pull)] {
            let mut push = SyncReport::new(remote.kind());
            let accepted = self.push_deletes(remote, &tombstones, &mut push).await?;
            accepted_by.push(accepted.into_iter().collect());
            self.push_notes(remote, &all_notes, &mut push).await?;
            push.settings_pushed = push_settings(remote, &payload).await?;
            report.push_failures += push.push_failures + push.deletes_failed;

            let took_union = pulled.source != PullSource::Unavailable && push.push_failures == 0;
            let checkpoint = if took_union {
                started_at
            } else {
                tracing::warn!(
                    "{} did not take the full union, clearing its checkpoint",
                    remote.kind()
                );
                0
            };
            checkpoints.push((remote.kind(), checkpoint));
        }

        let cleared: Vec<NoteId> = tombstone_ids
            .iter()
            .filter(|id| accepted_by.iter().all(|accepted| accepted.contains(*id)))
            .cloned()
            .collect();
        self.tombstones.clear(&cleared)?;

        {
            let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
            self.sync_state.commit_switch(target, &checkpoints)?;
            *active = target;
        }
        tracing::info!(
            "Switched to {} with {} notes ({} push failures)",
            target,
            report.merged,
            report.push_failures
        );
        Ok(report)
    }
}

async fn push_settings<R: RemoteAdapter>(remote: &R, payload: &RemoteSettings) -> Result<bool> {
    match remote.upsert_settings(payload).await {
        Ok(()) => Ok(true),
        Err(Error::AuthRequired) => Err(Error::AuthRequired),
        Err(error) => {
            tracing::warn!("Failed to push settings to {}: {}", remote.kind(), error);
            Ok(false)
        }
    }
}

/// Prefer the new provider's settings row, falling back to the old one.
fn pick_settings(
    preferred: Result<Option<RemoteSettings>>,
    fallback: Result<Option<RemoteSettings>>,
) -> Option<RemoteSettings> {
    let ok = |result: Result<Option<RemoteSettings>>| match result {
        Ok(settings) => settings,
        Err(error) => {
            tracing::warn!("Ignoring unreadable settings during switch: {}", error);
            None
        }
    };
    ok(preferred).or_else(|| ok(fallback))
}
