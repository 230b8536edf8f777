//! Local store: the durable working snapshot.
//!
//! A `SQLite` file holding JSON values under logical keys, plus a side table
//! for oversized payloads. Typed views over it live in the submodules.

mod connection;
mod large_object;
mod migrations;
mod notes;
mod settings;
mod sync_state;
mod tombstones;

pub use connection::{LocalStore, StoreLimits, DEFAULT_MAX_VALUE_BYTES};
pub use large_object::{LargeObject, LargeObjectStore};
pub use notes::{NoteDraft, NoteStore};
pub use settings::{
    PresentSettings, SaveOutcome, SettingsStore, BACKGROUND_OBJECT_ID, MAX_INLINE_IMAGE_CHARS,
};
pub use sync_state::SyncStateStore;
pub use tombstones::TombstoneTracker;

/// Logical keys in the key-value table.
pub mod keys {
    use crate::config::ProviderKind;

    pub const NOTES: &str = "memos";
    pub const PINNED: &str = "pinnedMemos";
    pub const TOMBSTONES: &str = "deletedMemoTombstones";
    pub const ACTIVE_PROVIDER: &str = "sync.activeProvider";
    pub const CLOUD_SYNC_ENABLED: &str = "cloudSyncEnabled";

    /// Checkpoint key for `provider`.
    pub fn checkpoint(provider: ProviderKind) -> String {
        format!("sync.lastSyncAt.{provider}")
    }
}
