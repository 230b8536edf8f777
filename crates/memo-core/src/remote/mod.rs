//! Remote adapters.
//!
//! Both backends expose the same capability set: list, upsert and delete notes,
//! read and write the settings row, and a health probe. The reconciler only
//! sees [`RemoteAdapter`].

mod d1;
mod http;
mod memory;
mod provider;
mod supabase;
mod wire;

pub use d1::D1Remote;
pub use memory::MemoryRemote;
pub use provider::RemoteProvider;
pub use supabase::SupabaseRemote;
pub use wire::{NoteRow, RemoteSettings, SettingsRow};

use crate::config::ProviderKind;
use crate::error::Result;
use crate::models::{Note, NoteId};

/// Which notes a list call returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteScope {
    /// Every note of the authenticated user
    All,
    /// Notes flagged public, readable without a session
    PublicOnly,
}

impl NoteScope {
    pub const fn is_public_only(self) -> bool {
        matches!(self, Self::PublicOnly)
    }
}

/// Capability set every remote backend implements.
#[allow(async_fn_in_trait)]
pub trait RemoteAdapter {
    /// Backend flavor, used to key per-provider checkpoints.
    fn kind(&self) -> ProviderKind;

    /// List notes through the primary access path.
    async fn list_notes(&self, scope: NoteScope) -> Result<Vec<Note>>;

    /// List notes through the provider's secondary access path.
    async fn list_notes_secondary(&self, scope: NoteScope) -> Result<Vec<Note>>;

    /// Insert or update a note. Sets `created_at` on first insert.
    async fn upsert_note(&self, note: &Note) -> Result<()>;

    /// Delete a note. Deleting a missing id succeeds.
    async fn delete_note(&self, id: &NoteId) -> Result<()>;

    /// Read the settings row, `None` if the user has none yet.
    async fn get_settings(&self) -> Result<Option<RemoteSettings>>;

    /// Write the settings row.
    async fn upsert_settings(&self, settings: &RemoteSettings) -> Result<()>;

    /// Whether the backend answers its health probe.
    async fn health(&self) -> bool;
}
