//! Configuration-selected remote backend

use super::{D1Remote, NoteScope, RemoteAdapter, RemoteSettings, SupabaseRemote};
use crate::config::{ClientConfig, ProviderKind};
use crate::error::Result;
use crate::models::{Note, NoteId};

/// One of the supported backends, chosen at runtime.
#[derive(Debug, Clone)]
pub enum RemoteProvider {
    D1(D1Remote),
    Supabase(SupabaseRemote),
}

impl RemoteProvider {
    /// Build the client for `kind` from `config`.
    pub fn from_config(kind: ProviderKind, config: &ClientConfig) -> Result<Self> {
        let timeout = config.request_timeout();
        let token = config.access_token.clone();
        match kind {
            ProviderKind::D1 => Ok(Self::D1(D1Remote::new(&config.d1, token, timeout)?)),
            ProviderKind::Supabase => Ok(Self::Supabase(SupabaseRemote::new(
                &config.supabase,
                token,
                timeout,
            )?)),
        }
    }

    /// Build a client for every configured provider.
    pub fn all_configured(config: &ClientConfig) -> Result<Vec<Self>> {
        ProviderKind::ALL
            .into_iter()
            .filter(|kind| config.is_provider_configured(*kind))
            .map(|kind| Self::from_config(kind, config))
            .collect()
    }

    /// Endpoint shown in status output.
    pub fn endpoint(&self) -> &str {
        match self {
            Self::D1(remote) => remote.base_url(),
            Self::Supabase(remote) => remote.url(),
        }
    }
}

impl RemoteAdapter for RemoteProvider {
    fn kind(&self) -> ProviderKind {
        match self {
            Self::D1(remote) => remote.kind(),
            Self::Supabase(remote) => remote.kind(),
        }
    }

    async fn list_notes(&self, scope: NoteScope) -> Result<Vec<Note>> {
        match self {
            Self::D1(remote) => remote.list_notes(scope).await,
            Self::Supabase(remote) => remote.list_notes(scope).await,
        }
    }

    async fn list_notes_secondary(&self, scope: NoteScope) -> Result<Vec<Note>> {
        match self {
            Self::D1(remote) => remote.list_notes_secondary(scope).await,
            Self::Supabase(remote) => remote.list_notes_secondary(scope).await,
        }
    }

    async fn upsert_note(&self, note: &Note) -> Result<()> {
        match self {
            Self::D1(remote) => remote.upsert_note(note).await,
            Self::Supabase(remote) => remote.upsert_note(note).await,
        }
    }

    async fn delete_note(&self, id: &NoteId) -> Result<()> {
        match self {
            Self::D1(remote) => remote.delete_note(id).await,
            Self::Supabase(remote) => remote.delete_note(id).await,
        }
    }

    async fn get_settings(&self) -> Result<Option<RemoteSettings>> {
        match self {
            Self::D1(remote) => remote.get_settings().await,
            Self::Supabase(remote) => remote.get_settings().await,
        }
    }

    async fn upsert_settings(&self, settings: &RemoteSettings) -> Result<()> {
        match self {
            Self::D1(remote) => remote.upsert_settings(settings).await,
            Self::Supabase(remote) => remote.upsert_settings(settings).await,
        }
    }

    async fn health(&self) -> bool {
        match self {
            Self::D1(remote) => remote.health().await,
            Self::Supabase(remote) => remote.health().await,
        }
    }
}
