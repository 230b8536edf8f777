//! Supabase provider over `PostgREST`

use std::time::Duration;

use serde_json::json;

use super::http::{build_client, send, send_json};
use super::wire::{NoteRow, RemoteSettings, SettingsRow};
use super::{NoteScope, RemoteAdapter};
use crate::config::{ProviderKind, SupabaseConfig};
use crate::error::{Error, Result};
use crate::models::{Note, NoteId};

const MERGE_DUPLICATES: &str = "resolution=merge-duplicates,return=minimal";

/// Client for the Supabase REST endpoints.
#[derive(Clone)]
pub struct SupabaseRemote {
    url: String,
    anon_key: String,
    access_token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for SupabaseRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseRemote")
            .field("url", &self.url)
            .field("anon_key", &"[REDACTED]")
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl SupabaseRemote {
    pub fn new(
        config: &SupabaseConfig,
        access_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let url = config
            .url
            .clone()
            .ok_or_else(|| Error::Config("supabase.url is not configured".to_string()))?;
        let anon_key = config
            .anon_key
            .clone()
            .ok_or_else(|| Error::Config("supabase.anon_key is not configured".to_string()))?;
        Ok(Self {
            url,
            anon_key,
            access_token,
            client: build_client(timeout)?,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn rest(&self, path: &str) -> String {
        format!("{}/rest/v1/{path}", self.url)
    }

    /// Attach the project key and the session (or anon) bearer token.
    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.anon_key);
        request.header("apikey", &self.anon_key).bearer_auth(bearer)
    }

    fn into_notes(rows: Vec<NoteRow>) -> Vec<Note> {
        rows.into_iter().map(NoteRow::into_note).collect()
    }
}

impl RemoteAdapter for SupabaseRemote {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Supabase
    }

    async fn list_notes(&self, scope: NoteScope) -> Result<Vec<Note>> {
        let mut request = self
            .client
            .get(self.rest("memos"))
            .query(&[("select", "*"), ("order", "created_at.desc")]);
        if scope.is_public_only() {
            request = request.query(&[("is_public", "eq.true")]);
        }
        let rows: Vec<NoteRow> = send_json(self.authorized(request), "Supabase memos").await?;
        Ok(Self::into_notes(rows))
    }

    async fn list_notes_secondary(&self, scope: NoteScope) -> Result<Vec<Note>> {
        let request = self
            .client
            .post(self.rest("rpc/list_memos"))
            .json(&json!({ "public_only": scope.is_public_only() }));
        let rows: Vec<NoteRow> = send_json(self.authorized(request), "Supabase list_memos").await?;
        Ok(Self::into_notes(rows))
    }

    async fn upsert_note(&self, note: &Note) -> Result<()> {
        let request = self
            .client
            .post(self.rest("memos"))
            .query(&[("on_conflict", "memo_id")])
            .header("Prefer", MERGE_DUPLICATES)
            .json(&[NoteRow::from(note)]);
        send(self.authorized(request)).await?;
        Ok(())
    }

    async fn delete_note(&self, id: &NoteId) -> Result<()> {
        let filter = format!("eq.{id}");
        let request = self
            .client
            .delete(self.rest("memos"))
            .query(&[("memo_id", filter.as_str())]);
        // PostgREST answers 204 whether or not a row matched.
        send(self.authorized(request)).await?;
        Ok(())
    }

    async fn get_settings(&self) -> Result<Option<RemoteSettings>> {
        let request = self
            .client
            .get(self.rest("user_settings"))
            .query(&[("select", "*"), ("limit", "1")]);
        let rows: Vec<SettingsRow> = send_json(self.authorized(request), "Supabase settings").await?;
        Ok(rows.into_iter().next().map(RemoteSettings::from_row))
    }

    async fn upsert_settings(&self, settings: &RemoteSettings) -> Result<()> {
        let request = self
            .client
            .post(self.rest("user_settings"))
            .header("Prefer", MERGE_DUPLICATES)
            .json(&[settings.to_row()]);
        send(self.authorized(request)).await?;
        Ok(())
    }

    async fn health(&self) -> bool {
        let request = self.client.get(self.rest("")).header("apikey", &self.anon_key);
        match send(request).await {
            Ok(_) => true,
            Err(error) => {
                tracing::debug!("Supabase health probe failed: {}", error);
                false
            }
        }
    }
}
