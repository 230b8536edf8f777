//! D1 provider over the memo HTTP API

use std::time::Duration;

use serde::de::DeserializeOwned;

use super::http::{build_client, send_json, send_json_routed, Routed};
use super::wire::{Envelope, HealthBody, NoteRow, RemoteSettings, SettingsRow};
use super::{NoteScope, RemoteAdapter};
use crate::config::{D1Config, ProviderKind};
use crate::error::{Error, Result};
use crate::models::{Note, NoteId};

/// Client for the D1-backed HTTP API.
#[derive(Clone)]
pub struct D1Remote {
    base_url: String,
    fallback_base_url: String,
    access_token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for D1Remote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("D1Remote")
            .field("base_url", &self.base_url)
            .field("fallback_base_url", &self.fallback_base_url)
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl D1Remote {
    pub fn new(config: &D1Config, access_token: Option<String>, timeout: Duration) -> Result<Self> {
        let base_url = config
            .base_url
            .clone()
            .ok_or_else(|| Error::Config("d1.base_url is not configured".to_string()))?;
        let fallback_base_url = config
            .fallback_base_url
            .clone()
            .unwrap_or_else(|| base_url.clone());
        Ok(Self {
            base_url,
            fallback_base_url,
            access_token,
            client: build_client(timeout)?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn notes_url(&self) -> String {
        format!("{}/api/notes", self.base_url)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn fetch_envelope<T: DeserializeOwned>(&self, url: &str, context: &str) -> Result<Option<T>> {
        let request = self.authorized(self.client.get(url));
        let envelope: Envelope<T> = send_json(request, context).await?;
        if !envelope.success {
            return Err(Error::Network(
                envelope.message.unwrap_or_else(|| format!("{context} failed")),
            ));
        }
        Ok(envelope.data)
    }

    async fn list_from(&self, url: String, context: &str) -> Result<Vec<Note>> {
        let rows: Vec<NoteRow> = self.fetch_envelope(&url, context).await?.unwrap_or_default();
        Ok(rows.into_iter().map(NoteRow::into_note).collect())
    }

    /// Delete through one route. A `{success: false}` body is a failure; a
    /// 404 means the deployment does not serve this route.
    async fn delete_via(&self, url: String, context: &str) -> Result<Routed<()>> {
        let request = self.authorized(self.client.delete(url));
        match send_json_routed::<Envelope<serde_json::Value>>(request, context).await? {
            Routed::Found(envelope) if envelope.success => Ok(Routed::Found(())),
            Routed::Found(envelope) => Err(Error::Network(
                envelope.message.unwrap_or_else(|| format!("{context} failed")),
            )),
            Routed::MissingRoute => Ok(Routed::MissingRoute),
        }
    }

    async fn post_checked(&self, url: &str, body: &serde_json::Value, context: &str) -> Result<()> {
        let request = self.authorized(self.client.post(url).json(body));
        let envelope: Envelope<serde_json::Value> = send_json(request, context).await?;
        if envelope.success {
            Ok(())
        } else {
            Err(Error::Network(
                envelope.message.unwrap_or_else(|| format!("{context} failed")),
            ))
        }
    }
}

impl RemoteAdapter for D1Remote {
    fn kind(&self) -> ProviderKind {
        ProviderKind::D1
    }

    async fn list_notes(&self, scope: NoteScope) -> Result<Vec<Note>> {
        let url = format!("{}?public_only={}", self.notes_url(), scope.is_public_only());
        self.list_from(url, "D1 notes").await
    }

    async fn list_notes_secondary(&self, scope: NoteScope) -> Result<Vec<Note>> {
        let url = format!(
            "{}/api/memos?public_only={}",
            self.fallback_base_url,
            scope.is_public_only()
        );
        self.list_from(url, "D1 memos").await
    }

    async fn upsert_note(&self, note: &Note) -> Result<()> {
        let mut body = serde_json::to_value(NoteRow::from(note))?;
        // The D1 column is an INTEGER flag.
        body["is_public"] = serde_json::Value::from(u8::from(note.is_public));
        self.post_checked(&self.notes_url(), &body, "D1 upsert note").await
    }

    async fn delete_note(&self, id: &NoteId) -> Result<()> {
        let encoded = urlencoding::encode(id.as_str());
        let url = format!("{}?memoId={encoded}", self.notes_url());
        if let Routed::Found(()) = self.delete_via(url, "D1 delete note").await? {
            return Ok(());
        }

        tracing::debug!("D1 notes route missing, deleting {} through legacy memos route", id);
        let legacy = format!("{}/api/memos?memoId={encoded}", self.fallback_base_url);
        match self.delete_via(legacy, "D1 delete memo").await? {
            Routed::Found(()) => Ok(()),
            Routed::MissingRoute => Err(Error::Network(format!(
                "no D1 route accepted the delete of {id} (404)"
            ))),
        }
    }

    async fn get_settings(&self) -> Result<Option<RemoteSettings>> {
        let url = format!("{}/api/settings", self.base_url);
        let row: Option<SettingsRow> = self.fetch_envelope(&url, "D1 settings").await?;
        Ok(row.map(RemoteSettings::from_row))
    }

    async fn upsert_settings(&self, settings: &RemoteSettings) -> Result<()> {
        let url = format!("{}/api/settings", self.base_url);
        let body = serde_json::to_value(settings.to_row())?;
        self.post_checked(&url, &body, "D1 upsert settings").await
    }

    async fn health(&self) -> bool {
        let url = format!("{}/api/health", self.base_url);
        match send_json::<HealthBody>(self.client.get(url), "D1 health").await {
            Ok(body) => body.status == "ok",
            Err(error) => {
                tracing::debug!("D1 health probe failed: {}", error);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;

    /// Serve `routes` (path prefix, status line, body) until the test ends,
    /// recording each request line.
    async fn spawn_route_server(
        routes: Vec<(&'static str, &'static str, &'static str)>,
    ) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test server");
        let address = listener.local_addr().expect("local address");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&seen);

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut request_buffer = [0_u8; 2048];
                let read = socket.read(&mut request_buffer).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&request_buffer[..read]).to_string();
                let request_line = request.lines().next().unwrap_or_default().to_string();
                let path = request_line.split_whitespace().nth(1).unwrap_or_default().to_string();
                recorded.lock().unwrap().push(request_line);

                let (status_line, body) = routes
                    .iter()
                    .find(|(prefix, _, _)| path.starts_with(prefix))
                    .map_or(("404 Not Found", r#"{"error":"Not found"}"#), |(_, status, body)| {
                        (*status, *body)
                    });
                let response = format!(
                    "HTTP/1.1 {status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });

        (format!("http://{address}"), seen)
    }

    fn remote_at(base_url: String) -> D1Remote {
        let config = D1Config {
            base_url: Some(base_url),
            fallback_base_url: None,
        };
        D1Remote::new(&config, Some("token".to_string()), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn new_requires_base_url() {
        let error = D1Remote::new(&D1Config::default(), None, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(error, Error::Config(_)));
    }

    #[test]
    fn fallback_defaults_to_base_url() {
        let config = D1Config {
            base_url: Some("https://memo.example.com".to_string()),
            fallback_base_url: None,
        };
        let remote = D1Remote::new(&config, Some("s3cr3t".to_string()), Duration::from_secs(1)).unwrap();
        assert_eq!(remote.fallback_base_url, "https://memo.example.com");
        assert_eq!(remote.notes_url(), "https://memo.example.com/api/notes");
        assert!(!format!("{remote:?}").contains("s3cr3t"));
    }

    #[tokio::test]
    async fn delete_falls_back_to_legacy_route_when_notes_route_is_missing() {
        let (base_url, seen) = spawn_route_server(vec![(
            "/api/memos",
            "200 OK",
            r#"{"success":true,"message":"Memo deleted"}"#,
        )])
        .await;
        let remote = remote_at(base_url);

        remote.delete_note(&NoteId::from("gone")).await.unwrap();

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert!(seen[0].starts_with("DELETE /api/notes?memoId=gone"));
        assert!(seen[1].starts_with("DELETE /api/memos?memoId=gone"));
    }

    #[tokio::test]
    async fn delete_fails_when_no_route_exists() {
        let (base_url, _seen) = spawn_route_server(Vec::new()).await;
        let remote = remote_at(base_url);

        let error = remote.delete_note(&NoteId::from("gone")).await.unwrap_err();
        assert!(matches!(error, Error::Network(_)));
    }

    #[tokio::test]
    async fn delete_requires_success_envelope() {
        let (base_url, _seen) = spawn_route_server(vec![(
            "/api/notes",
            "200 OK",
            r#"{"success":false,"message":"memo is locked"}"#,
        )])
        .await;
        let remote = remote_at(base_url);

        let error = remote.delete_note(&NoteId::from("gone")).await.unwrap_err();
        assert!(matches!(error, Error::Network(message) if message == "memo is locked"));
    }
}
