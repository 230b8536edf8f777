//! Client configuration.
//!
//! `ClientConfig` is read from `client-config.json` under the platform config
//! directory, then overridden by `MEMO_*` environment variables. It names the
//! remote providers, the session token, and the sync schedule.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option};

const CONFIG_DIR_NAME: &str = "memo";
const CONFIG_FILE_NAME: &str = "client-config.json";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Remote backend flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Cloudflare D1 behind the memo HTTP API
    #[default]
    D1,
    /// Supabase `PostgREST`
    Supabase,
}

impl ProviderKind {
    pub const ALL: [Self; 2] = [Self::D1, Self::Supabase];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::D1 => "d1",
            Self::Supabase => "supabase",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "d1" => Ok(Self::D1),
            "supabase" => Ok(Self::Supabase),
            other => Err(Error::Config(format!(
                "unknown provider '{other}' (expected d1 or supabase)"
            ))),
        }
    }
}

/// D1 HTTP API endpoints
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct D1Config {
    /// Base URL serving `/api/notes`, `/api/settings`, `/api/health`
    pub base_url: Option<String>,
    /// Base URL of the legacy `/api/memos` route; defaults to `base_url`
    pub fallback_base_url: Option<String>,
}

/// Supabase project endpoint
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SupabaseConfig {
    pub url: Option<String>,
    pub anon_key: Option<String>,
}

impl fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .field("anon_key", &self.anon_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Timing of scheduled reconciliation runs, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulePolicy {
    /// Delay after a change when the last run finished a while ago
    pub debounce_ms: u64,
    /// Delay after a change when the last run finished within `recent_run_ms`
    pub burst_debounce_ms: u64,
    /// Window that counts a finished run as recent
    pub recent_run_ms: u64,
    /// Minimum spacing between consecutive run starts
    pub min_spacing_ms: u64,
    /// Delay before a coalesced run chained after the current one
    pub chain_delay_ms: u64,
    /// Guest-mode public refresh interval
    pub guest_refresh_ms: u64,
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self {
            debounce_ms: 200,
            burst_debounce_ms: 800,
            recent_run_ms: 1_500,
            min_spacing_ms: 5_000,
            chain_delay_ms: 500,
            guest_refresh_ms: 120_000,
        }
    }
}

impl SchedulePolicy {
    pub const fn min_spacing(&self) -> Duration {
        Duration::from_millis(self.min_spacing_ms)
    }

    pub const fn chain_delay(&self) -> Duration {
        Duration::from_millis(self.chain_delay_ms)
    }

    pub const fn guest_refresh(&self) -> Duration {
        Duration::from_millis(self.guest_refresh_ms)
    }

    /// Debounce delay for a change arriving `since_last_finish` after the
    /// previous run completed (`None` if no run has completed yet).
    pub fn debounce(&self, since_last_finish: Option<Duration>) -> Duration {
        let recent = Duration::from_millis(self.recent_run_ms);
        match since_last_finish {
            Some(elapsed) if elapsed < recent => Duration::from_millis(self.burst_debounce_ms),
            _ => Duration::from_millis(self.debounce_ms),
        }
    }

    /// Delay before starting a run requested now, honoring both the debounce
    /// and the minimum spacing from the previous start.
    pub fn delay_for(
        &self,
        since_last_start: Option<Duration>,
        since_last_finish: Option<Duration>,
    ) -> Duration {
        let debounce = self.debounce(since_last_finish);
        let spacing = since_last_start
            .map_or(Duration::ZERO, |elapsed| self.min_spacing().saturating_sub(elapsed));
        debounce.max(spacing)
    }
}

/// Runtime configuration for a memo client.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Preferred provider when the local store has not recorded one
    pub provider: ProviderKind,
    pub d1: D1Config,
    pub supabase: SupabaseConfig,
    /// Session token; its presence marks the client as authenticated
    pub access_token: Option<String>,
    /// Master switch for authenticated sync
    pub cloud_sync_enabled: bool,
    /// Local store location; defaults to the platform data directory
    pub db_path: Option<PathBuf>,
    /// Per-request HTTP timeout in seconds (0 uses the default)
    pub request_timeout_secs: u64,
    pub schedule: SchedulePolicy,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("provider", &self.provider)
            .field("d1", &self.d1)
            .field("supabase", &self.supabase)
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("cloud_sync_enabled", &self.cloud_sync_enabled)
            .field("db_path", &self.db_path)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("schedule", &self.schedule)
            .finish()
    }
}

impl ClientConfig {
    /// Default config file path (`<config dir>/memo/client-config.json`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Default local store path (`<data dir>/memo/memo.db`).
    pub fn default_db_path() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join("memo.db"))
    }

    /// Read a config file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(error) => return Err(error.into()),
        };
        Self::parse(&raw)
    }

    /// Parse and validate config JSON.
    pub fn parse(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|error| Error::Config(format!("invalid client config: {error}")))?;
        config.normalized()
    }

    /// Write the config as pretty JSON, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Apply `MEMO_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply `MEMO_*` overrides from `lookup`.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| normalize_text_option(lookup(name));

        if let Some(url) = var("MEMO_D1_URL") {
            self.d1.base_url = Some(url);
        }
        if let Some(url) = var("MEMO_D1_FALLBACK_URL") {
            self.d1.fallback_base_url = Some(url);
        }
        if let Some(url) = var("MEMO_SUPABASE_URL") {
            self.supabase.url = Some(url);
        }
        if let Some(key) = var("MEMO_SUPABASE_ANON_KEY") {
            self.supabase.anon_key = Some(key);
        }
        if let Some(token) = var("MEMO_ACCESS_TOKEN") {
            self.access_token = Some(token);
        }
        if let Some(provider) = var("MEMO_PROVIDER") {
            self.provider = provider.parse()?;
        }
        if let Some(path) = var("MEMO_DB_PATH") {
            self.db_path = Some(PathBuf::from(path));
        }
        self.normalized()
    }

    /// Trim values, drop empties, and check URL schemes.
    pub fn normalized(mut self) -> Result<Self> {
        self.d1.base_url = normalize_url(self.d1.base_url.take(), "d1.base_url")?;
        self.d1.fallback_base_url =
            normalize_url(self.d1.fallback_base_url.take(), "d1.fallback_base_url")?;
        self.supabase.url = normalize_url(self.supabase.url.take(), "supabase.url")?;
        self.supabase.anon_key = normalize_text_option(self.supabase.anon_key.take());
        self.access_token = normalize_text_option(self.access_token.take());
        Ok(self)
    }

    /// Whether a session token is present.
    pub const fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }

    /// Whether `kind` has enough configuration to build a client.
    pub const fn is_provider_configured(&self, kind: ProviderKind) -> bool {
        match kind {
            ProviderKind::D1 => self.d1.base_url.is_some(),
            ProviderKind::Supabase => self.supabase.url.is_some() && self.supabase.anon_key.is_some(),
        }
    }

    pub const fn request_timeout(&self) -> Duration {
        if self.request_timeout_secs == 0 {
            Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)
        } else {
            Duration::from_secs(self.request_timeout_secs)
        }
    }

    /// Local store path, falling back to the platform data directory.
    pub fn resolved_db_path(&self) -> Result<PathBuf> {
        self.db_path
            .clone()
            .or_else(Self::default_db_path)
            .ok_or_else(|| Error::Config("could not determine a data directory".to_string()))
    }
}

fn normalize_url(value: Option<String>, field: &str) -> Result<Option<String>> {
    let Some(value) = normalize_text_option(value) else {
        return Ok(None);
    };
    if !is_http_url(&value) {
        return Err(Error::Config(format!(
            "'{field}' must include http:// or https://"
        )));
    }
    Ok(Some(value.trim_end_matches('/').to_string()))
}
