//! Settings blobs
//!
//! Each blob is persisted under its own local key and synced as one field of
//! the remote settings row. Missing fields in stored JSON fall back to the
//! blob's defaults, so older snapshots keep loading.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A settings blob that is persisted and synced independently.
pub trait SettingsBlob: Serialize + DeserializeOwned + Default + PartialEq + Clone {
    /// Local store key.
    const STORE_KEY: &'static str;

    /// Whether the value carries nothing beyond the hardcoded defaults.
    fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// Accent color and dark mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ThemeConfig {
    /// Accent color as a CSS hex string
    pub theme_color: String,
    /// Dark mode toggle
    pub dark_mode: bool,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            theme_color: "#818CF8".to_string(),
            dark_mode: false,
        }
    }
}

impl SettingsBlob for ThemeConfig {
    const STORE_KEY: &'static str = "settings.theme";
}

/// Note body font
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FontConfig {
    /// Font family key (`default`, `jinghua`, `lxgw`, `kongshan`)
    pub selected_font: String,
    /// Font size in pixels
    pub font_size: u32,
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            selected_font: "default".to_string(),
            font_size: 16,
        }
    }
}

impl SettingsBlob for FontConfig {
    const STORE_KEY: &'static str = "settings.font";
}

/// Reference to a payload kept in the large-object store instead of inline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LargeObjectRef {
    /// Large-object id
    pub id: String,
    /// MIME type of the stored payload
    #[serde(alias = "type")]
    pub mime_type: String,
    /// When the payload was moved out of line
    pub stored_at: DateTime<Utc>,
}

/// Page background
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BackgroundConfig {
    /// Image URL or `data:` URI
    pub image_url: String,
    /// Brightness 0-100
    pub brightness: u8,
    /// Blur strength 0-50
    pub blur: u8,
    /// Use a random background instead of `image_url`
    pub use_random: bool,
    /// Oversized inline image stored out of line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<LargeObjectRef>,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            image_url: String::new(),
            brightness: 50,
            blur: 10,
            use_random: false,
            image_ref: None,
        }
    }
}

impl SettingsBlob for BackgroundConfig {
    const STORE_KEY: &'static str = "settings.background";
}

/// User avatar
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AvatarConfig {
    /// Custom avatar URL
    pub image_url: String,
}

impl SettingsBlob for AvatarConfig {
    const STORE_KEY: &'static str = "settings.avatar";
}

/// Quote-of-the-day source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HitokotoConfig {
    /// Show quotes
    pub enabled: bool,
    /// Quote categories
    pub types: Vec<String>,
}

impl Default for HitokotoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            types: ["a", "b", "c", "d", "i", "j", "k"]
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

impl SettingsBlob for HitokotoConfig {
    const STORE_KEY: &'static str = "settings.hitokoto";
}

/// AI assistant endpoint
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AiConfig {
    /// OpenAI-compatible base URL
    pub base_url: String,
    /// API key
    pub api_key: String,
    /// Model name
    pub model: String,
    /// Assistant enabled
    pub enabled: bool,
}

impl std::fmt::Debug for AiConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("AiConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            model: "gpt-3.5-turbo".to_string(),
            enabled: false,
        }
    }
}

impl SettingsBlob for AiConfig {
    const STORE_KEY: &'static str = "settings.ai";
}

/// Keyboard shortcut bindings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KeyboardShortcuts {
    pub toggle_sidebar: String,
    #[serde(rename = "openAIDialog")]
    pub open_ai_dialog: String,
    pub open_settings: String,
    pub toggle_canvas_mode: String,
    pub open_daily_review: String,
}

impl Default for KeyboardShortcuts {
    fn default() -> Self {
        Self {
            toggle_sidebar: "Tab".to_string(),
            open_ai_dialog: "Ctrl+Space".to_string(),
            open_settings: "Ctrl+,".to_string(),
            toggle_canvas_mode: "Ctrl+/".to_string(),
            open_daily_review: "Ctrl+\\".to_string(),
        }
    }
}

impl SettingsBlob for KeyboardShortcuts {
    const STORE_KEY: &'static str = "settings.shortcuts";
}

/// A user-added song
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CustomSong {
    pub title: String,
    pub artist: String,
    pub url: String,
}

/// Background music player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MusicConfig {
    pub enabled: bool,
    pub custom_songs: Vec<CustomSong>,
}

impl Default for MusicConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            custom_songs: Vec::new(),
        }
    }
}

impl SettingsBlob for MusicConfig {
    const STORE_KEY: &'static str = "settings.music";
}

/// Object storage flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ObjectStorageProvider {
    /// Cloudflare R2
    #[default]
    R2,
    /// Amazon S3
    S3,
    /// Self-hosted `MinIO`
    Minio,
}

/// Object storage used for audio clips and images
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ObjectStorageConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
    pub region: String,
    pub public_url: String,
    pub provider: ObjectStorageProvider,
}

impl std::fmt::Debug for ObjectStorageConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ObjectStorageConfig")
            .field("enabled", &self.enabled)
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("public_url", &self.public_url)
            .field("provider", &self.provider)
            .finish()
    }
}

impl Default for ObjectStorageConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            bucket: String::new(),
            region: "auto".to_string(),
            public_url: String::new(),
            provider: ObjectStorageProvider::R2,
        }
    }
}

impl SettingsBlob for ObjectStorageConfig {
    const STORE_KEY: &'static str = "settings.s3";
}

/// Opaque canvas-mode state; `null` when the canvas was never used.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanvasState(pub serde_json::Value);

impl SettingsBlob for CanvasState {
    const STORE_KEY: &'static str = "settings.canvas";
}

/// The full settings bundle, one value per blob.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsSnapshot {
    pub theme: ThemeConfig,
    pub font: FontConfig,
    pub background: BackgroundConfig,
    pub avatar: AvatarConfig,
    pub hitokoto: HitokotoConfig,
    pub ai: AiConfig,
    pub shortcuts: KeyboardShortcuts,
    pub music: MusicConfig,
    pub object_storage: ObjectStorageConfig,
    pub canvas: CanvasState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_blob_fills_defaults() {
        let background: BackgroundConfig =
            serde_json::from_str(r#"{"imageUrl":"https://x/y.png"}"#).unwrap();
        assert_eq!(background.image_url, "https://x/y.png");
        assert_eq!(background.brightness, 50);
        assert_eq!(background.blur, 10);
        assert!(!background.use_random);
    }

    #[test]
    fn large_object_ref_accepts_legacy_type_field() {
        let reference: LargeObjectRef = serde_json::from_str(
            r#"{"id":"bg-1","type":"image/png","storedAt":"2024-05-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(reference.mime_type, "image/png");
    }

    #[test]
    fn defaults_report_default() {
        assert!(HitokotoConfig::default().is_default());
        assert!(CanvasState::default().is_default());
        let font = FontConfig {
            font_size: 18,
            ..FontConfig::default()
        };
        assert!(!font.is_default());
    }

    #[test]
    fn shortcut_keys_match_stored_names() {
        let value = serde_json::to_value(KeyboardShortcuts::default()).unwrap();
        assert_eq!(value["openAIDialog"], "Ctrl+Space");
        assert_eq!(value["openDailyReview"], "Ctrl+\\");
    }

    #[test]
    fn secrets_are_redacted_in_debug() {
        let config = ObjectStorageConfig {
            secret_access_key: "top-secret".to_string(),
            ..ObjectStorageConfig::default()
        };
        assert!(!format!("{config:?}").contains("top-secret"));

        let ai = AiConfig {
            api_key: "sk-live".to_string(),
            ..AiConfig::default()
        };
        assert!(!format!("{ai:?}").contains("sk-live"));
    }
}
