//! Row shapes exchanged with remote providers.
//!
//! Providers disagree on encodings: list columns may arrive as JSON arrays or
//! as JSON text, and booleans as `true`/`false` or `1`/`0`. Decoding accepts
//! both and degrades to defaults rather than failing the whole row.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::models::{
    AudioClip, AvatarConfig, BackgroundConfig, CanvasState, FontConfig, HitokotoConfig,
    MusicConfig, Note, NoteId, ObjectStorageConfig, ThemeConfig,
};

/// Note row as stored remotely
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteRow {
    pub memo_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, deserialize_with = "lenient_list")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub backlinks: Vec<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub audio_clips: Vec<AudioClip>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_public: bool,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl From<&Note> for NoteRow {
    fn from(note: &Note) -> Self {
        Self {
            memo_id: note.id.to_string(),
            content: note.content.clone(),
            tags: note.tags.clone(),
            backlinks: note.backlinks.iter().map(ToString::to_string).collect(),
            audio_clips: note.audio_clips.clone(),
            is_public: note.is_public,
            created_at: Some(note.created_at.to_rfc3339()),
            updated_at: Some(note.last_modified().to_rfc3339()),
        }
    }
}

impl NoteRow {
    /// Convert to a local note.
    ///
    /// Missing timestamps fall back to each other, then to the epoch so an
    /// undated row never outranks a dated local copy. `updated_at` is clamped
    /// to never precede `created_at`.
    pub fn into_note(self) -> Note {
        let created = parse_timestamp(self.created_at.as_deref());
        let updated = parse_timestamp(self.updated_at.as_deref());
        let created_at = created.or(updated).unwrap_or(DateTime::UNIX_EPOCH);
        let updated_at = updated.unwrap_or(created_at).max(created_at);

        Note {
            id: NoteId::from(self.memo_id),
            content: self.content,
            tags: self.tags,
            backlinks: self.backlinks.into_iter().map(NoteId::from).collect(),
            audio_clips: self.audio_clips,
            is_public: self.is_public,
            created_at,
            updated_at,
            local: serde_json::Map::new(),
        }
    }
}

fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    let value = value?.trim();
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .or_else(|_| {
            // SQLite CURRENT_TIMESTAMP format
            chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .map(|at| at.and_utc())
        })
        .ok()
}

/// Flattened settings row as stored remotely.
///
/// Blob columns are JSON values or JSON text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsRow {
    #[serde(default)]
    pub pinned_memos: Option<Value>,
    #[serde(default)]
    pub theme_color: Option<String>,
    #[serde(default)]
    pub dark_mode: Option<Value>,
    #[serde(default)]
    pub hitokoto_config: Option<Value>,
    #[serde(default)]
    pub font_config: Option<Value>,
    #[serde(default)]
    pub background_config: Option<Value>,
    #[serde(default)]
    pub avatar_config: Option<Value>,
    #[serde(default)]
    pub canvas_config: Option<Value>,
    #[serde(default)]
    pub music_config: Option<Value>,
    #[serde(default)]
    pub s3_config: Option<Value>,
}

/// The synced subset of settings, decoded.
///
/// `None` means the remote did not carry a usable value for that blob.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteSettings {
    pub pinned: Option<Vec<Note>>,
    pub theme: Option<ThemeConfig>,
    pub font: Option<FontConfig>,
    pub background: Option<BackgroundConfig>,
    pub avatar: Option<AvatarConfig>,
    pub hitokoto: Option<HitokotoConfig>,
    pub music: Option<MusicConfig>,
    pub object_storage: Option<ObjectStorageConfig>,
    pub canvas: Option<CanvasState>,
}

impl RemoteSettings {
    /// Decode a row, logging and skipping blobs that fail to parse.
    pub fn from_row(row: SettingsRow) -> Self {
        let theme = match (row.theme_color, row.dark_mode) {
            (None, None) => None,
            (color, dark) => {
                let defaults = ThemeConfig::default();
                Some(ThemeConfig {
                    theme_color: color
                        .filter(|color| !color.trim().is_empty())
                        .unwrap_or(defaults.theme_color),
                    dark_mode: dark.as_ref().and_then(value_as_bool).unwrap_or(defaults.dark_mode),
                })
            }
        };

        Self {
            pinned: decode_blob::<Vec<Note>>("pinned_memos", row.pinned_memos),
            theme,
            font: decode_blob("font_config", row.font_config),
            background: decode_blob("background_config", row.background_config),
            avatar: decode_blob("avatar_config", row.avatar_config),
            hitokoto: decode_blob("hitokoto_config", row.hitokoto_config),
            music: decode_blob("music_config", row.music_config),
            object_storage: decode_blob("s3_config", row.s3_config),
            canvas: decode_blob::<CanvasState>("canvas_config", row.canvas_config)
                .filter(|canvas| !canvas.0.is_null()),
        }
    }

    /// Encode for upload.
    pub fn to_row(&self) -> SettingsRow {
        SettingsRow {
            pinned_memos: encode_blob(self.pinned.as_ref()),
            theme_color: self.theme.as_ref().map(|theme| theme.theme_color.clone()),
            dark_mode: self.theme.as_ref().map(|theme| Value::Bool(theme.dark_mode)),
            hitokoto_config: encode_blob(self.hitokoto.as_ref()),
            font_config: encode_blob(self.font.as_ref()),
            background_config: encode_blob(self.background.as_ref()),
            avatar_config: encode_blob(self.avatar.as_ref()),
            canvas_config: encode_blob(self.canvas.as_ref()),
            music_config: encode_blob(self.music.as_ref()),
            s3_config: encode_blob(self.object_storage.as_ref()),
        }
    }
}

fn encode_blob<T: Serialize>(blob: Option<&T>) -> Option<Value> {
    blob.and_then(|blob| serde_json::to_value(blob).ok())
        .filter(|value| !value.is_null())
}

/// Decode a blob column that may hold JSON or JSON text.
fn decode_blob<T: DeserializeOwned>(column: &str, value: Option<Value>) -> Option<T> {
    let value = match value? {
        Value::Null => return None,
        Value::String(text) if text.trim().is_empty() => return None,
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(parsed) => parsed,
            Err(error) => {
                tracing::warn!("Remote {} is not valid JSON: {}", column, error);
                return None;
            }
        },
        other => other,
    };
    match serde_json::from_value(value) {
        Ok(decoded) => Some(decoded),
        Err(error) => {
            tracing::warn!("Ignoring malformed remote {}: {}", column, error);
            None
        }
    }
}

fn value_as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::Number(number) => number.as_i64().map(|n| n != 0),
        Value::String(text) => match text.trim() {
            "true" | "1" => Some(true),
            "false" | "0" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(decode_blob("list column", value).unwrap_or_default())
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_as_bool).unwrap_or(false))
}

/// `{success, data, message}` envelope used by the D1 API
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

/// `{status}` health payload
#[derive(Debug, Deserialize)]
pub struct HealthBody {
    #[serde(default)]
    pub status: String,
}
