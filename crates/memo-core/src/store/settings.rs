//! Settings blob persistence

use std::sync::Arc;

use super::{LargeObjectStore, LocalStore};
use crate::error::{Error, Result};
use crate::events::{ChangeFeed, DataPart};
use crate::models::{
    AiConfig, AvatarConfig, BackgroundConfig, CanvasState, FontConfig, HitokotoConfig,
    KeyboardShortcuts, MusicConfig, ObjectStorageConfig, SettingsBlob, SettingsSnapshot,
    ThemeConfig,
};

/// Inline `data:` URIs longer than this are moved to the large-object store.
pub const MAX_INLINE_IMAGE_CHARS: usize = 100_000;

/// Large-object id used for the background image.
pub const BACKGROUND_OBJECT_ID: &str = "background-image";

const QUOTA_WARNING: &str =
    "Local storage is full; the background image is no longer cached. Use an image URL or a random background instead.";

/// Result of a settings write that may have been degraded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Persisted as given
    Saved,
    /// Persisted with the oversized field dropped; the message is user facing
    Degraded(String),
}

impl SaveOutcome {
    /// Warning to show the user, if any.
    pub fn warning(&self) -> Option<&str> {
        match self {
            Self::Saved => None,
            Self::Degraded(message) => Some(message),
        }
    }
}

/// Typed access to the settings blobs in the local store.
#[derive(Clone)]
pub struct SettingsStore {
    store: LocalStore,
    objects: LargeObjectStore,
    changes: Arc<ChangeFeed>,
}

impl SettingsStore {
    pub fn new(store: LocalStore, changes: Arc<ChangeFeed>) -> Self {
        Self {
            objects: LargeObjectStore::new(store.clone()),
            store,
            changes,
        }
    }

    /// Load a blob, falling back to its defaults when absent or malformed.
    pub fn load<B: SettingsBlob>(&self) -> Result<B> {
        self.store.read(B::STORE_KEY)
    }

    /// Load a blob only if it was ever stored.
    pub fn load_present<B: SettingsBlob>(&self) -> Result<Option<B>> {
        self.store.read_opt(B::STORE_KEY)
    }

    /// Persist a blob and notify listeners.
    ///
    /// Backgrounds should go through [`Self::save_background`] so oversized
    /// inline images are moved out of line.
    pub fn save<B: SettingsBlob>(&self, blob: &B) -> Result<()> {
        self.store.write(B::STORE_KEY, blob)?;
        self.changes.emit(DataPart::Settings(B::STORE_KEY));
        Ok(())
    }

    /// Load the background, recovering an out-of-line image into memory.
    ///
    /// The recovered `data:` URI is never written back.
    pub fn load_background(&self) -> Result<BackgroundConfig> {
        let mut background: BackgroundConfig = self.load()?;
        if !background.image_url.is_empty() {
            return Ok(background);
        }
        let Some(reference) = background.image_ref.as_ref() else {
            return Ok(background);
        };
        match self.objects.get(&reference.id) {
            Ok(Some(object)) => background.image_url = object.data,
            Ok(None) => tracing::warn!("Background image {} is missing", reference.id),
            Err(error) => tracing::warn!("Failed to recover background image: {}", error),
        }
        Ok(background)
    }

    /// Persist the background without writing oversized inline images.
    pub fn save_background(&self, background: &BackgroundConfig) -> Result<SaveOutcome> {
        let outcome = self.persist_background(background);
        self.changes
            .emit(DataPart::Settings(BackgroundConfig::STORE_KEY));
        outcome
    }

    fn persist_background(&self, background: &BackgroundConfig) -> Result<SaveOutcome> {
        let mut to_save = background.clone();
        if is_oversized_data_uri(&background.image_url) {
            let mime_type = data_uri_mime_type(&background.image_url);
            match self.objects.put(
                BACKGROUND_OBJECT_ID,
                BACKGROUND_OBJECT_ID,
                mime_type,
                &background.image_url,
            ) {
                Ok(reference) => to_save.image_ref = Some(reference),
                Err(error) => tracing::warn!("Failed to store background image: {}", error),
            }
            to_save.image_url.clear();
        } else if !background.image_url.is_empty() {
            to_save.image_ref = None;
            self.objects.delete(BACKGROUND_OBJECT_ID)?;
        }

        match self.store.write(BackgroundConfig::STORE_KEY, &to_save) {
            Ok(()) => Ok(SaveOutcome::Saved),
            Err(Error::QuotaExceeded { size, limit, .. }) => {
                tracing::warn!(
                    "Background config too large ({} > {} bytes), saving without image",
                    size,
                    limit
                );
                to_save.image_url.clear();
                self.store.write(BackgroundConfig::STORE_KEY, &to_save)?;
                Ok(SaveOutcome::Degraded(QUOTA_WARNING.to_string()))
            }
            Err(error) => Err(error),
        }
    }

    /// Read every blob as stored, without recovering out-of-line payloads.
    pub fn snapshot(&self) -> Result<SettingsSnapshot> {
        Ok(SettingsSnapshot {
            theme: self.load()?,
            font: self.load()?,
            background: self.load()?,
            avatar: self.load()?,
            hitokoto: self.load()?,
            ai: self.load()?,
            shortcuts: self.load()?,
            music: self.load()?,
            object_storage: self.load()?,
            canvas: self.load()?,
        })
    }

    /// Read every blob that was ever stored locally.
    pub fn present(&self) -> Result<PresentSettings> {
        Ok(PresentSettings {
            theme: self.load_present()?,
            font: self.load_present()?,
            background: self.load_present()?,
            avatar: self.load_present()?,
            hitokoto: self.load_present()?,
            ai: self.load_present()?,
            shortcuts: self.load_present()?,
            music: self.load_present()?,
            object_storage: self.load_present()?,
            canvas: self.load_present()?,
        })
    }

    /// Write a merged snapshot without emitting change notifications.
    ///
    /// Returns the user-facing warning if the background had to be degraded.
    pub(crate) fn write_merged(&self, snapshot: &SettingsSnapshot) -> Result<Option<String>> {
        self.store.write(ThemeConfig::STORE_KEY, &snapshot.theme)?;
        self.store.write(FontConfig::STORE_KEY, &snapshot.font)?;
        self.store.write(AvatarConfig::STORE_KEY, &snapshot.avatar)?;
        self.store.write(HitokotoConfig::STORE_KEY, &snapshot.hitokoto)?;
        self.store.write(AiConfig::STORE_KEY, &snapshot.ai)?;
        self.store
            .write(KeyboardShortcuts::STORE_KEY, &snapshot.shortcuts)?;
        self.store.write(MusicConfig::STORE_KEY, &snapshot.music)?;
        self.store
            .write(ObjectStorageConfig::STORE_KEY, &snapshot.object_storage)?;
        self.store.write(CanvasState::STORE_KEY, &snapshot.canvas)?;
        let outcome = self.persist_background(&snapshot.background)?;
        Ok(outcome.warning().map(str::to_string))
    }
}

/// Blobs that exist in the local store, `None` where never written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresentSettings {
    pub theme: Option<ThemeConfig>,
    pub font: Option<FontConfig>,
    pub background: Option<BackgroundConfig>,
    pub avatar: Option<AvatarConfig>,
    pub hitokoto: Option<HitokotoConfig>,
    pub ai: Option<AiConfig>,
    pub shortcuts: Option<KeyboardShortcuts>,
    pub music: Option<MusicConfig>,
    pub object_storage: Option<ObjectStorageConfig>,
    pub canvas: Option<CanvasState>,
}

fn is_oversized_data_uri(value: &str) -> bool {
    value.starts_with("data:") && value.len() > MAX_INLINE_IMAGE_CHARS
}

fn data_uri_mime_type(value: &str) -> &str {
    value
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(';'))
        .map(|(mime, _)| mime)
        .filter(|mime| !mime.is_empty())
        .unwrap_or("image/png")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreLimits;
    use std::sync::Mutex;

    fn settings_store() -> SettingsStore {
        SettingsStore::new(LocalStore::open_in_memory().unwrap(), ChangeFeed::new())
    }

    fn big_image() -> String {
        format!("data:image/jpeg;base64,{}", "A".repeat(MAX_INLINE_IMAGE_CHARS))
    }

    #[test]
    fn missing_blob_loads_defaults() {
        let settings = settings_store();
        assert_eq!(settings.load::<ThemeConfig>().unwrap(), ThemeConfig::default());
        assert!(settings.load_present::<ThemeConfig>().unwrap().is_none());
    }

    #[test]
    fn save_emits_settings_change() {
        let changes = ChangeFeed::new();
        let settings = SettingsStore::new(LocalStore::open_in_memory().unwrap(), Arc::clone(&changes));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _subscription = changes.subscribe(move |part| sink.lock().unwrap().push(part));

        let font = FontConfig {
            font_size: 20,
            ..FontConfig::default()
        };
        settings.save(&font).unwrap();

        assert_eq!(settings.load::<FontConfig>().unwrap(), font);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![DataPart::Settings(FontConfig::STORE_KEY)]
        );
    }

    #[test]
    fn oversized_background_is_stored_out_of_line() {
        let settings = settings_store();
        let background = BackgroundConfig {
            image_url: big_image(),
            ..BackgroundConfig::default()
        };

        let outcome = settings.save_background(&background).unwrap();
        assert_eq!(outcome, SaveOutcome::Saved);

        let stored: BackgroundConfig = settings.load().unwrap();
        assert!(stored.image_url.is_empty());
        let reference = stored.image_ref.unwrap();
        assert_eq!(reference.id, BACKGROUND_OBJECT_ID);
        assert_eq!(reference.mime_type, "image/jpeg");

        let recovered = settings.load_background().unwrap();
        assert_eq!(recovered.image_url, background.image_url);

        // Recovery happens in memory only.
        let still_stored: BackgroundConfig = settings.load().unwrap();
        assert!(still_stored.image_url.is_empty());
    }

    #[test]
    fn small_background_stays_inline() {
        let settings = settings_store();
        let background = BackgroundConfig {
            image_url: "https://images.example/bg.png".to_string(),
            ..BackgroundConfig::default()
        };
        settings.save_background(&background).unwrap();
        assert_eq!(settings.load::<BackgroundConfig>().unwrap(), background);
    }

    #[test]
    fn quota_failure_writes_minimal_record_and_warns() {
        let store = LocalStore::open_in_memory()
            .unwrap()
            .with_limits(StoreLimits { max_value_bytes: 200 });
        let settings = SettingsStore::new(store, ChangeFeed::new());
        let background = BackgroundConfig {
            image_url: format!("https://images.example/{}", "p".repeat(300)),
            blur: 3,
            ..BackgroundConfig::default()
        };

        let outcome = settings.save_background(&background).unwrap();
        assert!(outcome.warning().is_some());

        let stored: BackgroundConfig = settings.load().unwrap();
        assert!(stored.image_url.is_empty());
        assert_eq!(stored.blur, 3);
    }

    #[test]
    fn data_uri_mime_type_defaults_to_png() {
        assert_eq!(data_uri_mime_type("data:image/webp;base64,xx"), "image/webp");
        assert_eq!(data_uri_mime_type("data:;base64,xx"), "image/png");
        assert_eq!(data_uri_mime_type("data:garbage"), "image/png");
    }

    #[test]
    fn present_reports_only_written_blobs() {
        let settings = settings_store();
        settings.save(&MusicConfig::default()).unwrap();
        let present = settings.present().unwrap();
        assert!(present.music.is_some());
        assert!(present.theme.is_none());
    }
}
