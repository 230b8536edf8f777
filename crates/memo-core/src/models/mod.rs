//! Data models for memo

mod note;
mod settings;
mod tombstone;

pub use note::{extract_tags, AudioClip, Note, NoteId};
pub use settings::{
    AiConfig, AvatarConfig, BackgroundConfig, CanvasState, CustomSong, FontConfig, HitokotoConfig,
    KeyboardShortcuts, LargeObjectRef, MusicConfig, ObjectStorageConfig, ObjectStorageProvider,
    SettingsBlob, SettingsSnapshot, ThemeConfig,
};
pub use tombstone::Tombstone;
