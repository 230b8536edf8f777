//! Note model

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::OnceLock;
use uuid::Uuid;

/// An opaque, stable note identifier.
///
/// New notes get a UUID v7 string, but ids coming from a remote or from older
/// local snapshots are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoteId(String);

impl NoteId {
    /// Create a new unique note ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for NoteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NoteId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NoteId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Attachment metadata for a recorded audio clip. The audio itself lives in
/// object storage or the large-object store and is never inlined here.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioClip {
    /// Attachment id in the large-object store, when stored locally
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Storage locator (object storage URL)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Where the clip bytes live (`indexeddb`, `s3`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_type: Option<String>,
    /// Clip duration in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// When the clip was recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// A user-authored memo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    /// Unique identifier
    pub id: NoteId,
    /// Text body, may embed emoji shortcodes and backlink references
    pub content: String,
    /// Tag set (order irrelevant)
    #[serde(default)]
    pub tags: Vec<String>,
    /// Referenced note ids, resolved lazily at render time
    #[serde(default)]
    pub backlinks: Vec<NoteId>,
    /// Audio attachment metadata
    #[serde(default)]
    pub audio_clips: Vec<AudioClip>,
    /// Visible on the guest read path
    #[serde(default)]
    pub is_public: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp, the sole merge tie-breaker
    pub updated_at: DateTime<Utc>,
    /// Local-only bookkeeping fields, preserved across remote overwrites
    #[serde(flatten)]
    pub local: serde_json::Map<String, serde_json::Value>,
}

impl Note {
    /// Create a new note with the given content; `#tags` are derived from it.
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        let content = content.into();
        let now = Utc::now();
        Self {
            id: NoteId::new(),
            tags: extract_tags(&content),
            content,
            backlinks: Vec::new(),
            audio_clips: Vec::new(),
            is_public: false,
            created_at: now,
            updated_at: now,
            local: serde_json::Map::new(),
        }
    }

    /// Last-modified time used for merge precedence.
    ///
    /// Never earlier than `created_at`, even for malformed snapshots.
    #[must_use]
    pub fn last_modified(&self) -> DateTime<Utc> {
        self.updated_at.max(self.created_at)
    }

    /// Bump `updated_at` after a local edit.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now.max(self.last_modified());
    }

    /// Replace content and re-derive tags from it.
    pub fn set_content(&mut self, content: impl Into<String>, now: DateTime<Utc>) {
        self.content = content.into();
        self.tags = extract_tags(&self.content);
        self.touch(now);
    }

    /// Overwrite the synced fields with a newer remote copy.
    ///
    /// Identity, `created_at`, and local bookkeeping are kept.
    pub fn apply_remote(&mut self, remote: &Self) {
        self.content.clone_from(&remote.content);
        self.tags.clone_from(&remote.tags);
        self.backlinks.clone_from(&remote.backlinks);
        self.audio_clips.clone_from(&remote.audio_clips);
        self.is_public = remote.is_public;
        self.updated_at = remote.updated_at;
    }

    /// Get first line as title preview, truncated to `max_len` characters
    #[must_use]
    pub fn title_preview(&self, max_len: usize) -> String {
        self.content
            .lines()
            .next()
            .unwrap_or("")
            .chars()
            .take(max_len)
            .collect()
    }

    /// Check if note content is empty (whitespace-only counts as empty)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty()
    }
}

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"#([\p{L}][\p{L}\p{N}_-]*)").expect("Invalid regex"))
}

/// Extract #tags from text
///
/// Valid tags start with a letter followed by letters, digits, `_` or `-`.
/// Tags are returned in lowercase, deduplicated, and sorted.
///
/// # Examples
///
/// ```
/// use memo_core::models::extract_tags;
///
/// let tags = extract_tags("Hello #world this is #Rust-lang");
/// assert!(tags.contains(&"world".to_string()));
/// assert!(tags.contains(&"rust-lang".to_string()));
/// ```
#[must_use]
pub fn extract_tags(text: &str) -> Vec<String> {
    let mut tags = tag_pattern()
        .captures_iter(text)
        .map(|cap| cap[1].to_lowercase())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect::<Vec<_>>();
    tags.sort();
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_note_id_unique() {
        let id1 = NoteId::new();
        let id2 = NoteId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_note_new() {
        let note = Note::new("Hello world #idea");
        assert_eq!(note.content, "Hello world #idea");
        assert_eq!(note.tags, vec!["idea"]);
        assert!(!note.is_public);
        assert_eq!(note.created_at, note.updated_at);
    }

    #[test]
    fn touch_never_moves_backwards() {
        let mut note = Note::new("x");
        let earlier = note.created_at - Duration::seconds(10);
        note.touch(earlier);
        assert_eq!(note.updated_at, note.created_at);

        let later = note.created_at + Duration::seconds(10);
        note.touch(later);
        assert_eq!(note.updated_at, later);
    }

    #[test]
    fn apply_remote_keeps_local_bookkeeping() {
        let mut local = Note::new("old");
        local
            .local
            .insert("draft".to_string(), serde_json::Value::Bool(true));
        let mut remote = local.clone();
        remote.local.clear();
        remote.content = "new".to_string();
        remote.is_public = true;
        remote.updated_at = local.updated_at + Duration::seconds(5);

        local.apply_remote(&remote);

        assert_eq!(local.content, "new");
        assert!(local.is_public);
        assert_eq!(local.updated_at, remote.updated_at);
        assert_eq!(local.local.get("draft"), Some(&serde_json::Value::Bool(true)));
    }

    #[test]
    fn local_fields_survive_serde() {
        let raw = r#"{
            "id": "42",
            "content": "hi",
            "createdAt": "2024-01-01T00:00:00Z",
            "updatedAt": "2024-01-02T00:00:00Z",
            "pinnedAt": "2024-01-03T00:00:00Z"
        }"#;
        let note: Note = serde_json::from_str(raw).unwrap();
        assert_eq!(note.id.as_str(), "42");
        assert!(note.tags.is_empty());
        assert!(note.local.contains_key("pinnedAt"));

        let back = serde_json::to_value(&note).unwrap();
        assert_eq!(back["pinnedAt"], "2024-01-03T00:00:00Z");
    }

    #[test]
    fn test_extract_tags_multiple() {
        let tags = extract_tags("#hello #world #rust");
        assert_eq!(tags, vec!["hello", "rust", "world"]);
    }

    #[test]
    fn test_extract_tags_deduplication() {
        let tags = extract_tags("#hello #Hello #HELLO");
        assert_eq!(tags, vec!["hello"]);
    }

    #[test]
    fn test_extract_tags_invalid() {
        // Tags starting with numbers are invalid
        let tags = extract_tags("#123 #456test");
        assert!(tags.is_empty());
    }

    #[test]
    fn test_extract_tags_unicode() {
        let tags = extract_tags("今天 #想法 和 #读书笔记");
        assert_eq!(tags.len(), 2);
        assert!(tags.contains(&"想法".to_string()));
    }

    #[test]
    fn test_title_preview() {
        let note = Note::new("First line\nSecond line\nThird line");
        assert_eq!(note.title_preview(50), "First line");
        assert_eq!(note.title_preview(5), "First");
    }
}
