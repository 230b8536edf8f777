//! Deletion tombstone model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::note::NoteId;

/// Marks a locally deleted note whose remote delete has not succeeded yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tombstone {
    /// Deleted note id
    pub id: NoteId,
    /// When the local delete happened
    pub deleted_at: DateTime<Utc>,
}

impl Tombstone {
    /// Create a tombstone for `id` deleted at `deleted_at`.
    pub const fn new(id: NoteId, deleted_at: DateTime<Utc>) -> Self {
        Self { id, deleted_at }
    }
}
