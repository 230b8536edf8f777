//! Out-of-line storage for payloads too large for the key-value table

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::LocalStore;
use crate::error::Result;
use crate::models::LargeObjectRef;

/// A payload stored out of line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LargeObject {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub data: String,
}

/// Secondary store for oversized values such as inline background images.
///
/// Shares the connection of the [`LocalStore`] it was created from but is not
/// subject to its per-value limit.
#[derive(Clone)]
pub struct LargeObjectStore {
    store: LocalStore,
}

impl LargeObjectStore {
    pub const fn new(store: LocalStore) -> Self {
        Self { store }
    }

    /// Store `data` under `id`, replacing any previous payload.
    pub fn put(&self, id: &str, name: &str, mime_type: &str, data: &str) -> Result<LargeObjectRef> {
        let stored_at = Utc::now();
        let conn = self.store.connection();
        conn.execute(
            "INSERT INTO large_objects (id, name, mime_type, data, size_bytes, stored_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                mime_type = excluded.mime_type,
                data = excluded.data,
                size_bytes = excluded.size_bytes,
                stored_at = excluded.stored_at",
            params![
                id,
                name,
                mime_type,
                data,
                i64::try_from(data.len()).unwrap_or(i64::MAX),
                stored_at.timestamp_millis()
            ],
        )?;

        tracing::debug!("Stored large object {} ({} bytes)", id, data.len());
        Ok(LargeObjectRef {
            id: id.to_string(),
            mime_type: mime_type.to_string(),
            stored_at,
        })
    }

    /// Fetch a stored payload.
    pub fn get(&self, id: &str) -> Result<Option<LargeObject>> {
        let conn = self.store.connection();
        let object = conn
            .query_row(
                "SELECT id, name, mime_type, data FROM large_objects WHERE id = ?",
                params![id],
                |row| {
                    Ok(LargeObject {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        mime_type: row.get(2)?,
                        data: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(object)
    }

    /// Delete a payload. Missing ids are ignored.
    pub fn delete(&self, id: &str) -> Result<()> {
        let conn = self.store.connection();
        conn.execute("DELETE FROM large_objects WHERE id = ?", params![id])?;
        Ok(())
    }
}
