//! Database models
//!
//! Rust structs representing database entities.
//! All models use serde so the UI shell can consume them directly.
//! Timestamps are Unix epoch milliseconds.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Current time as stored in `created_at` / `updated_at`
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// A persisted note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Note {
    pub id: i64,
    pub title: String,
    pub content: String,
    /// Free-text label; empty means uncategorized
    pub category: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Note {
    pub fn is_uncategorized(&self) -> bool {
        self.category.is_empty()
    }

    pub fn created(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.created_at).single()
    }

    pub fn updated(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.updated_at).single()
    }
}

/// Insert note request; the store assigns the id
#[derive(Debug, Clone, Deserialize)]
pub struct NewNote {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub category: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl NewNote {
    /// A note stamped with the current time for both timestamps
    pub fn now(title: impl Into<String>, content: impl Into<String>, category: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            title: title.into(),
            content: content.into(),
            category: category.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A label that can be attached to any number of notes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub color: String,
}

/// Insert tag request; `color` falls back to the default tag color
#[derive(Debug, Clone, Deserialize)]
pub struct NewTag {
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
}

impl NewTag {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: None,
        }
    }
}

/// Association row between a note and a tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, FromRow)]
pub struct NoteTagCrossRef {
    pub note_id: i64,
    pub tag_id: i64,
}

/// A note together with every tag attached to it. Computed, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteWithTags {
    pub note: Note,
    pub tags: Vec<Tag>,
}

impl NoteWithTags {
    pub fn has_tag(&self, tag_id: i64) -> bool {
        self.tags.iter().any(|t| t.id == tag_id)
    }
}
