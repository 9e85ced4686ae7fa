use chrono::{DateTime, Utc};
use uuid::Uuid;

use std::{fmt, str::FromStr};

/// Store-generated note identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoteId(Uuid);

impl NoteId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for NoteId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl fmt::Display for NoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a valid note identifier")]
pub struct InvalidIdentifier(pub String);

impl FromStr for NoteId {
    type Err = InvalidIdentifier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::try_parse(s)
            .map(Self)
            .map_err(|_| InvalidIdentifier(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub id: NoteId,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("note {field} must not be empty")]
pub struct ValidationError {
    pub field: &'static str,
}

/// Title and content on their way into the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteDraft {
    title: String,
    content: String,
}

impl NoteDraft {
    /// Builds a draft, rejecting an empty or whitespace-only title or content.
    /// Values are kept as given, without trimming.
    pub fn new(title: String, content: String) -> Result<Self, ValidationError> {
        if title.trim().is_empty() {
            return Err(ValidationError { field: "title" });
        }
        if content.trim().is_empty() {
            return Err(ValidationError { field: "content" });
        }

        Ok(Self { title, content })
    }

    /// Builds a draft without the non-empty check.
    pub const fn unchecked(title: String, content: String) -> Self {
        Self { title, content }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}
