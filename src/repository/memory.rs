use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use tokio::sync::RwLock;

use std::collections::HashMap;

use super::{NoteRepository, StoreError};
use crate::models::{Note, NoteDraft, NoteId};

/// Process-local note storage, used as the stand-in store in tests.
#[derive(Default)]
pub struct InMemoryNoteRepository {
    notes: RwLock<HashMap<NoteId, Note>>,
}

impl InMemoryNoteRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NoteRepository for InMemoryNoteRepository {
    async fn list(&self) -> Result<Vec<Note>, StoreError> {
        let mut notes: Vec<Note> = self.notes.read().await.values().cloned().collect();
        notes.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notes)
    }

    async fn get(&self, id: NoteId) -> Result<Option<Note>, StoreError> {
        Ok(self.notes.read().await.get(&id).cloned())
    }

    async fn create(&self, draft: NoteDraft) -> Result<Note, StoreError> {
        let now = Utc::now();
        let note = Note {
            id: NoteId::generate(),
            title: draft.title().to_string(),
            content: draft.content().to_string(),
            created_at: now,
            updated_at: now,
        };

        self.notes.write().await.insert(note.id, note.clone());
        Ok(note)
    }

    async fn update(&self, id: NoteId, draft: NoteDraft) -> Result<Option<Note>, StoreError> {
        let mut notes = self.notes.write().await;
        let Some(note) = notes.get_mut(&id) else {
            return Ok(None);
        };

        let floor = note.updated_at + TimeDelta::microseconds(1);
        note.title = draft.title().to_string();
        note.content = draft.content().to_string();
        note.updated_at = Utc::now().max(floor);

        Ok(Some(note.clone()))
    }

    async fn delete(&self, id: NoteId) -> Result<bool, StoreError> {
        Ok(self.notes.write().await.remove(&id).is_some())
    }
}
