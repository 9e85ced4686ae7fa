use crate::{
    dto::{CreateNoteRequest, NoteResponse, UpdateNoteRequest},
    models::{InvalidIdentifier, NoteDraft, NoteId, ValidationError},
    repository::{NoteRepository, StoreError},
};

use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum NoteServiceError {
    #[error("note {0} not found")]
    NotFound(NoteId),

    #[error(transparent)]
    InvalidIdentifier(#[from] InvalidIdentifier),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

#[derive(Clone)]
pub struct NoteService {
    repo: Arc<dyn NoteRepository>,
    validate: bool,
}

impl NoteService {
    /// `validate` turns the non-empty title/content check on create and
    /// update on or off.
    pub const fn new(repo: Arc<dyn NoteRepository>, validate: bool) -> Self {
        Self { repo, validate }
    }

    fn draft(&self, title: String, content: String) -> Result<NoteDraft, ValidationError> {
        if self.validate {
            NoteDraft::new(title, content)
        } else {
            Ok(NoteDraft::unchecked(title, content))
        }
    }

    pub async fn get_all_notes(&self) -> Result<Vec<NoteResponse>, NoteServiceError> {
        let notes = self.repo.list().await?;
        Ok(notes.into_iter().map(NoteResponse::from).collect())
    }

    pub async fn get_one_note(&self, id: &str) -> Result<NoteResponse, NoteServiceError> {
        let id: NoteId = id.parse()?;

        self.repo
            .get(id)
            .await?
            .map(NoteResponse::from)
            .ok_or(NoteServiceError::NotFound(id))
    }

    pub async fn create_note(
        &self,
        request: CreateNoteRequest,
    ) -> Result<NoteResponse, NoteServiceError> {
        let draft = self.draft(request.title, request.content)?;
        let note = self.repo.create(draft).await?;

        tracing::debug!("created note {}", note.id);

        Ok(note.into())
    }

    pub async fn update_note(
        &self,
        id: &str,
        request: UpdateNoteRequest,
    ) -> Result<NoteResponse, NoteServiceError> {
        let id: NoteId = id.parse()?;
        let draft = self.draft(request.title, request.content)?;

        self.repo
            .update(id, draft)
            .await?
            .map(NoteResponse::from)
            .ok_or(NoteServiceError::NotFound(id))
    }

    pub async fn delete_note(&self, id: &str) -> Result<(), NoteServiceError> {
        let id: NoteId = id.parse()?;

        if self.repo.delete(id).await? {
            tracing::debug!("deleted note {id}");
            Ok(())
        } else {
            Err(NoteServiceError::NotFound(id))
        }
    }
}
