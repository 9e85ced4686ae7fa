mod embedded;
pub mod memory;
pub mod postgres;

pub use memory::InMemoryNoteRepository;
pub use postgres::PgNoteRepository;

use async_trait::async_trait;

use crate::models::{Note, NoteDraft, NoteId};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage timed out {0}")]
    Timeout(&'static str),

    #[error("storage connection unavailable: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("storage driver error: {0}")]
    Driver(#[from] tokio_postgres::Error),

    #[error("storage returned no row for {0}")]
    MissingRow(&'static str),

    #[error("failed to migrate storage schema: {0}")]
    Migration(#[from] refinery::Error),
}

/// Persistence operations over notes. Lookups by id report a missing note as
/// `Ok(None)`; deciding what that means is left to the caller.
#[async_trait]
pub trait NoteRepository: Send + Sync {
    /// Every note, most recently created first.
    async fn list(&self) -> Result<Vec<Note>, StoreError>;

    async fn get(&self, id: NoteId) -> Result<Option<Note>, StoreError>;

    /// Assigns a fresh id and sets both timestamps to the same instant.
    async fn create(&self, draft: NoteDraft) -> Result<Note, StoreError>;

    /// Replaces title and content and returns the note as stored after the
    /// change. `updated_at` always moves forward; `created_at` is untouched.
    async fn update(&self, id: NoteId, draft: NoteDraft) -> Result<Option<Note>, StoreError>;

    /// Returns whether a note was removed.
    async fn delete(&self, id: NoteId) -> Result<bool, StoreError>;
}
