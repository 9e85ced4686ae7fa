use async_trait::async_trait;
use deadpool_postgres::{Object, Pool};
use tokio::time::timeout;
use tokio_postgres::{Row, types::ToSql};
use uuid::Uuid;

use std::time::Duration;

use super::{NoteRepository, StoreError, embedded::migrations};
use crate::{
    connection::ConnectionOptions,
    models::{Note, NoteDraft, NoteId},
};

const NOTE_COLUMNS: &str = "id, title, content, created_at, updated_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Statement {
    List,
    Get,
    Insert,
    Update,
    Delete,
}

impl Statement {
    /// Whether a second run, after the first one's outcome was lost with its
    /// connection, reports what the first run would have. A repeated delete
    /// would report a committed removal as a missing note.
    const fn reissuable(self) -> bool {
        matches!(self, Self::Insert | Self::Update)
    }
}

pub struct PgNoteRepository {
    pool: Pool,
    socket_timeout: Duration,
    retryable_writes: bool,
}

impl PgNoteRepository {
    pub const fn new(pool: Pool, options: &ConnectionOptions) -> Self {
        Self {
            pool,
            socket_timeout: options.socket_timeout,
            retryable_writes: options.retryable_writes,
        }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        let mut client = self.pool.get().await?;
        let migrations_report = migrations::runner().run_async(&mut **client).await?;

        for migration in migrations_report.applied_migrations() {
            tracing::info!(
                "Migration Applied -  Name: {}, Version: {}",
                migration.name(),
                migration.version()
            );
        }

        tracing::info!("DB migrations finished!");

        Ok(())
    }

    /// Runs one statement under the socket timeout. With retryable writes on,
    /// an insert or update whose connection closed underneath it is issued
    /// once more on another connection.
    async fn query(
        &self,
        statement: Statement,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>, StoreError> {
        let mut reissued = false;

        loop {
            let client = self.pool.get().await?;
            let outcome = timeout(self.socket_timeout, client.query(sql, params)).await;

            match outcome {
                Ok(Ok(rows)) => return Ok(rows),
                Ok(Err(e))
                    if e.is_closed()
                        && self.retryable_writes
                        && statement.reissuable()
                        && !reissued =>
                {
                    tracing::warn!(
                        "Storage connection closed during {statement:?}, retrying once: {e}"
                    );
                    reissued = true;
                }
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    // the abandoned response may still arrive on this connection
                    drop(Object::take(client));
                    return Err(StoreError::Timeout("waiting for a storage response"));
                }
            }
        }
    }
}

fn note_from_row(row: &Row) -> Note {
    Note {
        id: NoteId::from(row.get::<_, Uuid>("id")),
        title: row.get("title"),
        content: row.get("content"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl NoteRepository for PgNoteRepository {
    async fn list(&self) -> Result<Vec<Note>, StoreError> {
        let rows = self
            .query(
                Statement::List,
                &format!("SELECT {NOTE_COLUMNS} FROM notes ORDER BY created_at DESC"),
                &[],
            )
            .await?;

        Ok(rows.iter().map(note_from_row).collect())
    }

    async fn get(&self, id: NoteId) -> Result<Option<Note>, StoreError> {
        let rows = self
            .query(
                Statement::Get,
                &format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = $1"),
                &[id.as_uuid()],
            )
            .await?;

        Ok(rows.first().map(note_from_row))
    }

    async fn create(&self, draft: NoteDraft) -> Result<Note, StoreError> {
        let id = NoteId::generate();

        // The conflict clause makes a re-issued insert return the row written
        // by the first attempt.
        let rows = self
            .query(
                Statement::Insert,
                &format!(
                    "INSERT INTO notes (id, title, content, created_at, updated_at) \
                     VALUES ($1, $2, $3, now(), now()) \
                     ON CONFLICT (id) DO UPDATE SET id = EXCLUDED.id \
                     RETURNING {NOTE_COLUMNS}"
                ),
                &[id.as_uuid(), &draft.title(), &draft.content()],
            )
            .await?;

        rows.first()
            .map(note_from_row)
            .ok_or(StoreError::MissingRow("insert"))
    }

    async fn update(&self, id: NoteId, draft: NoteDraft) -> Result<Option<Note>, StoreError> {
        let rows = self
            .query(
                Statement::Update,
                &format!(
                    "UPDATE notes SET title = $2, content = $3, \
                     updated_at = GREATEST(clock_timestamp(), updated_at + interval '1 microsecond') \
                     WHERE id = $1 \
                     RETURNING {NOTE_COLUMNS}"
                ),
                &[id.as_uuid(), &draft.title(), &draft.content()],
            )
            .await?;

        Ok(rows.first().map(note_from_row))
    }

    async fn delete(&self, id: NoteId) -> Result<bool, StoreError> {
        let rows = self
            .query(
                Statement::Delete,
                "DELETE FROM notes WHERE id = $1 RETURNING id",
                &[id.as_uuid()],
            )
            .await?;

        Ok(!rows.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_idempotent_writes_are_reissued() {
        assert!(Statement::Insert.reissuable());
        assert!(Statement::Update.reissuable());
        assert!(!Statement::Delete.reissuable());
        assert!(!Statement::Get.reissuable());
        assert!(!Statement::List.reissuable());
    }
}
