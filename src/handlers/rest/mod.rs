use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_macros::debug_handler;
use utoipa::OpenApi;

use std::sync::Arc;

use crate::{
    config::RunMode,
    dto::{CreateNoteRequest, MessageResponse, NoteResponse, UpdateNoteRequest},
    service::{NoteService, NoteServiceError},
};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<NoteService>,
    pub mode: RunMode,
}

#[derive(OpenApi)]
#[openapi(
    paths(get_all_notes, get_one_note, create_note, update_note, delete_note),
    components(schemas(
        NoteResponse,
        CreateNoteRequest,
        UpdateNoteRequest,
        MessageResponse
    )),
    tags(
        (name = "notes", description = "Notes management API")
    )
)]
pub struct ApiDoc;

fn message(status: StatusCode, text: impl Into<String>) -> Response {
    (status, Json(MessageResponse::new(text))).into_response()
}

/// Maps a service failure to its status code. Internal details only leave the
/// process in development mode.
fn error_response(mode: RunMode, action: &str, err: NoteServiceError) -> Response {
    match err {
        NoteServiceError::NotFound(_) | NoteServiceError::InvalidIdentifier(_) => {
            tracing::debug!("failed to {action}: {err}");
            message(StatusCode::NOT_FOUND, "Note not found")
        }
        NoteServiceError::Validation(e) => message(StatusCode::BAD_REQUEST, e.to_string()),
        NoteServiceError::Storage(e) => {
            tracing::error!("failed to {action}: {e}");
            let body = MessageResponse {
                message: "Internal server error".to_string(),
                error: mode.is_development().then(|| e.to_string()),
            };
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

fn rejection_response(rejection: &JsonRejection) -> Response {
    tracing::debug!("rejected request body: {rejection}");
    message(StatusCode::BAD_REQUEST, rejection.body_text())
}

#[utoipa::path(
    get,
    path = "/api/notes",
    responses(
        (status = 200, description = "All notes, most recently created first", body = Vec<NoteResponse>),
        (status = 500, description = "Internal server error", body = MessageResponse)
    ),
    tag = "notes"
)]
#[debug_handler]
pub async fn get_all_notes(State(state): State<AppState>) -> Response {
    match state.service.get_all_notes().await {
        Ok(notes) => (StatusCode::OK, Json(notes)).into_response(),
        Err(e) => error_response(state.mode, "list notes", e),
    }
}

#[utoipa::path(
    get,
    path = "/api/notes/{id}",
    params(
        ("id" = String, Path, description = "Note ID")
    ),
    responses(
        (status = 200, description = "Note found", body = NoteResponse),
        (status = 404, description = "Note not found or malformed ID", body = MessageResponse),
        (status = 500, description = "Internal server error", body = MessageResponse)
    ),
    tag = "notes"
)]
#[debug_handler]
pub async fn get_one_note(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.service.get_one_note(&id).await {
        Ok(note) => (StatusCode::OK, Json(note)).into_response(),
        Err(e) => error_response(state.mode, "get note", e),
    }
}

#[utoipa::path(
    post,
    path = "/api/notes",
    request_body = CreateNoteRequest,
    responses(
        (status = 201, description = "Note created successfully", body = NoteResponse),
        (status = 400, description = "Empty title or content, or malformed body", body = MessageResponse),
        (status = 500, description = "Internal server error", body = MessageResponse)
    ),
    tag = "notes"
)]
#[debug_handler]
pub async fn create_note(
    State(state): State<AppState>,
    payload: Result<Json<CreateNoteRequest>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejection_response(&rejection),
    };

    match state.service.create_note(payload).await {
        Ok(note) => (StatusCode::CREATED, Json(note)).into_response(),
        Err(e) => error_response(state.mode, "create note", e),
    }
}

#[utoipa::path(
    put,
    path = "/api/notes/{id}",
    params(
        ("id" = String, Path, description = "Note ID")
    ),
    request_body = UpdateNoteRequest,
    responses(
        (status = 200, description = "Note updated, post-update state", body = NoteResponse),
        (status = 400, description = "Empty title or content, or malformed body", body = MessageResponse),
        (status = 404, description = "Note not found or malformed ID", body = MessageResponse),
        (status = 500, description = "Internal server error", body = MessageResponse)
    ),
    tag = "notes"
)]
#[debug_handler]
pub async fn update_note(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateNoteRequest>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejection_response(&rejection),
    };

    match state.service.update_note(&id, payload).await {
        Ok(note) => (StatusCode::OK, Json(note)).into_response(),
        Err(e) => error_response(state.mode, "update note", e),
    }
}

#[utoipa::path(
    delete,
    path = "/api/notes/{id}",
    params(
        ("id" = String, Path, description = "Note ID")
    ),
    responses(
        (status = 200, description = "Note deleted successfully", body = MessageResponse),
        (status = 404, description = "Note not found or malformed ID", body = MessageResponse),
        (status = 500, description = "Internal server error", body = MessageResponse)
    ),
    tag = "notes"
)]
#[debug_handler]
pub async fn delete_note(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.service.delete_note(&id).await {
        Ok(()) => message(StatusCode::OK, "Note deleted successfully"),
        Err(e) => error_response(state.mode, "delete note", e),
    }
}
