use axum::{
    Json, Router,
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    config::RunMode,
    dto::MessageResponse,
    handlers::rest::{self, AppState},
};

pub fn build_router(state: AppState, client_origins: &[String]) -> Router {
    let cors = cors_layer(state.mode, client_origins);

    let notes_router = Router::new()
        .route("/", get(rest::get_all_notes).post(rest::create_note))
        .route(
            "/{id}",
            get(rest::get_one_note)
                .put(rest::update_note)
                .delete(rest::delete_note),
        );

    Router::new()
        .route("/", get(root))
        .nest("/api/notes", notes_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", rest::ApiDoc::openapi()))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(panic_response))
}

/// Any origin in development; only the configured origins in production.
fn cors_layer(mode: RunMode, client_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    if mode.is_development() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = client_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Ignoring invalid client origin '{origin}': {e}");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        tracing::warn!("No client origins configured, cross-origin requests will be refused");
    }

    layer.allow_origin(AllowOrigin::list(origins))
}

fn panic_response(err: Box<dyn std::any::Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic payload");
    tracing::error!("Request handler panicked: {detail}");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(MessageResponse::new("Internal server error")),
    )
        .into_response()
}

async fn root() -> Response {
    (StatusCode::OK, "Backend is running").into_response()
}
