use notes_api::{
    config,
    connection::{ConnectionManager, PgConnector},
    handlers::rest::AppState,
    repository::PgNoteRepository,
    server,
    service::NoteService,
};

use tracing_subscriber::EnvFilter;

use std::{process, sync::Arc};

#[tokio::main]
async fn main() {
    // Log setup
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load config
    let cfg = config::load_config().unwrap_or_else(|e| {
        tracing::error!("Failed to load configuration: {e}");
        process::exit(1);
    });
    tracing::info!("Successfully loaded config, running in {:?} mode", cfg.app_mode);

    // Storage connection, fatal once the retry budget is spent
    let options = cfg.connection_options();
    let manager = PgConnector::new(&cfg.database_url, options.clone())
        .and_then(|connector| ConnectionManager::new(connector, cfg.retry_policy()))
        .unwrap_or_else(|e| {
            tracing::error!("{e}");
            process::exit(1);
        });
    let pool = manager.connect().await.unwrap_or_else(|e| {
        tracing::error!("Failed to establish database connection: {e}");
        process::exit(1);
    });

    let repo = PgNoteRepository::new(pool, &options);
    repo.migrate().await.unwrap_or_else(|e| {
        tracing::error!("Failed to migrate database: {e}");
        process::exit(1);
    });

    // Service creation
    let service = Arc::new(NoteService::new(Arc::new(repo), cfg.validate_notes));
    let state = AppState {
        service,
        mode: cfg.app_mode,
    };

    let router = server::build_router(state, &cfg.client_origins);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", cfg.port))
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Failed to bind to port {}: {e}", cfg.port);
            process::exit(1);
        });

    match listener.local_addr() {
        Ok(addr) => tracing::info!("Server running, listening on {addr}"),
        Err(e) => tracing::warn!("Server running, local address unavailable: {e}"),
    }

    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("HTTP server error: {e}");
        process::exit(1);
    }

    tracing::info!("Server stopped");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
