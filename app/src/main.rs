use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use clap::Parser;
use common::{AppState, Config};
use database::{Database, DocumentStore};
use serde_json::json;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load .env before anything reads the environment
    dotenvy::dotenv().ok();

    // 2. Initialize Logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 3. Load Config from CLI args
    let config = Config::parse();

    // 4. Connect to the document store; the process does not start without it
    let db = Database::new(&config.database_url)
        .await
        .inspect_err(|e| tracing::error!("The connection could not be established: {}", e))?;
    db.run_migrations().await?;

    let store: Arc<dyn DocumentStore> = Arc::new(db);
    let state = Arc::new(AppState { db: store.clone() });

    // 5. Start Server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);
    axum::serve(listener, app_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 6. Release the store
    store.close().await;

    Ok(())
}

fn app_router(state: Arc<AppState>) -> Router {
    Router::<Arc<AppState>>::new()
        .route("/", get(root))
        .route("/health", get(health))
        .merge(cards::handler::cards_router(state.clone()))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn root() -> Response {
    Json(json!({ "message": "Hello World" })).into_response()
}

async fn health(State(state): State<Arc<AppState>>) -> Response {
    match state.db.ping().await {
        Ok(()) => Json(json!({ "status": "ok" })).into_response(),
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "detail": "Document store unavailable" })),
            )
                .into_response()
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
