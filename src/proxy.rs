// HTTP proxy server: router assembly, lifecycle and log retention

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use crate::backends::{Backend, OllamaBackend, OpenAiBackend};
use crate::config::{BackendKind, Config, DatabaseConfig};
use crate::database::Database;
use crate::error::StartupError;
use crate::handlers::{chat, generate, logs, models, AppState};
use crate::middleware::log_requests;

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

pub fn router(state: AppState) -> Router {
    let server = &state.config.server;
    let (enable_cors, verbose) = (server.enable_cors, server.verbose);

    let mut app = Router::new()
        .route(generate::ENDPOINT, post(generate::generate_handler))
        .route(chat::ENDPOINT, post(chat::chat_handler))
        .route("/api/tags", get(models::tags_handler))
        .route("/api/show", post(models::show_handler))
        .route("/health", get(health_handler))
        .route("/", get(logs::home_handler))
        .route("/logs", get(logs::list_handler))
        .route("/logs/details", get(logs::details_handler))
        .with_state(state);

    if verbose {
        app = app.layer(axum::middleware::from_fn(log_requests));
    }
    if enable_cors {
        app = app.layer(CorsLayer::permissive());
    }
    app
}

pub fn build_backend(config: &Config) -> Result<Arc<dyn Backend>, reqwest::Error> {
    let timeout = Duration::from_secs(config.backend.timeout);
    let endpoint = config.backend.endpoint.clone();

    Ok(match config.backend.kind {
        BackendKind::OpenAi => Arc::new(OpenAiBackend::new(
            endpoint,
            timeout,
            config.backend_openai.force_prompt_cache,
        )?),
        BackendKind::Ollama => Arc::new(OllamaBackend::new(endpoint, timeout)?),
    })
}

/// One retention pass: by count, then by age. Zero disables either limit.
pub fn prune(db: &Database, settings: &DatabaseConfig) {
    if settings.max_requests > 0 {
        match db.cleanup_old_requests(settings.max_requests) {
            Ok(0) => {}
            Ok(deleted) => tracing::info!(
                "[DB] Cleaned up {} old records (keeping {})",
                deleted,
                settings.max_requests
            ),
            Err(e) => tracing::error!("[DB] Failed to clean up old records: {}", e),
        }
    }
    if settings.max_age_days > 0 {
        match db.cleanup_older_than(settings.max_age_days) {
            Ok(0) => {}
            Ok(deleted) => tracing::info!(
                "[DB] Cleaned up {} records older than {} days",
                deleted,
                settings.max_age_days
            ),
            Err(e) => tracing::error!("[DB] Failed to clean up expired records: {}", e),
        }
    }
}

/// Prune on startup and then every `cleanup_interval` minutes until `shutdown` fires.
pub fn spawn_cleanup_task(
    db: Database,
    settings: DatabaseConfig,
    shutdown: CancellationToken,
) -> Option<JoinHandle<()>> {
    if settings.cleanup_interval == 0 {
        tracing::info!("[DB] Periodic cleanup disabled");
        return None;
    }

    Some(tokio::spawn(async move {
        let period = Duration::from_secs(settings.cleanup_interval.saturating_mul(60));
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let db = db.clone();
                    let settings = settings.clone();
                    let pass = tokio::task::spawn_blocking(move || prune(&db, &settings));
                    if let Err(e) = pass.await {
                        tracing::error!("[DB] Cleanup task failed: {}", e);
                    }
                }
            }
        }
    }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("[PROXY] Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("[PROXY] Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("[PROXY] Shutdown signal received, stopping server...");
}

pub async fn run(config: Config) -> Result<(), StartupError> {
    let config = Arc::new(config);

    let db = Database::new(&config.database.path)?;
    tracing::info!("[DB] Database initialized: {}", config.database.path);

    let backend = build_backend(&config)?;
    tracing::info!(
        "[PROXY] Using {} backend at {}",
        backend.name(),
        backend.endpoint()
    );

    let shutdown = CancellationToken::new();
    let cleanup = spawn_cleanup_task(db.clone(), config.database.clone(), shutdown.clone());

    let app = router(AppState::new(config.clone(), backend, db));
    let listener = TcpListener::bind(config.listen_addr()).await?;
    tracing::info!("[PROXY] Proxy server running on http://{}", config.listen_addr());

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    shutdown.cancel();
    if let Some(cleanup) = cleanup {
        let _ = cleanup.await;
    }
    tracing::info!("[PROXY] Proxy server stopped");

    result.map_err(StartupError::from)
}
