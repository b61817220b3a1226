use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rendezvous_engine::{Engine, EngineConfig};
use rendezvous_events::{EventBus, LogDispatcher, PushDispatcher, PushRouter, WebhookDispatcher};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rendezvous_api::config::ServerConfig;
use rendezvous_api::router::build_app_router;
use rendezvous_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rendezvous_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    let engine_config = EngineConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = rendezvous_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    rendezvous_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    rendezvous_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Event bus and push routing ---
    let event_bus = Arc::new(EventBus::default());
    let dispatcher: Arc<dyn PushDispatcher> = match &config.push_webhook_url {
        Some(url) => {
            tracing::info!(%url, "Push notifications delivered via webhook");
            Arc::new(WebhookDispatcher::new(url.clone()))
        }
        None => {
            tracing::warn!("PUSH_WEBHOOK_URL not set, push notifications are only logged");
            Arc::new(LogDispatcher)
        }
    };
    let router_handle = tokio::spawn(PushRouter::new(dispatcher).run(event_bus.subscribe()));

    // --- App state ---
    let engine = Engine::new(pool.clone(), engine_config, Arc::clone(&event_bus));
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        engine,
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    // The push router exits once the last bus handle is dropped.
    drop(event_bus);
    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);
    if tokio::time::timeout(shutdown_timeout, router_handle)
        .await
        .is_err()
    {
        tracing::warn!("Push router did not drain before the shutdown timeout");
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
