use std::sync::Arc;

use rendezvous_engine::{Engine, EngineConfig};
use rendezvous_events::{EventBus, LogDispatcher, PushDispatcher, PushRouter, WebhookDispatcher};
use rendezvous_worker::config::WorkerConfig;
use rendezvous_worker::jobs;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rendezvous_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = WorkerConfig::from_env();
    let engine_config = EngineConfig::from_env();

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = rendezvous_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    rendezvous_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database connection pool created");

    // Sweeps cancel matches and request confirmations, so they publish too.
    let event_bus = Arc::new(EventBus::default());
    let dispatcher: Arc<dyn PushDispatcher> = match &config.push_webhook_url {
        Some(url) => Arc::new(WebhookDispatcher::new(url.clone())),
        None => Arc::new(LogDispatcher),
    };
    let router_handle = tokio::spawn(PushRouter::new(dispatcher).run(event_bus.subscribe()));

    let engine = Engine::new(pool, engine_config, Arc::clone(&event_bus));
    let cancel = CancellationToken::new();
    let handles = jobs::spawn_all(&engine, &config, &cancel);
    tracing::info!(jobs = handles.len(), "Worker started");

    shutdown_signal().await;
    cancel.cancel();

    for (sweep, handle) in handles {
        if tokio::time::timeout(config.shutdown_timeout, handle)
            .await
            .is_err()
        {
            tracing::warn!(sweep = sweep.name(), "Sweep job did not stop in time");
        }
    }

    drop(engine);
    drop(event_bus);
    let _ = tokio::time::timeout(config.shutdown_timeout, router_handle).await;
    tracing::info!("Worker shut down");
}

/// Wait for SIGINT or (on Unix) SIGTERM.
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
        () = ctrl_c => tracing::info!("Received SIGINT (Ctrl-C), stopping sweeps"),
        () = terminate => tracing::info!("Received SIGTERM, stopping sweeps"),
    }
}
