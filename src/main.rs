//! upwatch - HTTP uptime monitor
//!
//! Polls each configured endpoint on its own interval, keeps a history of
//! every check, and notifies only when an endpoint flips between up and down.

mod config;
mod db;
mod notify;
mod probe;
mod scheduler;
mod state;
mod targets;
mod web;

use config::ServerConfig;
use db::Store;
use notify::Notifier;
use probe::HttpProber;
use scheduler::{Engine, Scheduler};
use state::StateTracker;
use targets::TargetRegistry;
use web::Server;

use std::future::Future;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("upwatch=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting upwatch on port {}...", cfg.http_port);
    tracing::info!("Using database at {}", cfg.db_path);

    // A bad target list is fatal
    let registry = TargetRegistry::load(&cfg.targets_file)?;
    tracing::info!("Loaded {} targets from {}", registry.len(), cfg.targets_file);

    // Initialize database
    let store = Store::new(&cfg.db_path)?;
    tracing::info!("Database initialized with {} stored checks", store.count()?);

    let tracker = Arc::new(StateTracker::new());
    let notifier = Notifier::from_config(&cfg);
    tracing::info!("Notification transports: {:?}", notifier.transport_names());

    let engine = Engine::new(
        HttpProber::new(cfg.request_timeout)?,
        store.clone(),
        tracker.clone(),
        notifier,
    );

    // Start scheduler
    let scheduler = Scheduler::new(engine, cfg.check_interval);
    scheduler.start(&registry).await;
    tracing::info!("{} polling loops running", scheduler.running().await);

    // Serve the dashboard until Ctrl-C
    let server = Server::new(cfg, store, tracker);
    serve_until(&server, &scheduler, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown signal received");
    })
    .await
}

/// Serve until `shutdown` resolves, then stop every polling loop.
///
/// The loops are stopped even when the server fails to bind.
async fn serve_until<F>(
    server: &Server,
    scheduler: &Scheduler,
    shutdown: F,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    F: Future<Output = ()> + Send + 'static,
{
    let served = server.start(shutdown).await;
    scheduler.stop().await;
    served
}
