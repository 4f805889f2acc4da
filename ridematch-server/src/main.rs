//! Ridematch Server
//!
//! Driver matching and offer dispatch for a ride-booking backend.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use clap::Parser;
use config::file::StoreKind;
use config::{ConfigLoader, get_database_url};
use ridematch_core::collaborators::HttpCollaborator;
use ridematch_core::config::StoreBackend;
use ridematch_core::events::{EventSenders, notification_event_channel, ride_status_channel};
use ridematch_core::matching::MatchingEngine;
use ridematch_core::processors::{MatchScheduler, NotificationSender};
use ridematch_core::store::{InMemoryStore, PgMatchStore, SharedStore};
use ridematch_core::utils::{SharedClock, SystemClock};
use server::{build_router, run_server};
use shutdown::spawn_config_reload_handler;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Ridematch - driver matching and offer dispatch
#[derive(Parser, Debug)]
#[command(name = "ridematch-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./ridematch-config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Override the store backend
    #[arg(long, value_enum)]
    store: Option<StoreKind>,

    /// Run database migrations on startup (Postgres store only)
    #[arg(long, default_value = "false")]
    migrate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    // Parse command line arguments
    let args = Args::parse();

    tracing::info!("Starting ridematch-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = Arc::new(ConfigLoader::new(&args.config, args.listen, args.store));
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;

    let listen_addr = loaded_config.server.listen;
    let backend = loaded_config.server.store;
    let collaborator_config = loaded_config.collaborators.clone();
    tracing::info!("Configuration loaded from {:?}", args.config);

    // Convert to shared config with separate locks for each section
    let shared_config = loaded_config.into_shared();

    let clock: SharedClock = Arc::new(SystemClock);

    let (store, db_pool): (SharedStore, Option<PgPool>) = match backend {
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; state is lost on restart");
            let store: SharedStore = Arc::new(InMemoryStore::new());
            (store, None)
        }
        StoreBackend::Postgres => {
            let db_pool = connect_database(args.migrate).await?;
            let store: SharedStore = Arc::new(PgMatchStore::new(db_pool.clone()));
            (store, Some(db_pool))
        }
    };

    // Collaborators and event channels
    let collaborator = Arc::new(HttpCollaborator::new(&collaborator_config, clock.clone()));
    let (notification_tx, notification_rx) = notification_event_channel();
    let event_senders = EventSenders::new(notification_tx, ride_status_channel());

    let engine = MatchingEngine::new(
        store,
        clock,
        shared_config.matching.clone(),
        collaborator.clone(),
        event_senders,
    );

    // Background processors
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_handle = tokio::spawn(
        MatchScheduler::new(engine.clone())
            .run(shutdown_rx.clone(), shared_config.matching.subscribe()),
    );
    let notifier_handle =
        tokio::spawn(NotificationSender::new(collaborator).run(shutdown_rx, notification_rx));

    // Create application state
    let state = AppState::new(engine, shared_config);

    // Spawn config reload handler (listens for SIGHUP)
    let shutdown_notify = spawn_config_reload_handler(state.clone(), config_loader);

    // Build the router
    let router = build_router(state);

    // Run the server
    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr).await;

    // Signal the config reload handler and processors to stop
    shutdown_notify.notify_one();
    let _ = shutdown_tx.send(true);
    for (name, handle) in [("scheduler", scheduler_handle), ("notifier", notifier_handle)] {
        if let Err(e) = handle.await {
            tracing::error!(processor = name, "Processor task failed: {}", e);
        }
    }

    // Close database connections gracefully
    if let Some(db_pool) = db_pool {
        tracing::info!("Closing database connections...");
        db_pool.close().await;
    }
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

async fn connect_database(migrate: bool) -> anyhow::Result<PgPool> {
    // Get database URL from environment
    let database_url = get_database_url().map_err(|e| {
        tracing::error!("DATABASE_URL environment variable not set");
        e
    })?;

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    // Run migrations if requested
    if migrate {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&db_pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to run migrations: {}", e);
                e
            })?;
        tracing::info!("Migrations completed successfully");
    }

    Ok(db_pool)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
