//! Codetrail Server - Main entry point
//!
//! Serves code evolution timelines over HTTP.

use std::net::SocketAddr;
use std::sync::Arc;

use codetrail_core::{
    api::{self, AppState},
    config::Config,
    db::Database,
    events::{EventIngestor, EventSource, InMemoryEventSource, SeedData},
    service::TimelineService,
    telemetry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config: {}. Using defaults.", e);
        Config::default()
    });

    telemetry::init_telemetry(&config.telemetry())?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.server.environment,
        "Starting Codetrail Server"
    );

    // Event sources: PostgreSQL when configured, in-memory otherwise
    let (fine, coarse, db): (Arc<dyn EventSource>, Arc<dyn EventSource>, Option<Database>) =
        if config.database.url.is_some() {
            let db = Database::connect(&config.database).await?;
            if config.database.run_migrations {
                db.migrate().await?;
                tracing::info!("Database migrations applied");
            }
            let (fine, coarse) = db.event_sources(config.ingestion.assignment_fallback);
            (Arc::new(fine), Arc::new(coarse), Some(db))
        } else {
            let (fine, coarse) = match &config.ingestion.seed_file {
                Some(path) => {
                    let seed = SeedData::from_file(path)?;
                    tracing::info!(
                        path = %path.display(),
                        fine = seed.fine.len(),
                        coarse = seed.coarse.len(),
                        "Loaded seed events"
                    );
                    seed.into_sources()
                }
                None => (
                    InMemoryEventSource::new("memory-fine"),
                    InMemoryEventSource::new("memory-coarse"),
                ),
            };
            tracing::warn!("No database configured, serving in-memory event sources");
            (Arc::new(fine), Arc::new(coarse), None)
        };

    let ingestor = EventIngestor::new(fine, coarse, config.ingestion.ingest_config());
    let service = TimelineService::new(ingestor)
        .with_build_options(config.timeline.build_options())
        .with_cache_config(config.cache.cache_config());

    let mut app_state = AppState::new(Arc::new(service));
    if let Some(db) = db {
        app_state = app_state.with_database(db);
    }

    // Build router
    let app = api::build_router(app_state);

    // Start server
    let addr: SocketAddr = config.server.bind_address().parse()?;
    tracing::info!(address = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Wait for shutdown signal.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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

    tracing::info!("Shutdown signal received");
}
