//! Intake Server - Main entry point

use anyhow::{Context, Result};
use intake_common::logging::{init_logging, LogConfig};
use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tracing::info;

use intake_server::{
    api::{self, AppState},
    classifier::HttpHeaderClassifier,
    config::{Config, DatabaseConfig, LifecycleBackend},
    handoff::{http::HttpPublisherConfig, HttpPublisher},
    lifecycle::{LifecycleStore, MemoryLifecycleStore, PgLifecycleStore},
    orchestrator::Orchestrator,
    storage::{config::StagingBackend, ArtifactStore, LandingSource, LocalStorage, S3Storage},
};

#[tokio::main]
async fn main() -> Result<()> {
    let log_config = LogConfig::builder()
        .log_file_prefix("intake-server")
        .filter_directives("intake_server=debug,intake_repair=info,tower_http=debug,sqlx=warn")
        .build();

    // Environment variables take precedence
    let log_config = log_config.merge_env()?;

    init_logging(&log_config)?;

    info!("Starting Intake Server");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let store = lifecycle_store(&config).await?;
    info!("Lifecycle store ready ({})", store.backend());

    let (landing, artifacts) = staging(&config).await?;

    let publisher = HttpPublisher::new(HttpPublisherConfig {
        handoff_url: config.publisher.handoff_url.clone(),
        events_url: config.publisher.events_url.clone(),
        dead_letter_url: config.publisher.dead_letter_url.clone(),
        timeout_secs: config.publisher.timeout_secs,
    })?;

    let mut orchestrator = Orchestrator::new(store, landing, artifacts, Arc::new(publisher))
        .with_ingest_config(config.ingest.clone())
        .with_repair_config(config.repair.clone());

    if let Some(url) = &config.publisher.header_classifier_url {
        let classifier =
            HttpHeaderClassifier::new(url, Duration::from_secs(config.publisher.timeout_secs))?;
        orchestrator = orchestrator.with_classifier(Arc::new(classifier));
        info!("Header classifier enabled at {}", url);
    }

    let state = AppState {
        orchestrator: Arc::new(orchestrator),
    };

    // One attempt may spend the repair bound plus a handful of I/O bounds
    let request_timeout =
        Duration::from_secs(config.ingest.repair_timeout_secs + 6 * config.ingest.io_timeout_secs);
    let app = api::router(state, request_timeout);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.server.shutdown_timeout_secs))
        .await?;

    info!("Server shut down gracefully");

    Ok(())
}

async fn lifecycle_store(config: &Config) -> Result<Arc<dyn LifecycleStore>> {
    match config.lifecycle.backend {
        LifecycleBackend::Memory => {
            tracing::warn!("Using in-memory lifecycle store; records are lost on restart");
            Ok(Arc::new(MemoryLifecycleStore::new()))
        },
        LifecycleBackend::Postgres => {
            let pool = connect(&config.database).await?;
            info!("Database connection pool established");

            let store = PgLifecycleStore::new(pool);
            store.migrate().await?;
            info!("Database migrations completed");

            Ok(Arc::new(store))
        },
    }
}

async fn connect(database: &DatabaseConfig) -> Result<sqlx::PgPool> {
    PgPoolOptions::new()
        .max_connections(database.max_connections)
        .min_connections(database.min_connections)
        .acquire_timeout(Duration::from_secs(database.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(database.idle_timeout_secs))
        .connect(&database.url)
        .await
        .context("Failed to connect to the lifecycle database")
}

async fn staging(config: &Config) -> Result<(Arc<dyn LandingSource>, Arc<dyn ArtifactStore>)> {
    match config.staging.backend {
        StagingBackend::S3 => {
            let storage = Arc::new(S3Storage::new(config.staging.s3.clone()).await?);
            let landing: Arc<dyn LandingSource> = storage.clone();
            let artifacts: Arc<dyn ArtifactStore> = storage;
            Ok((landing, artifacts))
        },
        StagingBackend::Local => {
            info!("Using local staging under {}", config.staging.root.display());
            let storage = Arc::new(LocalStorage::new(config.staging.root.clone()));
            let landing: Arc<dyn LandingSource> = storage.clone();
            let artifacts: Arc<dyn ArtifactStore> = storage;
            Ok((landing, artifacts))
        },
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    info!("Waiting up to {} seconds for connections to close", timeout_secs);
    tokio::time::sleep(Duration::from_secs(timeout_secs.min(5))).await;
}
