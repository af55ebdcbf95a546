//! Registration HTTP server.
//!
//! This binary:
//! - Loads configuration from the environment (and `.env`)
//! - Connects to `PostgreSQL` and runs migrations, or falls back to the
//!   in-memory repository when `DATABASE_URL` is unset
//! - Seeds the catalog from `CATALOG_FILE`
//! - Starts the expiry sweeper
//! - Serves the REST API until Ctrl+C
//!
//! # Usage
//!
//! ```bash
//! DATABASE_URL=postgres://localhost/registration \
//! CATALOG_FILE=catalog.json \
//! cargo run --bin registration-server
//! ```

use anyhow::Context;
use enrollment_core::environment::SystemClock;
use enrollment_runtime::metrics::MetricsRecorder;
use registration::metrics::register_registration_metrics;
use registration::{
    AppState, Collaborators, Config, ExpirySweeper, InMemoryCatalog, InMemoryRepository, LoggingNotifier,
    MockPaymentGateway, PostgresRepository, RegistrationRepository, RegistrationService, ServiceSettings,
    build_router,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,registration=debug,sqlx=warn,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting registration server...");

    let config = Config::from_env();
    tracing::info!(
        bind = %config.bind_address(),
        database = config.database.is_some(),
        hold_minutes = config.registration.hold_duration_minutes,
        sweep_seconds = config.sweep.interval_seconds,
        "Configuration loaded"
    );

    let recorder = MetricsRecorder::install().context("installing metrics recorder")?;
    register_registration_metrics();

    let repository: Arc<dyn RegistrationRepository> = match &config.database {
        Some(db) => {
            let repo = PostgresRepository::connect(
                &db.url,
                db.max_connections,
                std::time::Duration::from_secs(db.connect_timeout),
            )
            .await
            .context("connecting to PostgreSQL")?;
            repo.migrate().await.context("running migrations")?;
            tracing::info!("✓ PostgreSQL repository ready");
            Arc::new(repo)
        },
        None => {
            tracing::warn!("DATABASE_URL not set; registrations are kept in memory only");
            Arc::new(InMemoryRepository::new())
        },
    };

    let catalog = match &config.catalog_file {
        Some(path) => InMemoryCatalog::from_file(path).with_context(|| format!("loading catalog from {path}"))?,
        None => {
            tracing::warn!("CATALOG_FILE not set; catalog starts empty");
            InMemoryCatalog::new()
        },
    };

    let service = RegistrationService::new(
        Collaborators {
            repository,
            catalog: Arc::new(catalog),
            gateway: Arc::new(MockPaymentGateway::new()),
            notifier: Arc::new(LoggingNotifier),
            clock: Arc::new(SystemClock),
        },
        config.policy(),
        ServiceSettings::from_config(&config),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = ExpirySweeper::new(service.clone(), config.sweep_interval());
    let sweeper_task = sweeper.spawn(shutdown_rx.clone());
    tracing::info!("✓ Expiry sweeper started");

    let mut state = AppState::new(service, sweeper).with_metrics(recorder);
    if let Some(secret) = config.webhook_secret.as_deref() {
        state = state.with_webhook_secret(secret);
    }
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("binding {}", config.bind_address()))?;
    tracing::info!(address = %config.bind_address(), "Registration server listening");

    let mut server_shutdown = shutdown_rx;
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = server_shutdown.wait_for(|stop| *stop).await;
    });
    let server = tokio::spawn(async move { server.await });

    tokio::signal::ctrl_c().await.context("listening for Ctrl+C")?;
    tracing::info!("Shutting down gracefully...");
    let _ = shutdown_tx.send(true);

    match tokio::time::timeout(config.shutdown_timeout(), server).await {
        Ok(joined) => joined.context("server task panicked")?.context("server error")?,
        Err(_) => tracing::warn!("In-flight requests did not finish within the shutdown timeout"),
    }
    let _ = sweeper_task.await;

    tracing::info!("Shutdown complete");
    Ok(())
}
