//! jobfish HTTP server.
//!
//! Loads configuration, restores the application ledger, starts the status
//! poller and serves the API until Ctrl-C.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use jobfish::logging::init_logging;
use jobfish::{
    load_config_or_default, ApplicationEventBroadcaster, ApplicationLedger, Database,
    HttpAgentClient, JobStore, Orchestrator, OrchestratorSettings, StatusPoller,
};

mod routes;
mod state;

use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Failed to load .env: {}", e);
        }
    }

    let config_path = std::env::var_os("JOBFISH_CONFIG");
    let config = load_config_or_default(config_path.as_ref()).context("loading configuration")?;
    init_logging(&config.logging).context("initializing logging")?;

    let db = match config.database.resolve_path() {
        Some(path) => Database::open(&path)
            .with_context(|| format!("opening database at {}", path.display()))?,
        None => {
            tracing::warn!("No home directory found, history will not survive a restart");
            Database::open_in_memory().context("opening in-memory database")?
        }
    };

    match db.location() {
        Some(path) => tracing::info!(path = %path.display(), "Using database"),
        None => tracing::info!("Using in-memory database"),
    }

    let ledger = Arc::new(ApplicationLedger::with_database(db.clone()));
    let restored = ledger
        .load_from_database()
        .context("restoring application ledger")?;
    tracing::info!(restored, "Application ledger restored");

    let agent = Arc::new(
        HttpAgentClient::from_config(&config.agent).context("configuring agent client")?,
    );

    let orchestrator = Orchestrator::builder(
        agent.clone(),
        Arc::new(JobStore::new()),
        ledger,
        OrchestratorSettings::from(&config.orchestrator),
    )
    .events(ApplicationEventBroadcaster::default())
    .search_history(db)
    .build();

    let state = AppState::new(orchestrator.clone());

    let poller = StatusPoller::new(
        orchestrator,
        agent,
        Duration::from_secs(config.poller.interval_secs),
    )
    .with_status_timeout(Duration::from_secs(config.poller.status_timeout_secs));
    let poller_handle = if config.poller.enabled {
        Some(poller.start(state.poll_trigger.subscribe()))
    } else {
        tracing::info!("Status poller disabled");
        None
    };

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("parsing server address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!(%addr, "jobfish server listening");

    axum::serve(listener, routes::create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    poller.stop();
    if let Some(handle) = poller_handle {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "Status poller task ended abnormally");
        }
    }
    tracing::info!("jobfish server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
