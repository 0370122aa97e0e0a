//! cmdledger -- remote shell command execution with an audit trail.
//!
//! The executor runs commands on request and ships every outcome, best
//! effort, to one of several history store instances through a forwarder
//! that rate-limits, circuit-breaks and retries per instance. The history
//! store keeps those records and answers time-window queries.

pub mod api;
pub mod config;
pub mod exec;
pub mod forward;
pub mod history;
pub mod record;
pub mod rpc;
pub mod storage;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tracing::info;

use crate::api::state::{ExecState, StoreState};
use crate::config::{AppConfig, LogFormat, LoggingConfig};
use crate::exec::{BasicExecService, ExecService};
use crate::forward::Forwarder;
use crate::history::HistoryStore;

/// Install the global tracing subscriber, writing to stderr. `RUST_LOG` wins
/// over the configured level.
pub fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match logging.format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Build the executor service chain: logging, then forwarding when store
/// instances are configured.
pub fn build_exec_service(config: &AppConfig) -> Result<(Arc<dyn ExecService>, Option<Arc<Forwarder>>)> {
    let forwarder = Forwarder::from_config(&config.forward)?.map(Arc::new);
    let service = exec::new(
        Arc::new(BasicExecService::from_config(&config.exec)),
        vec![exec::logging(), exec::forwarding(forwarder.clone())],
    );
    Ok((service, forwarder))
}

/// Run the executor HTTP service until interrupted.
pub async fn serve_exec(config: &AppConfig) -> Result<()> {
    let (service, forwarder) = build_exec_service(config)?;
    let app = api::exec_router(ExecState { service, forwarder });
    serve("exec", &config.exec.listen_address, app).await
}

/// Run the history store HTTP service until interrupted, then close the
/// store.
pub async fn serve_store(config: &AppConfig) -> Result<()> {
    let store: Arc<dyn HistoryStore> = history::open_store(&config.store)?;
    let service = history::new(Arc::clone(&store), vec![history::logging()]);
    let app = api::store_router(StoreState { service }, &config.store);

    let served = serve("store", &config.store.listen_address, app).await;
    store.close().await;
    info!("history store closed");
    served
}

async fn serve(name: &str, bind: &str, app: Router) -> Result<()> {
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("invalid listen address '{bind}'"))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(service = name, %addr, "cmdledger listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    info!(service = name, "shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
