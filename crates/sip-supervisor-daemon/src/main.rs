//! SIP agent supervisor daemon.
//!
//! Run with: cargo run -p sip-supervisor-daemon
//!
//! Needs `SIP_USER`, `SIP_PASS`, `SIP_DOMAIN` and `SIP_SERVER` in the
//! environment or a `.env` file. Then poll http://localhost:5050/status.

use std::{process::ExitCode, sync::Arc, time::Duration};

use anyhow::Context;
use sip_supervisor_agent::CommandChannel;
use sip_supervisor_core::{StateStore, SupervisorConfig};
use sip_supervisor_session::{CallController, SupervisorManager};
use sip_supervisor_transport::{AppState, serve};
use tokio::{net::TcpListener, sync::watch};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Bound on draining in-flight HTTP requests at exit.
const SERVER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env first so it can set RUST_LOG too.
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = match SupervisorConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = config.validate() {
        tracing::error!("{e}");
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: SupervisorConfig) -> anyhow::Result<()> {
    let store = Arc::new(StateStore::new());
    let commands = CommandChannel::new(config.command_timeout);
    let controller = Arc::new(CallController::new(
        Arc::clone(&store),
        Arc::new(commands.clone()),
    ));

    let addr = config.socket_addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind HTTP server to {addr}"))?;

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let server = tokio::spawn(serve(listener, AppState::new(controller), async move {
        let _ = stop_rx.wait_for(|stop| *stop).await;
    }));

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let manager = SupervisorManager::new(config.agent.clone(), store, commands);
    let outcome = manager.run(&mut shutdown).await?;
    tracing::info!(?outcome, "Supervision ended");

    if !outcome.caller_initiated() {
        tracing::info!(grace = ?config.exit_grace, "Agent is gone; keeping HTTP server up for inspection");
        tokio::select! {
            () = tokio::time::sleep(config.exit_grace) => {}
            () = &mut shutdown => {}
        }
    }

    let _ = stop_tx.send(true);
    match tokio::time::timeout(SERVER_STOP_TIMEOUT, server).await {
        Ok(Ok(result)) => result.context("HTTP server failed")?,
        Ok(Err(e)) => return Err(e).context("HTTP server task panicked"),
        Err(_) => tracing::warn!("HTTP server did not stop in time"),
    }

    tracing::info!("Stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
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
                tracing::error!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
