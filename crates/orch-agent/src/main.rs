use std::net::SocketAddr;

use orch_core::{OrchConfig, Shutdown};
use tracing::{info, warn};

mod app;
mod http;
mod ws;

const DEFAULT_BIND: &str = "0.0.0.0:8080";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "orch_agent=info,tower_http=debug".into()))
        .init();

    let config_path = std::env::var("ORCH_CONFIG").ok();
    let config = OrchConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("config load failed ({}), using defaults", e);
        OrchConfig::default()
    });

    let shutdown = Shutdown::new();
    let state = app::AppState::build(&config, shutdown.clone()).await;

    tokio::spawn({
        let context = state.context.clone();
        let shutdown = shutdown.clone();
        async move { context.run_eviction_daemon(shutdown).await }
    });
    tokio::spawn({
        let sessions = state.sessions.clone();
        let shutdown = shutdown.clone();
        async move { sessions.run_expiry_daemon(shutdown).await }
    });
    tokio::spawn({
        let ports = state.ports.clone();
        let queue = state.queue.clone();
        let shutdown = shutdown.clone();
        async move { ports.run_health_monitor(app::inbound_sink(queue), shutdown).await }
    });

    state.start_ports().await;

    let router = app::build_router(state.clone());
    let bind = std::env::var("ORCH_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND.to_string());
    let addr: SocketAddr = bind.parse()?;
    info!("orch-agent listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown_signal()).await?;

    shutdown.cancel();
    state.drain().await;
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received");
}
