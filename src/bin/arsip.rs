use std::net::SocketAddr;

use anyhow::Context;
use arsip::{app::build, config::Config, state::AppState};
use axum::Router;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::parse();

    let state = AppState::new(&config)
        .await
        .context("Cannot initialise application state")?;
    tracing::info!(
        "{} registered users, storage root at {:?}",
        state.db.count_users().await?,
        state.storage.root()
    );

    let app = build(state.clone());
    let served = webserver(config.listen_addr(), app).await;

    // close the pool so sqlite flushes the WAL before exit
    state.db.close().await;
    tracing::info!("Shut down");
    served
}

async fn webserver(addr: SocketAddr, app: Router) -> anyhow::Result<()> {
    tracing::info!("Listening on {}", addr);
    axum::Server::try_bind(&addr)
        .with_context(|| format!("Cannot bind {addr}"))?
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Cannot listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                tracing::error!("Cannot listen for SIGTERM: {err}");
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
    tracing::info!("Shutdown signal received, draining connections");
}
