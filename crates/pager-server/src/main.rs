//! # pager-server
//!
//! Backend for the pager notification system. This binary provides:
//! - the **broker hub**: a gossipsub node every console connects to, which
//!   mirrors client topic subscriptions so it forwards between them
//! - the **notify API** (axum): the relay endpoint consoles use when they
//!   send through the backend instead of publishing directly
//! - the **user directory API**: register/login/list/delete, backing the
//!   identity context of the consoles

mod api;
mod broker;
mod config;
mod error;
mod topics;
mod users;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::users::UserStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,pager_server=debug")),
        )
        .init();

    info!("Starting pager server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    let (broker, broker_peer_id) = broker::spawn_broker(&config.listen_addr).await?;
    info!(
        peer_id = %broker_peer_id,
        addr = %config.listen_addr,
        "Broker hub running in background"
    );

    let app_state = AppState {
        broker,
        users: UserStore::new(),
        config: Arc::new(config.clone()),
    };

    tokio::select! {
        result = api::serve(app_state, config.http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
