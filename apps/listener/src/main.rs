//! Subscribes to the configured channels and prints every frame as one
//! JSON line. Ctrl-C closes all channels normally.

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use medlink_auth::{CredentialRefresher, FileCredentialStore, HttpTokenExchange};
use medlink_protocol::Frame;
use medlink_realtime::{ChannelManager, WsConnector};

use config::ListenerConfig;

/// Time allowed for close frames to reach the server before exiting.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,medlink=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_path = match std::env::args_os().nth(1) {
        Some(arg) => PathBuf::from(arg),
        None => config::default_config_path()?,
    };
    let cfg = ListenerConfig::load_from(&config_path);
    if cfg.channels.is_empty() {
        anyhow::bail!("no channels configured in {}", config_path.display());
    }

    let store = Arc::new(FileCredentialStore::new(cfg.credentials_path(&config_path)));
    let exchange =
        Arc::new(HttpTokenExchange::new(&cfg.refresh_url).context("building refresh client")?);
    let refresher = Arc::new(CredentialRefresher::new(store, exchange));
    let connector = Arc::new(WsConnector::new().with_idle_timeout(cfg.idle_timeout()));
    let manager = ChannelManager::new(cfg.manager_config(), connector, refresher);

    let mut subscriptions = Vec::new();
    for raw in &cfg.channels {
        let channel = match manager.channel(raw) {
            Ok(c) => c,
            Err(e) => {
                warn!(url = %raw, "skipping channel: {e}");
                continue;
            }
        };

        let label = channel.to_string();
        let on_message = move |frame: &Frame| println!("{label}\t{}", frame.to_json());
        let label = channel.to_string();
        let on_state = move |open: bool| info!(channel = %label, open, "connection state");
        subscriptions.push(manager.subscribe(&channel, on_message, on_state));
    }
    if subscriptions.is_empty() {
        anyhow::bail!("none of the configured channels is valid");
    }
    info!(count = subscriptions.len(), "listening");

    tokio::signal::ctrl_c()
        .await
        .context("waiting for ctrl-c")?;

    info!("shutting down");
    manager.shutdown();
    drop(subscriptions);
    tokio::time::sleep(SHUTDOWN_GRACE).await;
    Ok(())
}
