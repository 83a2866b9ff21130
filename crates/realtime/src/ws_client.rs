//! WebSocket transport built on tokio-tungstenite.

use std::time::Duration;

use futures_util::StreamExt;
use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::transport::{Connector, Inbound, Link, LinkError, Outbound};

/// Handshake must complete within this long.
const OPEN_TIMEOUT: Duration = Duration::from_secs(20);

/// Hard limit enforced by tungstenite itself. Text frames above
/// [`MAX_FRAME_SIZE`](medlink_protocol::constants::MAX_FRAME_SIZE) are
/// dropped by the read pump before this is reached.
const WS_HARD_LIMIT: usize = 16 * 1024 * 1024;

const QUEUE_DEPTH: usize = 256;

/// Opens real WebSocket connections.
#[derive(Debug, Clone, Default)]
pub struct WsConnector {
    idle_timeout: Option<Duration>,
}

impl WsConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treats a connection that receives nothing for `timeout` as dead.
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    async fn open(&self, url: String) -> Result<Link, LinkError> {
        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(WS_HARD_LIMIT);
        ws_config.max_frame_size = Some(WS_HARD_LIMIT);

        let connect = tokio_tungstenite::connect_async_with_config(url, Some(ws_config), false);
        let (ws_stream, response) = tokio::time::timeout(OPEN_TIMEOUT, connect)
            .await
            .map_err(|_| LinkError::Timeout)??;
        debug!(status = %response.status(), "WebSocket handshake complete");

        let (write, read) = ws_stream.split();
        let (out_tx, out_rx) = mpsc::channel::<Outbound>(QUEUE_DEPTH);
        let (in_tx, in_rx) = mpsc::channel::<Inbound>(QUEUE_DEPTH);
        let (control_tx, control_rx) = mpsc::channel::<tungstenite::Message>(16);
        let cancel = CancellationToken::new();

        tokio::spawn(crate::pumps::write::write_pump(
            write,
            out_rx,
            control_rx,
            cancel.clone(),
        ));
        tokio::spawn(crate::pumps::read::read_pump(
            read,
            in_tx,
            control_tx,
            self.idle_timeout,
            cancel,
        ));

        Ok(Link {
            sender: out_tx,
            events: in_rx,
        })
    }
}

impl Connector for WsConnector {
    fn connect(&self, url: String) -> BoxFuture<'_, Result<Link, LinkError>> {
        Box::pin(self.open(url))
    }
}
