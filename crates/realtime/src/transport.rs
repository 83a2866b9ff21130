//! Transport seam between the channel manager and the socket.
//!
//! The manager only ever sees a [`Link`]: an outbound queue and an inbound
//! event stream. [`WsConnector`](crate::WsConnector) is the production
//! implementation; tests plug in an in-memory one.

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;

/// Frames the manager writes to a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    /// Close the connection with the given code.
    Close(u16),
}

/// Events a connection reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Text(String),
    /// The connection is gone. Always the last event on a link.
    Closed { code: u16 },
}

/// An open connection.
pub struct Link {
    pub sender: mpsc::Sender<Outbound>,
    pub events: mpsc::Receiver<Inbound>,
}

/// Errors from opening a link.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("connection attempt timed out")]
    Timeout,

    #[error("connection closed")]
    Closed,
}

/// Opens links to a target URL.
pub trait Connector: Send + Sync {
    /// Opens a link to `url`. The URL already carries the credential.
    fn connect(&self, url: String) -> BoxFuture<'_, Result<Link, LinkError>>;
}
