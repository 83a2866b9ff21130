//! WebSocket read pump: forwards text frames and reports the close code.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use medlink_protocol::constants::{
    CLOSE_ABNORMAL, CLOSE_NO_STATUS, CLOSE_NORMAL, MAX_FRAME_SIZE,
};

use crate::transport::Inbound;

/// Reads frames from the WebSocket until it closes.
///
/// With an `idle_timeout`, a connection that delivers nothing at all for
/// that long is treated as dead. Any frame resets the deadline. The final
/// event is always [`Inbound::Closed`]; the shared `cancel` token is fired
/// on exit so the write pump stops too.
///
/// Cancellation from the write side (a failed write, or a close the peer
/// never answered) carries no close code and is reported as abnormal.
pub(crate) async fn read_pump<S>(
    mut read: S,
    events: mpsc::Sender<Inbound>,
    control: mpsc::Sender<tungstenite::Message>,
    idle_timeout: Option<Duration>,
    cancel: CancellationToken,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    let idle = idle_timeout.unwrap_or(Duration::MAX);
    let deadline = tokio::time::sleep(idle);
    tokio::pin!(deadline);

    let code = loop {
        tokio::select! {
            _ = cancel.cancelled() => break CLOSE_ABNORMAL,

            () = &mut deadline, if idle_timeout.is_some() => {
                warn!(timeout = ?idle, "connection idle, closing");
                break CLOSE_ABNORMAL;
            }

            msg = read.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        break CLOSE_ABNORMAL;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break CLOSE_ABNORMAL;
                    }
                };

                if idle_timeout.is_some() {
                    deadline.as_mut().reset(tokio::time::Instant::now() + idle);
                }

                match msg {
                    tungstenite::Message::Text(text) => {
                        if text.len() > MAX_FRAME_SIZE {
                            warn!(len = text.len(), "frame too large, dropping");
                            continue;
                        }
                        if events.send(Inbound::Text(text.to_string())).await.is_err() {
                            break CLOSE_NORMAL;
                        }
                    }
                    tungstenite::Message::Ping(data) => {
                        trace!("received ping, sending pong");
                        let _ = control.send(tungstenite::Message::Pong(data)).await;
                    }
                    tungstenite::Message::Close(frame) => {
                        let code = frame.map_or(CLOSE_NO_STATUS, |f| u16::from(f.code));
                        debug!(code, "received close frame");
                        break code;
                    }
                    _ => {} // Pong, Binary
                }
            }
        }
    };

    let _ = events.send(Inbound::Closed { code }).await;
    cancel.cancel();
}
