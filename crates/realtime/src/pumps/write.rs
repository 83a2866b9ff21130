//! WebSocket write pump: serialises outbound frames.

use std::time::Duration;

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::transport::Outbound;

use tungstenite::protocol::CloseFrame;
use tungstenite::protocol::frame::coding::CloseCode;

/// How long to wait for the peer to answer our close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Writes frames to the WebSocket.
///
/// `control` carries protocol replies (pongs) from the read pump. An
/// [`Outbound::Close`] is written as a close frame and ends the pump. After
/// closing, the pump waits briefly for the read side to see the peer's
/// answer, then cancels the connection.
pub(crate) async fn write_pump<S>(
    mut write: S,
    mut outbound: mpsc::Receiver<Outbound>,
    mut control: mpsc::Receiver<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => return,
            Some(m) = control.recv() => m,
            msg = outbound.recv() => match msg {
                Some(Outbound::Text(text)) => tungstenite::Message::Text(text.into()),
                Some(Outbound::Close(code)) => {
                    debug!(code, "closing connection");
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: "".into(),
                    };
                    let _ = write.send(tungstenite::Message::Close(Some(frame))).await;
                    break;
                }
                None => {
                    let _ = write.send(tungstenite::Message::Close(None)).await;
                    break;
                }
            },
        };

        if let Err(e) = write.send(msg).await {
            error!("WebSocket write error: {e}");
            break;
        }
    }

    let _ = tokio::time::timeout(CLOSE_GRACE, cancel.cancelled()).await;
    cancel.cancel();
}
