//! Application-level keepalive for an open channel.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use medlink_protocol::ClientAction;

use crate::transport::Outbound;

/// Sends a `{"action":"ping"}` frame every `period` until cancelled or the
/// connection's queue goes away.
pub(crate) async fn heartbeat_pump(
    sender: mpsc::Sender<Outbound>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.tick().await; // Skip immediate first tick.

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                trace!("heartbeat");
                if sender.send(Outbound::Text(ClientAction::ping_json())).await.is_err() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn pings_once_per_period() {
        let (tx, mut rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        let start = tokio::time::Instant::now();

        tokio::spawn(heartbeat_pump(tx, Duration::from_secs(30), cancel.clone()));

        let first = rx.recv().await.unwrap();
        assert_eq!(first, Outbound::Text(r#"{"action":"ping"}"#.into()));
        assert_eq!(start.elapsed(), Duration::from_secs(30));

        rx.recv().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(60));

        cancel.cancel();
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn stops_when_queue_closes() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = tokio::spawn(heartbeat_pump(
            tx,
            Duration::from_millis(10),
            CancellationToken::new(),
        ));
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("should stop")
            .expect("no panic");
    }
}
