//! Per-consumer subscription handle.

use serde::Serialize;

use crate::channel::ChannelId;
use crate::listeners::SubscriptionId;
use crate::manager::ChannelManager;

/// Keeps a consumer's callbacks registered on a channel.
///
/// Unsubscribes when [`unsubscribe`](Self::unsubscribe) is called or the
/// handle is dropped. The last handle to go closes the connection.
pub struct Subscription {
    manager: ChannelManager,
    channel: ChannelId,
    id: SubscriptionId,
    active: bool,
}

impl Subscription {
    pub(crate) fn new(manager: ChannelManager, channel: ChannelId, id: SubscriptionId) -> Self {
        Self {
            manager,
            channel,
            id,
            active: true,
        }
    }

    pub fn channel(&self) -> &ChannelId {
        &self.channel
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn is_open(&self) -> bool {
        self.manager.is_open(&self.channel)
    }

    /// Sends on this subscription's channel. See [`ChannelManager::send`].
    pub fn send<T: Serialize + ?Sized>(&self, payload: &T) -> bool {
        self.manager.send(&self.channel, payload)
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if std::mem::take(&mut self.active) {
            self.manager.release(&self.channel, self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel.as_str())
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Harness, settle};
    use crate::transport::Outbound;
    use medlink_protocol::Frame;

    #[tokio::test(start_paused = true)]
    async fn unsubscribe_is_idempotent_with_drop() {
        let mut h = Harness::fresh();
        let id = h.manager.channel("wss://host/ws/feed").unwrap();
        let sub = h.manager.subscribe(&id, |_: &Frame| {}, |_| {});
        let keep = h.manager.subscribe(&id, |_: &Frame| {}, |_| {});
        let mut server = h.next_attempt().await.accept();
        settle().await;

        assert!(sub.is_open());
        assert_eq!(sub.channel(), &id);
        sub.unsubscribe();
        settle().await;
        assert!(keep.is_open());

        assert!(keep.send(&serde_json::json!({"action": "ping"})));
        assert_eq!(
            server.from_client.recv().await,
            Some(Outbound::Text(r#"{"action":"ping"}"#.into()))
        );
    }
}
