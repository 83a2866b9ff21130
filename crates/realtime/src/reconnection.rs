//! Reconnect timers.
//!
//! A timer is a spawned sleep guarded by a [`CancellationToken`] stored in
//! the channel's registry entry. Replacing or cancelling the entry's token
//! disarms the timer; firing consumes it.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::channel::ChannelId;
use crate::manager::ChannelManager;
use crate::registry::ChannelEntry;

/// Arms a reconnect timer on `entry`, replacing (and cancelling) any
/// previous one. Must be called with the registry lock held.
pub(crate) fn schedule(
    manager: &ChannelManager,
    entry: &mut ChannelEntry,
    channel: &ChannelId,
    delay: Duration,
) {
    entry.cancel_reconnect();
    let token = CancellationToken::new();
    entry.reconnect_timer = Some(token.clone());
    tokio::spawn(reconnect_after(
        manager.clone(),
        channel.clone(),
        delay,
        token,
    ));
}

/// Waits out `delay`, then asks the manager to reconnect unless the timer
/// was cancelled meanwhile.
async fn reconnect_after(
    manager: ChannelManager,
    channel: ChannelId,
    delay: Duration,
    cancel: CancellationToken,
) {
    tokio::select! {
        _ = cancel.cancelled() => {
            debug!(channel = %channel, "reconnect cancelled");
            return;
        }
        _ = tokio::time::sleep(delay) => {}
    }

    manager.fire_reconnect(&channel, &cancel);
}
