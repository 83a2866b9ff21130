//! Per-channel shared state.
//!
//! Only the manager touches the registry, always under its lock and never
//! across an `.await`.

use std::collections::HashMap;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use medlink_protocol::Frame;

use crate::channel::ChannelId;
use crate::listeners::{Listener, ListenerSet, SubscriptionId};
use crate::transport::Outbound;
use crate::types::ConnectState;

/// Everything known about one channel.
pub(crate) struct ChannelEntry {
    pub(crate) state: ConnectState,
    /// Identifies the current connection attempt. Events carrying an older
    /// generation belong to a superseded connection and are ignored.
    pub(crate) generation: u64,
    /// Write side of the open connection.
    pub(crate) sender: Option<mpsc::Sender<Outbound>>,
    pub(crate) message_listeners: ListenerSet<Frame>,
    pub(crate) state_listeners: ListenerSet<bool>,
    pub(crate) reconnect_attempts: u32,
    /// Set when a connect was skipped because a credential refresh was in
    /// flight; the channel is retried once that refresh succeeds.
    pub(crate) waiting_for_refresh: bool,
    pub(crate) reconnect_timer: Option<CancellationToken>,
    pub(crate) heartbeat_timer: Option<CancellationToken>,
    pub(crate) open_tx: watch::Sender<bool>,
}

impl ChannelEntry {
    fn new() -> Self {
        Self {
            state: ConnectState::Idle,
            generation: 0,
            sender: None,
            message_listeners: ListenerSet::new(),
            state_listeners: ListenerSet::new(),
            reconnect_attempts: 0,
            waiting_for_refresh: false,
            reconnect_timer: None,
            heartbeat_timer: None,
            open_tx: watch::Sender::new(false),
        }
    }

    /// Moves to `state` and publishes the open flag.
    pub(crate) fn set_state(&mut self, state: ConnectState) {
        self.state = state;
        let open = state == ConnectState::Open;
        self.open_tx.send_if_modified(|current| {
            let changed = *current != open;
            *current = open;
            changed
        });
    }

    /// `true` while a reconnect timer is armed and has not fired.
    pub(crate) fn has_pending_reconnect(&self) -> bool {
        self.reconnect_timer
            .as_ref()
            .is_some_and(|t| !t.is_cancelled())
    }

    pub(crate) fn cancel_reconnect(&mut self) {
        if let Some(token) = self.reconnect_timer.take() {
            token.cancel();
        }
    }

    pub(crate) fn cancel_heartbeat(&mut self) {
        if let Some(token) = self.heartbeat_timer.take() {
            token.cancel();
        }
    }

    /// No listeners of either kind remain.
    pub(crate) fn is_unobserved(&self) -> bool {
        self.message_listeners.is_empty() && self.state_listeners.is_empty()
    }
}

/// Map from channel to its entry. Entries are created lazily and kept for
/// reuse after their connection closes.
#[derive(Default)]
pub(crate) struct Registry {
    entries: HashMap<ChannelId, ChannelEntry>,
}

impl Registry {
    pub(crate) fn get_or_create(&mut self, id: &ChannelId) -> &mut ChannelEntry {
        self.entries
            .entry(id.clone())
            .or_insert_with(ChannelEntry::new)
    }

    pub(crate) fn get(&self, id: &ChannelId) -> Option<&ChannelEntry> {
        self.entries.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &ChannelId) -> Option<&mut ChannelEntry> {
        self.entries.get_mut(id)
    }

    pub(crate) fn channel_ids(&self) -> Vec<ChannelId> {
        self.entries.keys().cloned().collect()
    }

    pub(crate) fn add_message_listener(
        &mut self,
        id: &ChannelId,
        sub: SubscriptionId,
        listener: Listener<Frame>,
    ) {
        self.get_or_create(id).message_listeners.insert(sub, listener);
    }

    pub(crate) fn remove_message_listener(&mut self, id: &ChannelId, sub: SubscriptionId) -> bool {
        self.get_mut(id)
            .is_some_and(|e| e.message_listeners.remove(sub))
    }

    pub(crate) fn add_state_listener(
        &mut self,
        id: &ChannelId,
        sub: SubscriptionId,
        listener: Listener<bool>,
    ) {
        self.get_or_create(id).state_listeners.insert(sub, listener);
    }

    pub(crate) fn remove_state_listener(&mut self, id: &ChannelId, sub: SubscriptionId) -> bool {
        self.get_mut(id)
            .is_some_and(|e| e.state_listeners.remove(sub))
    }

    /// `true` when the channel has no listeners of either kind.
    pub(crate) fn is_unobserved(&self, id: &ChannelId) -> bool {
        self.get(id).is_none_or(ChannelEntry::is_unobserved)
    }
}
