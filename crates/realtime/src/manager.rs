//! Channel manager: connection lifecycle and the subscription façade.
//!
//! One [`ChannelManager`] is created at startup and cloned into every
//! consumer. It owns the registry of channels and is the only thing that
//! mutates it. Every check-then-act on an entry happens under the registry
//! lock without crossing an `.await`, so concurrent subscribers can never
//! open two connections for one channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use medlink_auth::{CredentialRefresher, RefreshPermit};
use medlink_protocol::constants::{CLOSE_ABNORMAL, CLOSE_NORMAL};
use medlink_protocol::{Frame, is_normal_closure};

use crate::channel::{ChannelError, ChannelId};
use crate::listeners::{self, Listener, SubscriptionId};
use crate::pumps::heartbeat::heartbeat_pump;
use crate::reconnection;
use crate::registry::{ChannelEntry, Registry};
use crate::subscription::Subscription;
use crate::transport::{Connector, Inbound, Link, Outbound};
use crate::types::{ConnectState, ManagerConfig, Transition};

/// Shortest keepalive period a manager will run with.
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// Errors from [`ChannelManager::try_send`].
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("channel is not open")]
    NotOpen,

    #[error("failed to serialize payload: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("outbound queue is full")]
    Full,
}

/// Shared, self-healing connections keyed by [`ChannelId`].
///
/// Cloning is cheap; all clones share the same channels.
#[derive(Clone)]
pub struct ChannelManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: ManagerConfig,
    connector: Arc<dyn Connector>,
    refresher: Arc<CredentialRefresher>,
    registry: Mutex<Registry>,
    generations: AtomicU64,
}

/// Credential for a connection attempt that has already claimed its slot.
enum Credential {
    Ready(String),
    Refresh(RefreshPermit),
}

/// A connection attempt decided under the lock, to be run outside it.
struct PendingConnect {
    channel: ChannelId,
    generation: u64,
    credential: Credential,
}

impl ChannelManager {
    /// A zero `heartbeat_interval` is raised to [`MIN_HEARTBEAT_INTERVAL`].
    pub fn new(
        mut config: ManagerConfig,
        connector: Arc<dyn Connector>,
        refresher: Arc<CredentialRefresher>,
    ) -> Self {
        config.heartbeat_interval = config.heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL);
        Self {
            inner: Arc::new(Inner {
                config,
                connector,
                refresher,
                registry: Mutex::new(Registry::default()),
                generations: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    pub fn refresher(&self) -> &Arc<CredentialRefresher> {
        &self.inner.refresher
    }

    /// Parses `raw` into a [`ChannelId`] using this manager's credential
    /// parameter.
    pub fn channel(&self, raw: &str) -> Result<ChannelId, ChannelError> {
        ChannelId::parse(raw, &self.inner.config.credential_param)
    }

    // -----------------------------------------------------------------------
    // Subscription façade
    // -----------------------------------------------------------------------

    /// Registers both callbacks and makes sure the channel is connecting.
    ///
    /// If the channel is already open (or closed awaiting reconnect), the
    /// state callback is invoked with that state before this returns.
    pub fn subscribe<M, S>(&self, channel: &ChannelId, on_message: M, on_state: S) -> Subscription
    where
        M: Fn(&Frame) + Send + Sync + 'static,
        S: Fn(bool) + Send + Sync + 'static,
    {
        let sub = SubscriptionId::new();
        let state_listener: Listener<bool> = Arc::new(move |open: &bool| on_state(*open));

        let (known, pending) = {
            let mut reg = self.registry();
            reg.add_message_listener(channel, sub, Arc::new(on_message));
            reg.add_state_listener(channel, sub, state_listener.clone());
            let known = match reg.get(channel).map(|e| e.state) {
                Some(ConnectState::Open) => Some(true),
                Some(ConnectState::Closed) => Some(false),
                _ => None,
            };
            (known, self.ensure_locked(&mut reg, channel))
        };
        debug!(channel = %channel, subscription = %sub, "subscribed");

        if let Some(open) = known {
            state_listener(&open);
        }
        if let Some(pending) = pending {
            self.spawn_connect(pending);
        }
        Subscription::new(self.clone(), channel.clone(), sub)
    }

    /// Removes a subscription's listeners and tears the channel down when
    /// nobody is left listening.
    pub(crate) fn release(&self, channel: &ChannelId, sub: SubscriptionId) {
        let notify = {
            let mut reg = self.registry();
            let removed_message = reg.remove_message_listener(channel, sub);
            let removed_state = reg.remove_state_listener(channel, sub);
            if !(removed_message || removed_state) || !reg.is_unobserved(channel) {
                return;
            }
            debug!(channel = %channel, "last subscriber left");
            self.teardown_locked(&mut reg, channel)
        };
        listeners::notify(&notify, &false);
    }

    /// Serializes `payload` and queues it on the open connection.
    pub fn try_send<T: Serialize + ?Sized>(
        &self,
        channel: &ChannelId,
        payload: &T,
    ) -> Result<(), SendError> {
        let sender = self
            .registry()
            .get(channel)
            .filter(|e| e.state == ConnectState::Open)
            .and_then(|e| e.sender.clone())
            .ok_or(SendError::NotOpen)?;
        let text = serde_json::to_string(payload)?;
        sender
            .try_send(Outbound::Text(text))
            .map_err(|e| match e {
                TrySendError::Full(_) => SendError::Full,
                TrySendError::Closed(_) => SendError::NotOpen,
            })
    }

    /// Like [`try_send`](Self::try_send) but only reports whether the payload
    /// was queued. Nothing is buffered for a channel that is not open.
    pub fn send<T: Serialize + ?Sized>(&self, channel: &ChannelId, payload: &T) -> bool {
        match self.try_send(channel, payload) {
            Ok(()) => true,
            Err(e) => {
                debug!(channel = %channel, "send dropped: {e}");
                false
            }
        }
    }

    pub fn is_open(&self, channel: &ChannelId) -> bool {
        self.state(channel) == ConnectState::Open
    }

    pub fn state(&self, channel: &ChannelId) -> ConnectState {
        self.registry()
            .get(channel)
            .map_or(ConnectState::Idle, |e| e.state)
    }

    /// Observable open flag for `channel`.
    pub fn watch_open(&self, channel: &ChannelId) -> watch::Receiver<bool> {
        self.registry().get_or_create(channel).open_tx.subscribe()
    }

    pub fn reconnect_attempts(&self, channel: &ChannelId) -> u32 {
        self.registry()
            .get(channel)
            .map_or(0, |e| e.reconnect_attempts)
    }

    pub fn has_pending_reconnect(&self, channel: &ChannelId) -> bool {
        self.registry()
            .get(channel)
            .is_some_and(ChannelEntry::has_pending_reconnect)
    }

    // -----------------------------------------------------------------------
    // Lifecycle controller
    // -----------------------------------------------------------------------

    /// Starts connecting `channel` unless it is already connecting or open.
    pub fn ensure_connected(&self, channel: &ChannelId) {
        let pending = self.ensure_locked(&mut self.registry(), channel);
        if let Some(pending) = pending {
            self.spawn_connect(pending);
        }
    }

    /// Cancels timers and closes the connection with a normal closure.
    /// Listeners stay registered.
    pub fn teardown(&self, channel: &ChannelId) {
        let notify = self.teardown_locked(&mut self.registry(), channel);
        listeners::notify(&notify, &false);
    }

    /// Closes every channel with a normal closure.
    pub fn shutdown(&self) {
        let notify: Vec<Listener<bool>> = {
            let mut reg = self.registry();
            let channels = reg.channel_ids();
            channels
                .iter()
                .flat_map(|id| self.teardown_locked(&mut reg, id))
                .collect()
        };
        info!("all channels closed");
        listeners::notify(&notify, &false);
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn next_generation(&self) -> u64 {
        self.inner.generations.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Decides under the lock whether to connect. Claims the refresh slot
    /// when the credential needs refreshing, so a second caller sees the
    /// refresh in flight and backs off.
    fn ensure_locked(&self, reg: &mut Registry, channel: &ChannelId) -> Option<PendingConnect> {
        let entry = reg.get_or_create(channel);
        if entry.state.is_active() {
            trace!(channel = %channel, state = ?entry.state, "already connecting or open");
            return None;
        }

        let refresher = &self.inner.refresher;
        if refresher.is_refreshing() {
            self.defer_for_refresh(entry, channel);
            return None;
        }
        let Some(token) = refresher.access_token() else {
            debug!(channel = %channel, "no access credential, not connecting");
            return None;
        };
        let credential = if refresher.is_expiring_soon(&token) {
            match refresher.try_begin() {
                Some(permit) => Credential::Refresh(permit),
                None => {
                    self.defer_for_refresh(entry, channel);
                    return None;
                }
            }
        } else {
            Credential::Ready(token)
        };

        if !apply(entry, channel, Transition::Connect) {
            return None;
        }
        entry.waiting_for_refresh = false;
        entry.cancel_reconnect();
        entry.generation = self.next_generation();

        Some(PendingConnect {
            channel: channel.clone(),
            generation: entry.generation,
            credential,
        })
    }

    /// Parks a channel behind a refresh someone else is running. The
    /// backoff timer covers refreshes that fail or never resume us.
    fn defer_for_refresh(&self, entry: &mut ChannelEntry, channel: &ChannelId) {
        debug!(channel = %channel, "credential refresh in flight, deferring connect");
        entry.waiting_for_refresh = true;
        if !entry.has_pending_reconnect() && !entry.is_unobserved() {
            self.retry_later(entry, channel);
        }
    }

    /// Counts a failed attempt and arms the backoff timer for the next one.
    fn retry_later(&self, entry: &mut ChannelEntry, channel: &ChannelId) -> Duration {
        entry.reconnect_attempts = entry.reconnect_attempts.saturating_add(1);
        let delay = self
            .inner
            .config
            .reconnect
            .delay_for_attempt(entry.reconnect_attempts);
        reconnection::schedule(self, entry, channel, delay);
        delay
    }

    fn spawn_connect(&self, pending: PendingConnect) {
        tokio::spawn(self.clone().connect(pending));
    }

    async fn connect(self, pending: PendingConnect) {
        let PendingConnect {
            channel,
            generation,
            credential,
        } = pending;

        let token = match credential {
            Credential::Ready(token) => token,
            Credential::Refresh(permit) => match permit.exchange().await {
                Ok(token) => {
                    self.resume_waiting();
                    token
                }
                Err(e) => {
                    warn!(channel = %channel, "not connecting: {e}");
                    self.abandon(&channel, generation);
                    return;
                }
            },
        };

        if !self.is_current(&channel, generation) {
            debug!(channel = %channel, "connect superseded before opening");
            return;
        }

        let target = channel.target(&self.inner.config.credential_param, &token);
        debug!(channel = %channel, generation, "opening connection");
        let opened = self.inner.connector.connect(target.into()).await;
        match opened {
            Ok(link) => self.run_session(channel, generation, link).await,
            Err(e) => {
                warn!(channel = %channel, error = %e, "connection failed");
                self.handle_close(&channel, generation, CLOSE_ABNORMAL);
            }
        }
    }

    /// Drives an open link until it closes.
    async fn run_session(self, channel: ChannelId, generation: u64, link: Link) {
        let Link {
            sender,
            mut events,
        } = link;

        let opened = {
            let mut reg = self.registry();
            match reg.get_mut(&channel) {
                Some(entry) if entry.generation == generation => {
                    apply(entry, &channel, Transition::Opened);
                    entry.reconnect_attempts = 0;
                    entry.cancel_heartbeat();
                    let heartbeat = CancellationToken::new();
                    entry.heartbeat_timer = Some(heartbeat.clone());
                    tokio::spawn(heartbeat_pump(
                        sender.clone(),
                        self.inner.config.heartbeat_interval,
                        heartbeat,
                    ));
                    entry.sender = Some(sender.clone());
                    Some(entry.state_listeners.snapshot())
                }
                _ => None,
            }
        };
        let Some(notify) = opened else {
            debug!(channel = %channel, "connection superseded, closing");
            close_link(sender);
            return;
        };

        info!(channel = %channel, "channel open");
        listeners::notify(&notify, &true);

        while let Some(event) = events.recv().await {
            match event {
                Inbound::Text(text) => self.dispatch(&channel, generation, &text),
                Inbound::Closed { code } => {
                    self.handle_close(&channel, generation, code);
                    return;
                }
            }
        }
        self.handle_close(&channel, generation, CLOSE_ABNORMAL);
    }

    fn dispatch(&self, channel: &ChannelId, generation: u64, text: &str) {
        let frame = match Frame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(channel = %channel, "dropping malformed frame: {e}");
                return;
            }
        };

        let notify = match self.registry().get(channel) {
            Some(entry) if entry.generation == generation => entry.message_listeners.snapshot(),
            _ => return,
        };
        trace!(channel = %channel, kind = frame.kind(), "frame");
        listeners::notify(&notify, &frame);
    }

    fn handle_close(&self, channel: &ChannelId, generation: u64, code: u16) {
        let notify = {
            let mut reg = self.registry();
            let Some(entry) = reg.get_mut(channel) else {
                return;
            };
            if entry.generation != generation {
                debug!(channel = %channel, code, "ignoring close of superseded connection");
                return;
            }

            entry.cancel_heartbeat();
            entry.sender = None;
            if !apply(entry, channel, Transition::Dropped) {
                return;
            }

            if is_normal_closure(code) {
                entry.reconnect_attempts = 0;
                apply(entry, channel, Transition::Teardown);
                info!(channel = %channel, code, "channel closed");
            } else {
                let delay = self.retry_later(entry, channel);
                info!(
                    channel = %channel,
                    code,
                    attempt = entry.reconnect_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "connection lost, reconnecting"
                );
            }
            entry.state_listeners.snapshot()
        };
        listeners::notify(&notify, &false);
    }

    /// Called by a reconnect timer when it elapses.
    pub(crate) fn fire_reconnect(&self, channel: &ChannelId, timer: &CancellationToken) {
        let pending = {
            let mut reg = self.registry();
            if timer.is_cancelled() {
                return;
            }
            timer.cancel();
            let Some(entry) = reg.get_mut(channel) else {
                return;
            };
            entry.reconnect_timer = None;
            if entry.is_unobserved() {
                return;
            }
            self.ensure_locked(&mut reg, channel)
        };
        if let Some(pending) = pending {
            self.spawn_connect(pending);
        }
    }

    /// Gives up a connect whose credential refresh failed. A channel that
    /// still has listeners tries again after the backoff delay.
    fn abandon(&self, channel: &ChannelId, generation: u64) {
        let mut reg = self.registry();
        let Some(entry) = reg.get_mut(channel) else {
            return;
        };
        if entry.generation != generation || !apply(entry, channel, Transition::Abandon) {
            return;
        }
        if !entry.is_unobserved() {
            let delay = self.retry_later(entry, channel);
            info!(
                channel = %channel,
                attempt = entry.reconnect_attempts,
                delay_ms = delay.as_millis() as u64,
                "credential refresh failed, retrying"
            );
        }
    }

    /// Re-ensures channels that were skipped while a refresh was in flight.
    fn resume_waiting(&self) {
        let pending: Vec<PendingConnect> = {
            let mut reg = self.registry();
            let waiting: Vec<ChannelId> = reg
                .channel_ids()
                .into_iter()
                .filter(|id| {
                    reg.get(id)
                        .is_some_and(|e| e.waiting_for_refresh && !e.is_unobserved())
                })
                .collect();
            waiting
                .iter()
                .filter_map(|id| self.ensure_locked(&mut reg, id))
                .collect()
        };
        for p in pending {
            self.spawn_connect(p);
        }
    }

    fn is_current(&self, channel: &ChannelId, generation: u64) -> bool {
        self.registry()
            .get(channel)
            .is_some_and(|e| e.generation == generation)
    }

    /// Returns the state listeners to notify if the channel was open.
    fn teardown_locked(&self, reg: &mut Registry, channel: &ChannelId) -> Vec<Listener<bool>> {
        let Some(entry) = reg.get_mut(channel) else {
            return Vec::new();
        };
        entry.cancel_reconnect();
        entry.cancel_heartbeat();
        entry.waiting_for_refresh = false;
        if let Some(sender) = entry.sender.take() {
            close_link(sender);
        }

        let was_open = entry.state == ConnectState::Open;
        entry.generation = self.next_generation();
        entry.reconnect_attempts = 0;
        apply(entry, channel, Transition::Teardown);
        debug!(channel = %channel, was_open, "channel torn down");

        if was_open {
            entry.state_listeners.snapshot()
        } else {
            Vec::new()
        }
    }
}

/// Applies a transition, logging and refusing illegal ones.
fn apply(entry: &mut ChannelEntry, channel: &ChannelId, event: Transition) -> bool {
    match entry.state.transition(event) {
        Ok(next) => {
            entry.set_state(next);
            true
        }
        Err(e) => {
            warn!(channel = %channel, "{e}");
            false
        }
    }
}

/// Asks a link to close normally.
fn close_link(sender: mpsc::Sender<Outbound>) {
    match sender.try_send(Outbound::Close(CLOSE_NORMAL)) {
        Ok(()) | Err(TrySendError::Closed(_)) => {}
        Err(TrySendError::Full(msg)) => {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let _ = sender.send(msg).await;
                });
            }
        }
    }
}
