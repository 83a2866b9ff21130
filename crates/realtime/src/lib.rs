//! Shared real-time channels for the staff portal.
//!
//! One long-lived, authenticated WebSocket per logical channel, shared by
//! every consumer that subscribes to it. Connections are opened on the
//! first subscription, kept alive with heartbeats, re-established with
//! exponential backoff after abnormal closes, and closed cleanly when the
//! last consumer unsubscribes.

pub mod channel;
pub mod listeners;
pub mod manager;
mod pumps;
pub(crate) mod reconnection;
pub(crate) mod registry;
pub mod subscription;
pub mod transport;
pub mod types;
pub mod ws_client;

#[cfg(test)]
pub(crate) mod testing;

pub use channel::{ChannelError, ChannelId};
pub use listeners::{Listener, ListenerSet, SubscriptionId};
pub use manager::{ChannelManager, MIN_HEARTBEAT_INTERVAL, SendError};
pub use subscription::Subscription;
pub use transport::{Connector, Inbound, Link, LinkError, Outbound};
pub use types::{ConnectState, IllegalTransition, ManagerConfig, ReconnectConfig, Transition};
pub use ws_client::WsConnector;
