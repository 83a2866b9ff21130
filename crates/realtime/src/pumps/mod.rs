//! Background tasks that drive one WebSocket connection.

pub(crate) mod heartbeat;
pub(crate) mod read;
pub(crate) mod write;
