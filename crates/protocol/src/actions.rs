use serde::{Deserialize, Serialize};

/// Outbound actions a client writes to a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientAction {
    /// Lightweight keepalive sent on the heartbeat timer.
    Ping,

    /// Posts a message into a conversation on the messaging channel.
    SendMessage { conversation_id: i64, body: String },
}

impl ClientAction {
    /// Wire form of the keepalive frame.
    pub fn ping_json() -> String {
        r#"{"action":"ping"}"#.to_string()
    }
}
