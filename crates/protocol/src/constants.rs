use std::time::Duration;

/// Close code sent on explicit teardown and page unload.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code for an endpoint going away (server restart, navigation).
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Close code reported when a close frame carried no status.
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Close code reported when the stream ended without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// How often a keepalive frame is sent on an open channel.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Delay before the first reconnection attempt.
pub const RECONNECT_BASE_DELAY: Duration = Duration::from_secs(3);

/// Cap on the delay between reconnection attempts.
pub const RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);

/// An access credential expiring within this window is refreshed before use.
pub const REFRESH_SAFETY_WINDOW: Duration = Duration::from_secs(60);

/// Credential store key holding the short-lived access credential.
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Credential store key holding the long-lived refresh credential.
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Query parameter carrying the access credential on the streaming endpoint.
pub const CREDENTIAL_QUERY_PARAM: &str = "token";

/// Maximum accepted inbound text frame size in bytes (1 MB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Returns `true` only for an expected, explicit closure.
///
/// Everything else (going away, no status, abnormal, application codes)
/// is treated as a dropped connection and feeds reconnection.
pub fn is_normal_closure(code: u16) -> bool {
    code == CLOSE_NORMAL
}
