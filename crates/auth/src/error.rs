//! Error types for credential handling.

/// Errors from a credential store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from the one-shot refresh exchange.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("refresh endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("refresh endpoint returned an empty access credential")]
    EmptyAccess,
}

/// Errors surfaced by the credential refresher.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("no access credential stored")]
    NoCredential,

    #[error("no refresh credential stored")]
    NoRefreshCredential,

    #[error("a credential refresh is already in flight")]
    RefreshInFlight,

    #[error("credential refresh failed: {0}")]
    RefreshFailed(#[from] ExchangeError),

    #[error("credential store error: {0}")]
    Store(#[from] StoreError),
}
