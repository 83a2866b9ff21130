//! Credential handling for medlink channels.
//!
//! Reads access and refresh credentials from a key/value store, decides
//! whether an access credential is about to expire, and exchanges the
//! refresh credential for a new access credential with at most one
//! exchange in flight per process.

pub mod error;
pub mod exchange;
pub mod refresher;
pub mod store;
pub mod token;

pub use error::{AuthError, ExchangeError, StoreError};
pub use exchange::{Exchanged, HttpTokenExchange, TokenExchange};
pub use refresher::{CredentialRefresher, RefreshPermit};
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use token::{TokenInfo, inspect_token, is_expiring_soon};
