//! Credential refresher with a process-wide single-flight guard.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use medlink_protocol::constants::{ACCESS_TOKEN_KEY, REFRESH_SAFETY_WINDOW, REFRESH_TOKEN_KEY};

use crate::error::AuthError;
use crate::exchange::TokenExchange;
use crate::store::CredentialStore;
use crate::token;

/// Decides when the access credential needs refreshing and performs the
/// exchange.
///
/// Only one exchange may be in flight at a time. The busy flag is taken
/// synchronously by [`try_begin`](Self::try_begin) so a caller can claim it
/// before yielding to the runtime.
pub struct CredentialRefresher {
    store: Arc<dyn CredentialStore>,
    exchange: Arc<dyn TokenExchange>,
    window: Duration,
    busy: Arc<AtomicBool>,
}

impl CredentialRefresher {
    pub fn new(store: Arc<dyn CredentialStore>, exchange: Arc<dyn TokenExchange>) -> Self {
        Self {
            store,
            exchange,
            window: REFRESH_SAFETY_WINDOW,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Overrides the safety window (default [`REFRESH_SAFETY_WINDOW`]).
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Reads the current access credential from the store.
    pub fn access_token(&self) -> Option<String> {
        self.store.get(ACCESS_TOKEN_KEY).filter(|t| !t.is_empty())
    }

    pub fn is_expiring_soon(&self, access_token: &str) -> bool {
        token::is_expiring_soon(access_token, self.window, Utc::now())
    }

    /// Returns `true` while an exchange is in flight.
    pub fn is_refreshing(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Claims the busy flag. Returns `None` if another refresh holds it.
    pub fn try_begin(&self) -> Option<RefreshPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(RefreshPermit {
            store: self.store.clone(),
            exchange: self.exchange.clone(),
            busy: self.busy.clone(),
        })
    }

    /// Exchanges the stored refresh credential for a new access credential.
    pub async fn refresh(&self) -> Result<String, AuthError> {
        let permit = self.try_begin().ok_or(AuthError::RefreshInFlight)?;
        permit.exchange().await
    }

    /// Returns a usable access credential, refreshing it first if needed.
    pub async fn valid_access_token(&self) -> Result<String, AuthError> {
        let token = self.access_token().ok_or(AuthError::NoCredential)?;
        if !self.is_expiring_soon(&token) {
            return Ok(token);
        }
        self.refresh().await
    }
}

/// Proof that the caller owns the single refresh slot.
///
/// Dropping the permit releases the slot, whether or not the exchange ran.
pub struct RefreshPermit {
    store: Arc<dyn CredentialStore>,
    exchange: Arc<dyn TokenExchange>,
    busy: Arc<AtomicBool>,
}

impl RefreshPermit {
    /// Runs the exchange and persists the result on success only.
    pub async fn exchange(self) -> Result<String, AuthError> {
        let refresh = self
            .store
            .get(REFRESH_TOKEN_KEY)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::NoRefreshCredential)?;

        debug!("exchanging refresh credential");
        let exchanged = match self.exchange.exchange(&refresh).await {
            Ok(e) => e,
            Err(e) => {
                warn!("credential refresh failed: {e}");
                return Err(e.into());
            }
        };

        let mut entries = vec![(ACCESS_TOKEN_KEY, exchanged.access.as_str())];
        if let Some(rotated) = exchanged.refresh.as_deref() {
            entries.push((REFRESH_TOKEN_KEY, rotated));
        }
        self.store.set_many(&entries)?;

        info!(rotated = exchanged.refresh.is_some(), "access credential refreshed");
        Ok(exchanged.access)
    }
}

impl Drop for RefreshPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
