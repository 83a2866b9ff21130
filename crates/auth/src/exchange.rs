//! One-shot refresh credential exchange.
//!
//! Async HTTP client using `reqwest`: POST `{"refresh": ...}`, receive
//! `{"access": ..., "refresh": ...}` where `refresh` is only present when
//! the server rotates refresh credentials.

use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::ExchangeError;

/// Timeout for the whole refresh round trip.
const REFRESH_TIMEOUT: Duration = Duration::from_secs(15);

/// Result of a successful exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchanged {
    pub access: String,
    /// Rotated refresh credential, if the server issued one.
    pub refresh: Option<String>,
}

/// Exchanges a refresh credential for a new access credential.
pub trait TokenExchange: Send + Sync {
    fn exchange<'a>(&'a self, refresh_token: &'a str)
    -> BoxFuture<'a, Result<Exchanged, ExchangeError>>;
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

#[derive(Deserialize)]
struct RefreshResponse {
    access: String,
    #[serde(default)]
    refresh: Option<String>,
}

/// [`TokenExchange`] against the portal's REST refresh endpoint.
pub struct HttpTokenExchange {
    http: reqwest::Client,
    url: String,
}

impl HttpTokenExchange {
    pub fn new(url: impl Into<String>) -> Result<Self, ExchangeError> {
        let http = reqwest::Client::builder()
            .timeout(REFRESH_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post(&self, refresh_token: &str) -> Result<Exchanged, ExchangeError> {
        let resp = self
            .http
            .post(&self.url)
            .json(&RefreshRequest {
                refresh: refresh_token,
            })
            .send()
            .await?;
        let status = resp.status();

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ExchangeError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: RefreshResponse = resp.json().await?;
        if body.access.is_empty() {
            return Err(ExchangeError::EmptyAccess);
        }
        Ok(Exchanged {
            access: body.access,
            refresh: body.refresh.filter(|r| !r.is_empty()),
        })
    }
}

impl TokenExchange for HttpTokenExchange {
    fn exchange<'a>(
        &'a self,
        refresh_token: &'a str,
    ) -> BoxFuture<'a, Result<Exchanged, ExchangeError>> {
        Box::pin(self.post(refresh_token))
    }
}
