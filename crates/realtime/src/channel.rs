//! Normalized channel identifiers.

use std::fmt;

use url::Url;

/// Errors from parsing a channel URL.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("invalid channel URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unsupported channel scheme '{0}'; expected ws(s) or http(s)")]
    UnsupportedScheme(String),

    #[error("channel URL has no host")]
    MissingHost,
}

/// Identifies a logical stream target without its credential.
///
/// Two URLs that differ only in the credential query parameter (or a
/// fragment, or user info) produce the same `ChannelId`, so they share one
/// physical connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(Url);

impl ChannelId {
    /// Parses and normalizes a channel URL.
    ///
    /// `http`/`https` are mapped to `ws`/`wss`. The `credential_param` query
    /// pair is removed; other query pairs keep their order.
    pub fn parse(raw: &str, credential_param: &str) -> Result<Self, ChannelError> {
        let mut url = Url::parse(raw.trim())?;

        let scheme = match url.scheme() {
            "ws" | "http" => "ws",
            "wss" | "https" => "wss",
            other => return Err(ChannelError::UnsupportedScheme(other.to_string())),
        };
        if url.scheme() != scheme {
            url.set_scheme(scheme)
                .map_err(|_| ChannelError::UnsupportedScheme(url.scheme().to_string()))?;
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(ChannelError::MissingHost);
        }

        url.set_fragment(None);
        let _ = url.set_username("");
        let _ = url.set_password(None);

        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| k != credential_param)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept.iter());
        }

        Ok(Self(url))
    }

    /// The normalized URL as a string.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Builds the physical connection target carrying `token`.
    pub fn target(&self, credential_param: &str, token: &str) -> Url {
        let mut url = self.0.clone();
        url.query_pairs_mut().append_pair(credential_param, token);
        url
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
