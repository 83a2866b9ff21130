//! Access credential introspection.
//!
//! Access credentials are JWTs; only the `exp` claim is read. Signatures are
//! not verified here, the server does that.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;

/// What could be learned about a credential without contacting the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenInfo {
    /// The credential carries an expiry instant.
    Expires(DateTime<Utc>),
    /// Not a JWT, undecodable payload, or no numeric `exp` claim.
    Unparsable,
}

#[derive(Deserialize)]
struct Claims {
    exp: Option<serde_json::Number>,
}

/// Decodes the `exp` claim of a JWT.
pub fn inspect_token(token: &str) -> TokenInfo {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_sig), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return TokenInfo::Unparsable;
    };

    let Ok(bytes) = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')) else {
        return TokenInfo::Unparsable;
    };
    let Ok(claims) = serde_json::from_slice::<Claims>(&bytes) else {
        return TokenInfo::Unparsable;
    };

    let secs = match claims.exp {
        Some(n) => match n.as_i64() {
            Some(i) => i,
            None => match n.as_f64() {
                Some(f) if f.is_finite() => f as i64,
                _ => return TokenInfo::Unparsable,
            },
        },
        None => return TokenInfo::Unparsable,
    };

    match DateTime::from_timestamp(secs, 0) {
        Some(at) => TokenInfo::Expires(at),
        None => TokenInfo::Unparsable,
    }
}

/// Returns `true` if the credential expires less than `window` after `now`.
///
/// Unparsable credentials count as expiring so callers refresh them.
pub fn is_expiring_soon(token: &str, window: Duration, now: DateTime<Utc>) -> bool {
    match inspect_token(token) {
        TokenInfo::Unparsable => true,
        TokenInfo::Expires(at) => {
            let window = TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX);
            at.signed_duration_since(now) < window
        }
    }
}
