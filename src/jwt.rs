//! Best-effort expiry peek for backend-issued JWTs.
//!
//! The backend signs and verifies credentials; the gate never holds the key.
//! All the guard needs is the `exp` claim to decide whether a refresh is due, so
//! the payload is read WITHOUT checking the signature. Nothing here may be used
//! to make an authorization decision.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;

/// The only claim the guard cares about.
#[derive(Debug, Deserialize)]
struct ExpiryClaim {
    /// Expiration time (Unix timestamp). Some issuers emit fractional seconds.
    exp: f64,
}

/// Errors that can occur while peeking at a token.
#[derive(Debug)]
pub enum PeekError {
    /// Not three dot-separated segments
    Malformed,
    /// Header segment is not a JOSE header jsonwebtoken understands
    Header(jsonwebtoken::errors::Error),
    /// Payload is not base64url-encoded JSON
    Payload,
    /// Payload has no usable `exp` claim
    MissingExpiry,
}

impl std::fmt::Display for PeekError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeekError::Malformed => write!(f, "Token is not a JWT"),
            PeekError::Header(e) => write!(f, "Invalid token header: {}", e),
            PeekError::Payload => write!(f, "Invalid token payload"),
            PeekError::MissingExpiry => write!(f, "Token has no expiry"),
        }
    }
}

impl std::error::Error for PeekError {}

/// Read the `exp` claim of a token without verifying it.
pub fn decode_expiry(token: &str) -> Result<u64, PeekError> {
    let mut segments = token.split('.');
    let (Some(_), Some(payload), Some(_), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(PeekError::Malformed);
    };

    jsonwebtoken::decode_header(token).map_err(PeekError::Header)?;

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|_| PeekError::Payload)?;
    let claim: ExpiryClaim = serde_json::from_slice(&bytes).map_err(|e| {
        if e.is_data() {
            PeekError::MissingExpiry
        } else {
            PeekError::Payload
        }
    })?;

    if !claim.exp.is_finite() || claim.exp < 0.0 {
        return Err(PeekError::MissingExpiry);
    }

    Ok(claim.exp as u64)
}

/// Like [`decode_expiry`] but discards the reason.
pub fn peek_expiry(token: &str) -> Option<u64> {
    decode_expiry(token).ok()
}

/// Seconds until the token expires, relative to `now`.
///
/// Negative once expired. A token that cannot be decoded counts as `0`.
pub fn remaining_secs(token: &str, now: u64) -> i64 {
    match decode_expiry(token) {
        Ok(exp) => {
            let exp = i64::try_from(exp).unwrap_or(i64::MAX);
            let now = i64::try_from(now).unwrap_or(i64::MAX);
            exp.saturating_sub(now)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Treating undecodable credential as expired");
            0
        }
    }
}
