//! Refresh failure types.

use axum::http::StatusCode;

/// Why a refresh attempt did not produce new credentials.
///
/// Every variant ends the session; the distinction only matters for logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// The request never got a response (connect error, timeout, reset)
    Network(String),
    /// The backend answered with a non-2xx status
    Rejected(StatusCode),
    /// The backend answered 2xx but sent no cookies
    NoCookies,
}

impl std::fmt::Display for RefreshError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefreshError::Network(e) => write!(f, "Refresh request failed: {}", e),
            RefreshError::Rejected(status) => write!(f, "Refresh rejected with {}", status),
            RefreshError::NoCookies => write!(f, "Refresh response carried no cookies"),
        }
    }
}

impl std::error::Error for RefreshError {}

impl From<reqwest::Error> for RefreshError {
    fn from(e: reqwest::Error) -> Self {
        RefreshError::Network(e.to_string())
    }
}
