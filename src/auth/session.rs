//! Credential pair read from request cookies.

use axum::http::HeaderMap;

use super::cookie::{ACCESS_COOKIE_NAME, REFRESH_COOKIE_NAME, get_cookie};

/// The access/refresh pair a browser presented with one request.
///
/// A cookie that is present with an empty value still counts towards
/// [`Session::is_authenticated`] but yields no credential.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub access: Option<String>,
    pub refresh: Option<String>,
}

impl Session {
    pub fn new(access: Option<&str>, refresh: Option<&str>) -> Self {
        Self {
            access: access.map(str::to_owned),
            refresh: refresh.map(str::to_owned),
        }
    }

    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self::new(
            get_cookie(headers, ACCESS_COOKIE_NAME),
            get_cookie(headers, REFRESH_COOKIE_NAME),
        )
    }

    /// Both credential cookies were sent.
    pub fn is_authenticated(&self) -> bool {
        self.access.is_some() && self.refresh.is_some()
    }

    /// Both credentials, if each carries a value.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let access = self.access.as_deref().filter(|v| !v.is_empty())?;
        let refresh = self.refresh.as_deref().filter(|v| !v.is_empty())?;
        Some((access, refresh))
    }
}
