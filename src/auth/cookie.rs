//! Cookie parsing and issuing for the session guard.

use axum::http::{HeaderMap, HeaderValue, header};
use cookie::{Cookie, SameSite};

/// Cookie name for the access credential (short-lived).
pub const ACCESS_COOKIE_NAME: &str = "access_token";

/// Cookie name for the refresh credential (long-lived, only used to mint new pairs).
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

/// Cookie name for the page to resume after signing in.
pub const LAST_URL_COOKIE_NAME: &str = "lastUrl";

/// Extract a cookie value from the Cookie header(s).
pub fn get_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookie_header| cookie_header.split(';'))
        .find_map(|part| {
            let (key, value) = part.trim().split_once('=')?;
            (key.trim() == name).then(|| value.trim())
        })
}

/// A cookie name/value pair with all attributes stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookiePair {
    pub name: String,
    pub value: String,
}

impl CookiePair {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Pull the name/value pairs out of every `Set-Cookie` header, ignoring attributes.
/// Headers that do not parse as cookies are skipped.
pub fn parse_set_cookies(headers: &HeaderMap) -> Vec<CookiePair> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|raw| match Cookie::parse(raw) {
            Ok(cookie) => Some(CookiePair::new(cookie.name(), cookie.value())),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping unparseable Set-Cookie header");
                None
            }
        })
        .collect()
}

/// Whether a value can go into a cookie without quoting or encoding.
pub fn is_cookie_safe(value: &str) -> bool {
    value
        .bytes()
        .all(|b| b > 0x20 && b < 0x7f && !matches!(b, b'"' | b',' | b';' | b'\\'))
}

/// Security flags the gate puts on every cookie it issues.
#[derive(Debug, Clone, Copy)]
pub struct CookiePolicy {
    /// Set the Secure flag (true when served over HTTPS)
    pub secure: bool,
}

impl CookiePolicy {
    pub fn new(secure: bool) -> Self {
        Self { secure }
    }

    /// A session cookie carrying `value`.
    pub fn issue(&self, name: &str, value: &str) -> Cookie<'static> {
        Cookie::build((name.to_owned(), value.to_owned()))
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .path("/")
            .build()
    }

    /// A cookie that makes the browser drop `name`.
    pub fn removal(&self, name: &str) -> Cookie<'static> {
        let mut cookie = self.issue(name, "");
        cookie.make_removal();
        cookie
    }

    /// Append a `Set-Cookie` header for `cookie`.
    pub fn append(&self, headers: &mut HeaderMap, cookie: &Cookie<'_>) {
        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(value) => {
                headers.append(header::SET_COOKIE, value);
            }
            Err(e) => {
                tracing::warn!(cookie = %cookie.name(), error = %e, "Dropping invalid cookie");
            }
        }
    }
}

/// Overwrite cookies in the request's Cookie header so downstream handlers see `pairs`.
/// Cookies not named in `pairs` are kept in their original order.
pub fn replace_request_cookies(headers: &mut HeaderMap, pairs: &[CookiePair]) {
    let mut merged: Vec<Cookie<'static>> = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookie_header| Cookie::split_parse(cookie_header))
        .filter_map(Result::ok)
        .filter(|cookie| !pairs.iter().any(|pair| pair.name == cookie.name()))
        .map(Cookie::into_owned)
        .collect();
    merged.extend(
        pairs
            .iter()
            .map(|pair| Cookie::new(pair.name.clone(), pair.value.clone())),
    );

    let joined = merged
        .iter()
        .map(|cookie| cookie.stripped().to_string())
        .collect::<Vec<_>>()
        .join("; ");

    headers.remove(header::COOKIE);
    match HeaderValue::from_str(&joined) {
        Ok(value) => {
            headers.insert(header::COOKIE, value);
        }
        Err(e) => tracing::warn!(error = %e, "Could not rebuild Cookie header"),
    }
}
