//! The session guard: decides, per request, between letting it through,
//! rotating the credentials first, or sending the user to sign in.
//!
//! Checks run in a fixed order and the first match wins:
//!
//! 1. public path, signed in: redirect to `lastUrl` (or `/`) and drop `lastUrl`
//! 2. protected path, signed out: redirect to sign-in, remember the path
//! 3. public path, signed out: let through
//! 4. protected path, signed in but a credential is empty: sign out
//! 5. access credential has under 30s left: sign out if the refresh credential
//!    has 5s or less, otherwise refresh (sign out if that fails)
//! 6. otherwise let through

use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use url::Url;

use super::cookie::{
    ACCESS_COOKIE_NAME, CookiePair, CookiePolicy, LAST_URL_COOKIE_NAME, REFRESH_COOKIE_NAME,
    get_cookie, is_cookie_safe, replace_request_cookies,
};
use super::routes::{ROOT_PATH, RouteRules};
use super::session::Session;
use super::state::{ACCESS_REFRESH_WINDOW_SECS, GuardState, REFRESH_MIN_REMAINING_SECS};
use crate::jwt::remaining_secs;

/// What the guard decided for a request, before any network I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision<'a> {
    /// Signed-in user on the sign-in page
    Resume,
    /// Anonymous user on a protected page
    SignIn,
    /// Let the request through untouched
    Allow,
    /// End the session without asking the backend
    SignOut,
    /// Access credential is about to expire, rotate before continuing
    Refresh { access: &'a str, refresh: &'a str },
}

/// Pure classification of a request. Never fails.
pub fn decide<'a>(routes: &RouteRules, session: &'a Session, path: &str, now: u64) -> Decision<'a> {
    match (routes.is_public(path), session.is_authenticated()) {
        (true, true) => return Decision::Resume,
        (false, false) => return Decision::SignIn,
        (true, false) => return Decision::Allow,
        (false, true) => {}
    }

    let Some((access, refresh)) = session.credentials() else {
        return Decision::SignOut;
    };

    if remaining_secs(access, now) >= ACCESS_REFRESH_WINDOW_SECS {
        return Decision::Allow;
    }

    if remaining_secs(refresh, now) <= REFRESH_MIN_REMAINING_SECS {
        return Decision::SignOut;
    }

    Decision::Refresh { access, refresh }
}

/// Cookie mutations to put on the response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieChanges {
    pub set: Vec<CookiePair>,
    /// Cookies to delete. A name that is also in `set` is replaced, not deleted.
    pub clear: Vec<String>,
}

impl CookieChanges {
    pub fn apply(&self, headers: &mut HeaderMap, policy: CookiePolicy) {
        for name in &self.clear {
            if !self.set.iter().any(|pair| &pair.name == name) {
                policy.append(headers, &policy.removal(name));
            }
        }
        for pair in &self.set {
            policy.append(headers, &policy.issue(&pair.name, &pair.value));
        }
    }
}

/// What the middleware does with the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Pass the request on, then apply the cookie changes to the response
    Continue(CookieChanges),
    /// Answer with a redirect to `location` (a path)
    Redirect {
        location: String,
        cookies: CookieChanges,
    },
}

impl GuardState {
    /// Run the guard for one request, including the refresh call if one is due.
    pub async fn evaluate(&self, path: &str, session: &Session, last_url: Option<&str>) -> Outcome {
        let routes = self.routes();
        let now = self.clock.now();

        match decide(routes, session, path, now) {
            Decision::Resume => {
                let location = last_url.filter(|url| is_local_path(url)).unwrap_or(ROOT_PATH);
                tracing::debug!(path = %path, location = %location, "Already signed in");
                Outcome::Redirect {
                    location: location.to_string(),
                    cookies: CookieChanges {
                        set: Vec::new(),
                        clear: vec![LAST_URL_COOKIE_NAME.to_string()],
                    },
                }
            }
            Decision::SignIn => {
                let mut cookies = CookieChanges::default();
                if !routes.is_redirect_excluded(path) && is_cookie_safe(path) {
                    cookies.set.push(CookiePair::new(LAST_URL_COOKIE_NAME, path));
                }
                tracing::debug!(path = %path, "Not signed in");
                Outcome::Redirect {
                    location: routes.sign_in_path.clone(),
                    cookies,
                }
            }
            Decision::Allow => Outcome::Continue(CookieChanges::default()),
            Decision::SignOut => {
                tracing::info!(path = %path, "Session expired, signing out");
                self.sign_out(path)
            }
            Decision::Refresh { access, refresh } => {
                match self.refresher.refresh(access, refresh).await {
                    Ok(rotated) => {
                        tracing::debug!(path = %path, cookies = rotated.len(), "Credentials refreshed");
                        Outcome::Continue(CookieChanges {
                            set: rotated,
                            clear: vec![
                                ACCESS_COOKIE_NAME.to_string(),
                                REFRESH_COOKIE_NAME.to_string(),
                            ],
                        })
                    }
                    Err(e) => {
                        tracing::warn!(path = %path, error = %e, "Token refresh failed, signing out");
                        self.sign_out(path)
                    }
                }
            }
        }
    }

    fn sign_out(&self, path: &str) -> Outcome {
        let routes = self.routes();
        let resume = if routes.is_redirect_excluded(path) || !is_cookie_safe(path) {
            ROOT_PATH
        } else {
            path
        };

        Outcome::Redirect {
            location: routes.sign_in_path.clone(),
            cookies: CookieChanges {
                set: vec![CookiePair::new(LAST_URL_COOKIE_NAME, resume)],
                clear: vec![
                    ACCESS_COOKIE_NAME.to_string(),
                    REFRESH_COOKIE_NAME.to_string(),
                ],
            },
        }
    }
}

/// Middleware running the guard in front of every guarded path.
pub async fn session_guard(
    State(state): State<GuardState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_owned();
    if !state.routes().is_guarded(&path) {
        return next.run(request).await;
    }

    let session = Session::from_headers(request.headers());
    let last_url = get_cookie(request.headers(), LAST_URL_COOKIE_NAME).map(str::to_owned);
    let policy = state.cookie_policy();

    match state.evaluate(&path, &session, last_url.as_deref()).await {
        Outcome::Continue(cookies) => {
            if !cookies.set.is_empty() {
                replace_request_cookies(request.headers_mut(), &cookies.set);
            }
            let mut response = next.run(request).await;
            cookies.apply(response.headers_mut(), policy);
            response
        }
        Outcome::Redirect { location, cookies } => {
            let target = match request_origin(&request, state.config().public_origin.as_ref()) {
                Some(origin) => format!("{}{}", origin, location),
                None => location,
            };
            let mut response = Redirect::temporary(&target).into_response();
            cookies.apply(response.headers_mut(), policy);
            response
        }
    }
}

/// A same-site absolute path. Rejects `//host` and backslash tricks.
fn is_local_path(url: &str) -> bool {
    url.starts_with('/') && !url.starts_with("//") && !url.contains('\\')
}

/// `scheme://host[:port]` of the request, preferring the configured public origin.
fn request_origin(request: &Request, configured: Option<&Url>) -> Option<String> {
    if let Some(origin) = configured {
        return Some(origin.origin().ascii_serialization());
    }

    let uri = request.uri();
    if let (Some(scheme), Some(authority)) = (uri.scheme_str(), uri.authority()) {
        return Some(format!("{}://{}", scheme, authority));
    }

    let host = request.headers().get(header::HOST)?.to_str().ok()?;
    if host.is_empty() || host.contains(['/', '\\', '@', ' ']) {
        return None;
    }

    let scheme = request
        .headers()
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|proto| *proto == "https" || *proto == "http")
        .unwrap_or("http");

    Some(format!("{}://{}", scheme, host))
}
