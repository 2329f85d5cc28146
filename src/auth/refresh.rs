//! Client for the backend's credential rotation endpoint.
//!
//! One `POST {backend}/auth/refresh-token` per attempt, no retries. Concurrent
//! requests presenting the same refresh credential share a single call so the
//! backend's rotation does not log out the losers of the race.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::http::header;
use tokio::sync::OnceCell;
use url::Url;

use super::cookie::{ACCESS_COOKIE_NAME, CookiePair, REFRESH_COOKIE_NAME, parse_set_cookies};
use super::errors::RefreshError;

/// Path of the rotation endpoint, relative to the backend base URL.
pub const REFRESH_PATH: &str = "/auth/refresh-token";

/// How long a finished refresh keeps being handed to requests that still carry
/// the old refresh credential.
const SHARE_WINDOW: Duration = Duration::from_secs(5);

pub type RefreshResult = Result<Vec<CookiePair>, RefreshError>;

/// A completed refresh and when it completed.
struct Finished {
    at: Instant,
    result: RefreshResult,
}

type InFlightMap = Arc<Mutex<HashMap<String, Arc<OnceCell<Finished>>>>>;

/// Calls the refresh endpoint.
#[derive(Clone)]
pub struct RefreshClient {
    http: reqwest::Client,
    endpoint: Url,
    /// Keyed by refresh credential. `None` when coalescing is off.
    in_flight: Option<InFlightMap>,
    share_window: Duration,
}

impl RefreshClient {
    pub fn new(backend_url: &Url, timeout: Duration, coalesce: bool) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            http,
            endpoint: refresh_endpoint(backend_url),
            in_flight: coalesce.then(InFlightMap::default),
            share_window: SHARE_WINDOW,
        })
    }

    /// How long a finished refresh is reused, counted from its completion.
    pub fn with_share_window(mut self, window: Duration) -> Self {
        self.share_window = window;
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Exchange the current pair for a rotated one.
    /// Returns the name/value pairs of every cookie the backend set.
    pub async fn refresh(&self, access: &str, refresh: &str) -> RefreshResult {
        let Some(in_flight) = &self.in_flight else {
            return self.call(access, refresh).await;
        };

        let shared = {
            let mut map = in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            // Expired entries are only swept here, on the next refresh.
            map.retain(|_, cell| {
                cell.get()
                    .is_none_or(|finished| finished.at.elapsed() < self.share_window)
            });
            map.entry(refresh.to_owned()).or_default().clone()
        };

        shared
            .get_or_init(|| async {
                let result = self.call(access, refresh).await;
                Finished {
                    at: Instant::now(),
                    result,
                }
            })
            .await
            .result
            .clone()
    }

    async fn call(&self, access: &str, refresh: &str) -> RefreshResult {
        tracing::debug!(endpoint = %self.endpoint, "Refreshing credentials");

        let response = self
            .http
            .post(self.endpoint.clone())
            .header(
                header::COOKIE,
                format!(
                    "{}={}; {}={}",
                    ACCESS_COOKIE_NAME, access, REFRESH_COOKIE_NAME, refresh
                ),
            )
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(RefreshError::Rejected(status));
        }

        let cookies = parse_set_cookies(response.headers());
        if cookies.is_empty() {
            return Err(RefreshError::NoCookies);
        }

        Ok(cookies)
    }
}

/// `{backend_url}/auth/refresh-token`, keeping any path prefix on the base.
fn refresh_endpoint(backend_url: &Url) -> Url {
    let mut endpoint = backend_url.clone();
    let path = format!("{}{}", backend_url.path().trim_end_matches('/'), REFRESH_PATH);
    endpoint.set_path(&path);
    endpoint.set_query(None);
    endpoint
}
