//! Shared state for the session guard middleware.

use std::sync::Arc;

use url::Url;

use super::cookie::CookiePolicy;
use super::refresh::RefreshClient;
use super::routes::RouteRules;
use crate::clock::Clock;

/// Refresh when the access credential has fewer than this many seconds left.
pub const ACCESS_REFRESH_WINDOW_SECS: i64 = 30;

/// Give up on the session when the refresh credential has this many seconds or fewer left.
pub const REFRESH_MIN_REMAINING_SECS: i64 = 5;

/// Static guard configuration.
#[derive(Debug, Clone)]
pub struct GuardConfig {
    pub routes: RouteRules,
    /// Origin used for absolute redirects. Falls back to the request's Host when unset.
    pub public_origin: Option<Url>,
    /// Set the Secure flag on issued cookies
    pub secure_cookies: bool,
}

/// Everything the guard needs per request. Cheap to clone.
#[derive(Clone)]
pub struct GuardState {
    pub(super) config: Arc<GuardConfig>,
    pub(super) refresher: RefreshClient,
    pub(super) clock: Arc<dyn Clock>,
}

impl GuardState {
    pub fn new(config: GuardConfig, refresher: RefreshClient, clock: Arc<dyn Clock>) -> Self {
        Self {
            config: Arc::new(config),
            refresher,
            clock,
        }
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn routes(&self) -> &RouteRules {
        &self.config.routes
    }

    pub fn cookie_policy(&self) -> CookiePolicy {
        CookiePolicy::new(self.config.secure_cookies)
    }
}
