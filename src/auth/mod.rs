//! Session guard for the clinic front-end.
//!
//! Browsers carry two backend-issued credentials as cookies: a short-lived
//! access token and a longer-lived refresh token. The guard keeps anonymous
//! users on the sign-in page, rotates credentials shortly before the access
//! token expires, and signs users out when rotation is no longer possible.

mod cookie;
mod errors;
mod guard;
mod refresh;
mod routes;
mod session;
mod state;

pub use cookie::{
    ACCESS_COOKIE_NAME, CookiePair, CookiePolicy, LAST_URL_COOKIE_NAME, REFRESH_COOKIE_NAME,
    get_cookie, parse_set_cookies,
};
pub use errors::RefreshError;
pub use guard::{CookieChanges, Decision, Outcome, decide, session_guard};
pub use refresh::{REFRESH_PATH, RefreshClient, RefreshResult};
pub use routes::{ROOT_PATH, RouteClass, RouteRules, SIGN_IN_PATH};
pub use session::Session;
pub use state::{
    ACCESS_REFRESH_WINDOW_SECS, GuardConfig, GuardState, REFRESH_MIN_REMAINING_SECS,
};
