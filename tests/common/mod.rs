#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use clinic_gate::{ServerConfig, auth::RouteRules, clock::ManualClock, create_app};
use cookie::Cookie;
use jsonwebtoken::{EncodingKey, Header};
use tower::ServiceExt;
use url::Url;

/// Fixed "now" for every test.
pub const NOW: u64 = 1_700_000_000;

/// Host header sent with every test request.
pub const HOST: &str = "clinic.test";

pub const ROTATED_ACCESS: &str = "rotated-access";
pub const ROTATED_REFRESH: &str = "rotated-refresh";

/// A backend-style credential expiring `expires_in` seconds after [`NOW`].
pub fn credential(expires_in: i64) -> String {
    #[derive(serde::Serialize)]
    struct Claims {
        sub: &'static str,
        role: &'static str,
        exp: i64,
    }
    jsonwebtoken::encode(
        &Header::default(),
        &Claims {
            sub: "staff-17",
            role: "receptionist",
            exp: NOW as i64 + expires_in,
        },
        &EncodingKey::from_secret(b"backend-only-secret"),
    )
    .expect("Failed to encode credential")
}

/// How the mock backend answers `POST /auth/refresh-token`.
#[derive(Debug, Clone, Copy)]
pub enum RefreshBehavior {
    /// 200 with rotated access and refresh cookies
    Rotate,
    /// Same as `Rotate`, after a delay
    Slow(Duration),
    /// The given status, no cookies
    Reject(StatusCode),
    /// 200 without any cookies
    NoCookies,
}

#[derive(Clone)]
struct BackendState {
    behavior: RefreshBehavior,
    calls: Arc<AtomicUsize>,
    seen_cookies: Arc<Mutex<Vec<String>>>,
}

/// Mock authentication backend bound to a random local port.
pub struct MockBackend {
    pub url: Url,
    calls: Arc<AtomicUsize>,
    seen_cookies: Arc<Mutex<Vec<String>>>,
    handle: tokio::task::JoinHandle<()>,
}

impl MockBackend {
    pub async fn start(behavior: RefreshBehavior) -> Self {
        let state = BackendState {
            behavior,
            calls: Arc::new(AtomicUsize::new(0)),
            seen_cookies: Arc::new(Mutex::new(Vec::new())),
        };
        let calls = state.calls.clone();
        let seen_cookies = state.seen_cookies.clone();

        let router = Router::new()
            .route("/auth/refresh-token", post(refresh_handler))
            .with_state(state);
        let (url, handle) = serve(router).await;

        Self {
            url,
            calls,
            seen_cookies,
            handle,
        }
    }

    /// Number of refresh calls received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Cookie headers of every refresh call, in arrival order.
    pub fn seen_cookies(&self) -> Vec<String> {
        self.seen_cookies.lock().unwrap().clone()
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn refresh_handler(State(state): State<BackendState>, headers: HeaderMap) -> Response {
    state.calls.fetch_add(1, Ordering::SeqCst);
    if let Some(cookie) = headers.get(header::COOKIE).and_then(|v| v.to_str().ok()) {
        state.seen_cookies.lock().unwrap().push(cookie.to_string());
    }

    match state.behavior {
        RefreshBehavior::Rotate => rotated_response(),
        RefreshBehavior::Slow(delay) => {
            tokio::time::sleep(delay).await;
            rotated_response()
        }
        RefreshBehavior::Reject(status) => status.into_response(),
        RefreshBehavior::NoCookies => StatusCode::OK.into_response(),
    }
}

fn rotated_response() -> Response {
    let mut response = StatusCode::OK.into_response();
    let headers = response.headers_mut();
    headers.append(
        header::SET_COOKIE,
        HeaderValue::from_str(&format!(
            "access_token={}; Path=/; HttpOnly; Max-Age=300; SameSite=None",
            ROTATED_ACCESS
        ))
        .unwrap(),
    );
    headers.append(
        header::SET_COOKIE,
        HeaderValue::from_str(&format!(
            "refresh_token={}; Path=/auth; HttpOnly; Max-Age=1209600",
            ROTATED_REFRESH
        ))
        .unwrap(),
    );
    response
}

/// Mock front-end: echoes what it received.
/// Body is `"{method} {uri} {body}"`; the request's Cookie header comes back in `x-seen-cookie`.
pub async fn start_upstream() -> (Url, tokio::task::JoinHandle<()>) {
    serve(Router::new().fallback(echo_handler)).await
}

async fn echo_handler(request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    let text = format!(
        "{} {} {}",
        parts.method,
        parts.uri,
        String::from_utf8_lossy(&body)
    );

    let mut response = (StatusCode::OK, text.trim_end().to_string()).into_response();
    if let Some(cookie) = parts.headers.get(header::COOKIE) {
        response
            .headers_mut()
            .insert("x-seen-cookie", cookie.clone());
    }
    if parts.uri.path() == "/settings/theme" {
        response
            .headers_mut()
            .append(header::SET_COOKIE, HeaderValue::from_static("theme=light; Path=/"));
    }
    response
}

async fn serve(router: Router) -> (Url, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local address");
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });
    let url = Url::parse(&format!("http://{}", addr)).expect("Invalid URL");
    (url, handle)
}

/// Build a gate config pointing at the given backend and upstream.
pub fn gate_config(backend_url: Url, upstream_url: Url, clock: Arc<ManualClock>) -> ServerConfig {
    ServerConfig {
        backend_url,
        upstream_url,
        public_origin: None,
        secure_cookies: false,
        refresh_timeout: Duration::from_secs(5),
        coalesce_refresh: true,
        routes: RouteRules::default(),
        clock,
    }
}

pub struct TestGate {
    pub app: Router,
    pub clock: Arc<ManualClock>,
    pub backend: MockBackend,
    pub upstream_url: Url,
    upstream_handle: tokio::task::JoinHandle<()>,
}

impl Drop for TestGate {
    fn drop(&mut self) {
        self.upstream_handle.abort();
    }
}

pub async fn setup(behavior: RefreshBehavior) -> TestGate {
    TestSetup::new(behavior).build().await
}

/// Builder for test setup with various options
pub struct TestSetup {
    behavior: RefreshBehavior,
    coalesce: bool,
    secure_cookies: bool,
    public_origin: Option<Url>,
    backend_url: Option<Url>,
}

impl TestSetup {
    pub fn new(behavior: RefreshBehavior) -> Self {
        Self {
            behavior,
            coalesce: true,
            secure_cookies: false,
            public_origin: None,
            backend_url: None,
        }
    }

    pub fn without_coalescing(mut self) -> Self {
        self.coalesce = false;
        self
    }

    pub fn with_secure_cookies(mut self) -> Self {
        self.secure_cookies = true;
        self
    }

    pub fn with_public_origin(mut self, origin: &str) -> Self {
        self.public_origin = Some(Url::parse(origin).expect("Invalid origin"));
        self
    }

    /// Point the gate at this URL instead of the mock backend.
    pub fn with_backend_url(mut self, url: Url) -> Self {
        self.backend_url = Some(url);
        self
    }

    pub async fn build(self) -> TestGate {
        let backend = MockBackend::start(self.behavior).await;
        let (upstream_url, upstream_handle) = start_upstream().await;
        let clock = Arc::new(ManualClock::new(NOW));

        let backend_url = self.backend_url.unwrap_or_else(|| backend.url.clone());
        let mut config = gate_config(backend_url, upstream_url.clone(), clock.clone());
        config.coalesce_refresh = self.coalesce;
        config.secure_cookies = self.secure_cookies;
        config.public_origin = self.public_origin;

        let app = create_app(&config).expect("Failed to create app");

        TestGate {
            app,
            clock,
            backend,
            upstream_url,
            upstream_handle,
        }
    }
}

/// A GET request for `path` carrying `cookies`.
pub fn get_request(path: &str, cookies: &[(&str, &str)]) -> axum::http::Request<Body> {
    let mut builder = axum::http::Request::builder()
        .uri(path)
        .header(header::HOST, HOST);
    if !cookies.is_empty() {
        let joined = cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ");
        builder = builder.header(header::COOKIE, joined);
    }
    builder.body(Body::empty()).unwrap()
}

impl TestGate {
    pub async fn get(&self, path: &str, cookies: &[(&str, &str)]) -> Response {
        self.app
            .clone()
            .oneshot(get_request(path, cookies))
            .await
            .unwrap()
    }
}

pub fn location(response: &Response) -> Option<&str> {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
}

pub fn set_cookies(response: &Response) -> Vec<Cookie<'static>> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| Cookie::parse(v.to_str().unwrap().to_owned()).expect("Invalid Set-Cookie"))
        .collect()
}

pub fn set_cookie(response: &Response, name: &str) -> Option<Cookie<'static>> {
    set_cookies(response).into_iter().find(|c| c.name() == name)
}

/// The response tells the browser to drop `name`.
pub fn is_cleared(response: &Response, name: &str) -> bool {
    set_cookie(response, name).is_some_and(|c| {
        c.value().is_empty() && c.max_age() == Some(cookie::time::Duration::ZERO)
    })
}

pub async fn body_string(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    String::from_utf8(bytes.to_vec()).expect("Body is not UTF-8")
}
