pub mod auth;
pub mod cli;
pub mod clock;
pub mod jwt;
pub mod proxy;

use auth::{GuardConfig, GuardState, RefreshClient, RouteRules, session_guard};
use axum::{Router, middleware, routing::get};
use clock::Clock;
use proxy::{ProxyState, proxy_handler};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use url::Url;

pub struct ServerConfig {
    /// Base URL of the authentication backend
    pub backend_url: Url,
    /// Front-end server that allowed requests are forwarded to
    pub upstream_url: Url,
    /// Origin used for absolute redirects (request Host is used when unset)
    pub public_origin: Option<Url>,
    /// Whether to set Secure flag on cookies (should be true in production with HTTPS)
    pub secure_cookies: bool,
    /// Timeout for the refresh call
    pub refresh_timeout: Duration,
    /// Share one refresh call between concurrent requests with the same refresh token
    pub coalesce_refresh: bool,
    /// Public, redirect-excluded and unguarded paths
    pub routes: RouteRules,
    /// Time source for expiry checks
    pub clock: Arc<dyn Clock>,
}

/// Errors that stop the server from starting or running.
#[derive(Debug)]
pub enum ServerError {
    /// HTTP client could not be built
    Client(reqwest::Error),
    /// Binding or serving failed
    Io(std::io::Error),
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::Client(e) => write!(f, "Failed to build HTTP client: {}", e),
            ServerError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<reqwest::Error> for ServerError {
    fn from(e: reqwest::Error) -> Self {
        ServerError::Client(e)
    }
}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        ServerError::Io(e)
    }
}

/// Create the application router with the given configuration.
///
/// Every request except `/healthz` passes through the session guard; whatever
/// the guard lets through is proxied to the upstream front-end.
pub fn create_app(config: &ServerConfig) -> Result<Router, ServerError> {
    let refresher = RefreshClient::new(
        &config.backend_url,
        config.refresh_timeout,
        config.coalesce_refresh,
    )?;

    let guard = GuardState::new(
        GuardConfig {
            routes: config.routes.clone(),
            public_origin: config.public_origin.clone(),
            secure_cookies: config.secure_cookies,
        },
        refresher,
        config.clock.clone(),
    );

    let proxy = ProxyState::new(config.upstream_url.clone())?;

    // Routes added after the guard layer are not guarded.
    Ok(Router::new()
        .fallback(proxy_handler)
        .with_state(proxy)
        .layer(middleware::from_fn_with_state(guard, session_guard))
        .route("/healthz", get(health)))
}

async fn health() -> &'static str {
    "ok"
}

/// Run the server on the given listener. This function blocks until the server exits.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), ServerError> {
    let app = create_app(&config)?;
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await?;
    Ok(())
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), ServerError> {
    let app = create_app(&config)?;

    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
