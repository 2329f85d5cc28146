//! CLI argument parsing, validation, and startup helpers.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::error;
use url::Url;

use crate::ServerConfig;
use crate::auth::RouteRules;
use crate::clock::SystemClock;

/// Where the authentication backend lives unless configured otherwise.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8080";

/// Where the front-end server lives unless configured otherwise.
pub const DEFAULT_UPSTREAM_URL: &str = "http://localhost:3001";

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "clinic-gate",
    about = "Session guard in front of the clinic administration front-end"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "3000")]
    pub port: u16,

    /// Base URL of the authentication backend (serves /auth/refresh-token)
    #[arg(long, env = "BACKEND_URL", default_value = DEFAULT_BACKEND_URL, value_parser = parse_http_url)]
    pub backend_url: Url,

    /// Front-end server that allowed requests are forwarded to
    #[arg(long, env = "UPSTREAM_URL", default_value = DEFAULT_UPSTREAM_URL, value_parser = parse_http_url)]
    pub upstream_url: Url,

    /// Public origin used for redirects (e.g. "https://clinic.example"). HTTPS turns on Secure cookies
    #[arg(long, env = "PUBLIC_ORIGIN")]
    pub public_origin: Option<String>,

    /// Timeout for the refresh call, in seconds
    #[arg(long, default_value = "10")]
    pub refresh_timeout_secs: u64,

    /// Let concurrent requests each call the refresh endpoint instead of sharing one call
    #[arg(long)]
    pub no_refresh_coalescing: bool,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

fn parse_http_url(s: &str) -> Result<Url, String> {
    let url = Url::parse(s).map_err(|e| format!("Invalid URL '{}': {}", s, e))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(format!("URL must use http or https: {}", s));
    }

    if url.host_str().is_none() {
        return Err(format!("URL must have a host: {}", s));
    }

    Ok(url)
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Parse and validate the public origin.
/// Returns None and logs an error if validation fails.
pub fn validate_public_origin(public_origin: &str) -> Option<Url> {
    let url = match parse_http_url(public_origin) {
        Ok(url) => url,
        Err(e) => {
            error!(origin = %public_origin, error = %e, "Invalid public-origin URL");
            return None;
        }
    };

    let is_https = url.scheme() == "https";
    let is_localhost = url.host_str() == Some("localhost");

    if !is_https && !is_localhost {
        error!("public-origin must use HTTPS for non-localhost deployments");
        return None;
    }

    Some(url)
}

/// Build ServerConfig from validated arguments.
pub fn build_config(args: &Args, public_origin: Option<Url>) -> ServerConfig {
    let secure_cookies = public_origin
        .as_ref()
        .is_some_and(|origin| origin.scheme() == "https");

    ServerConfig {
        backend_url: args.backend_url.clone(),
        upstream_url: args.upstream_url.clone(),
        public_origin,
        secure_cookies,
        refresh_timeout: Duration::from_secs(args.refresh_timeout_secs),
        coalesce_refresh: !args.no_refresh_coalescing,
        routes: RouteRules::default(),
        clock: Arc::new(SystemClock),
    }
}
