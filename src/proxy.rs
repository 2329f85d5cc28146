//! Forwards requests the guard let through to the upstream front-end server.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, HeaderName, StatusCode, header},
    response::{IntoResponse, Response},
};
use url::Url;

/// Largest request body forwarded upstream.
const MAX_REQUEST_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Headers that describe one connection and must not be forwarded.
fn is_hop_by_hop(name: &HeaderName) -> bool {
    matches!(
        name.as_str(),
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
    )
}

#[derive(Clone)]
pub struct ProxyState {
    client: reqwest::Client,
    upstream: Url,
}

impl ProxyState {
    pub fn new(upstream: Url) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client, upstream })
    }

    /// Upstream URL for a request path and query.
    fn target(&self, path: &str, query: Option<&str>) -> Url {
        let mut url = self.upstream.clone();
        let joined = format!("{}{}", self.upstream.path().trim_end_matches('/'), path);
        url.set_path(&joined);
        url.set_query(query);
        url
    }
}

/// Errors while proxying.
#[derive(Debug)]
pub enum ProxyError {
    /// Request body could not be read or was too large
    Body(axum::Error),
    /// Upstream could not be reached
    Upstream(reqwest::Error),
}

impl std::fmt::Display for ProxyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProxyError::Body(e) => write!(f, "Failed to read request body: {}", e),
            ProxyError::Upstream(e) => write!(f, "Upstream request failed: {}", e),
        }
    }
}

impl std::error::Error for ProxyError {}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        match &self {
            ProxyError::Body(_) => {
                tracing::warn!(error = %self, "Rejected request body");
                (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large").into_response()
            }
            ProxyError::Upstream(_) => {
                tracing::error!(error = %self, "Proxy error");
                (StatusCode::BAD_GATEWAY, "Bad gateway").into_response()
            }
        }
    }
}

fn forwardable(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if name == header::HOST || is_hop_by_hop(name) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Fallback handler: replay the request against the upstream and stream the answer back.
pub async fn proxy_handler(
    State(state): State<ProxyState>,
    request: Request,
) -> Result<Response, ProxyError> {
    let (parts, body) = request.into_parts();
    let target = state.target(parts.uri.path(), parts.uri.query());

    let mut headers = forwardable(&parts.headers);
    if let Some(host) = parts.headers.get(header::HOST) {
        headers.insert(HeaderName::from_static("x-forwarded-host"), host.clone());
    }

    let body = axum::body::to_bytes(body, MAX_REQUEST_BODY_BYTES)
        .await
        .map_err(ProxyError::Body)?;

    let upstream = state
        .client
        .request(parts.method, target)
        .headers(headers)
        .body(body)
        .send()
        .await
        .map_err(ProxyError::Upstream)?;

    let status = upstream.status();
    let headers = forwardable(upstream.headers());
    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;

    Ok(response)
}
