// ────────────────────────────────
// src/proxy/forward.rs
// Upstream forwarding: the per-backend proxy handle.
// ────────────────────────────────

use super::error::ProxyError;
use async_trait::async_trait;
use hyper::body::Bytes;
use hyper::client::HttpConnector;
use hyper::header::{HeaderMap, HeaderName, HeaderValue, CONNECTION};
use hyper::{Body, Client, Method, Request, Response, Uri};
use hyper_tls::HttpsConnector;
use std::net::SocketAddr;
use std::time::Duration;
use url::{Position, Url};

pub type HttpClient = Client<HttpsConnector<HttpConnector>, Body>;

/// Shared upstream client. Handles both `http` and `https` backends.
pub fn build_client() -> HttpClient {
    Client::builder().build::<_, Body>(HttpsConnector::new())
}

/// Peer address of the inbound connection, stored in request extensions.
#[derive(Debug, Clone, Copy)]
pub struct ClientAddr(pub SocketAddr);

const X_FORWARDED_FOR: &str = "x-forwarded-for";

const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// An inbound request with its body buffered, so it can be replayed on
/// every retry and failover.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
    client_addr: Option<SocketAddr>,
}

impl ForwardRequest {
    pub async fn from_request(req: Request<Body>) -> Result<Self, ProxyError> {
        let (parts, body) = req.into_parts();
        let body = hyper::body::to_bytes(body)
            .await
            .map_err(ProxyError::RequestBody)?;
        let client_addr = parts.extensions.get::<ClientAddr>().map(|addr| addr.0);

        Ok(Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            body,
            client_addr,
        })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn client_addr(&self) -> Option<SocketAddr> {
        self.client_addr
    }
}

/// Sends one request to one upstream. Implementations report every
/// transport failure as an error; they never retry on their own.
#[async_trait]
pub trait Forward: Send + Sync {
    async fn forward(&self, request: &ForwardRequest) -> Result<Response<Body>, ProxyError>;
}

pub struct HttpForwarder {
    target: Url,
    origin: String,
    client: HttpClient,
    timeout: Duration,
}

impl HttpForwarder {
    pub fn new(target: Url, client: HttpClient, timeout: Duration) -> Self {
        let origin = format!(
            "{}://{}",
            target.scheme(),
            &target[Position::BeforeHost..Position::AfterPort]
        );

        Self {
            target,
            origin,
            client,
            timeout,
        }
    }

    fn upstream_uri(&self, uri: &Uri) -> Result<Uri, ProxyError> {
        let mut target = self.origin.clone();
        target.push_str(&join_paths(self.target.path(), uri.path()));
        if let Some(query) = uri.query() {
            target.push('?');
            target.push_str(query);
        }
        Ok(target.parse::<Uri>()?)
    }

    fn upstream_request(&self, request: &ForwardRequest) -> Result<Request<Body>, ProxyError> {
        let mut upstream = Request::new(Body::from(request.body.clone()));
        *upstream.method_mut() = request.method.clone();
        *upstream.uri_mut() = self.upstream_uri(&request.uri)?;
        *upstream.headers_mut() = request.headers.clone();

        let headers = upstream.headers_mut();
        strip_hop_by_hop(headers);
        if let Some(addr) = request.client_addr {
            append_forwarded_for(headers, addr);
        }

        Ok(upstream)
    }
}

#[async_trait]
impl Forward for HttpForwarder {
    async fn forward(&self, request: &ForwardRequest) -> Result<Response<Body>, ProxyError> {
        let upstream = self.upstream_request(request)?;

        let mut response = tokio::time::timeout(self.timeout, self.client.request(upstream))
            .await
            .map_err(|_| ProxyError::Timeout)??;

        strip_hop_by_hop(response.headers_mut());
        Ok(response)
    }
}

/// Join a backend base path and a request path with exactly one slash.
fn join_paths(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{}/{}", base, path),
        _ => format!("{}{}", base, path),
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, addr: SocketAddr) {
    let ip = addr.ip().to_string();
    let value = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) => format!("{prior}, {ip}"),
        None => ip,
    };

    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(HeaderName::from_static(X_FORWARDED_FOR), value);
    }
}
