use crate::body::{self, ProxyBody, ProxyRequest, ProxyResponse};
use crate::error::{ForwardError, ProxyError, ProxyResult};
use crate::middleware::ResponseMiddleware;
use crate::proxy::ConnectionInfo;
use http::uri::{Authority, PathAndQuery, Scheme};
use http_body_util::BodyExt;
use hyper::header::{self, HeaderMap, HeaderName, HeaderValue};
use hyper::{Request, Response, StatusCode, Uri};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use rustls::{ClientConfig, RootCertStore};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Shared HTTP client for backend requests
pub type HttpClient = Client<HttpsConnector<HttpConnector>, ProxyBody>;

const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Headers that apply to a single connection and are never relayed
const HOP_BY_HOP_HEADERS: [&str; 9] = [
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

/// Create the client used by every forwarder.
///
/// Plain `http://` targets use the connection pool directly; `https://`
/// targets are verified against the platform's native roots.
pub fn create_http_client() -> ProxyResult<HttpClient> {
    let mut roots = RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for e in &native.errors {
        warn!("Failed to load a native root certificate: {}", e);
    }
    let (added, ignored) = roots.add_parsable_certificates(native.certs);
    debug!(
        "Loaded {} native root certificates ({} ignored)",
        added, ignored
    );

    let tls_config = ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()?
    .with_root_certificates(roots)
    .with_no_client_auth();

    let connector = HttpsConnectorBuilder::new()
        .with_tls_config(tls_config)
        .https_or_http()
        .enable_http1()
        .build();

    Ok(Client::builder(TokioExecutor::new()).build(connector))
}

/// Parse a backend address into an absolute `http`/`https` URI
pub fn parse_target(address: &str) -> ProxyResult<Uri> {
    let parse_error = |reason: &str| ProxyError::AddressParse {
        address: address.to_string(),
        reason: reason.to_string(),
    };

    let uri: Uri = address
        .parse()
        .map_err(|e: http::uri::InvalidUri| parse_error(&e.to_string()))?;

    match uri.scheme_str() {
        Some("http") | Some("https") => {}
        Some(other) => return Err(parse_error(&format!("unsupported scheme {:?}", other))),
        None => return Err(parse_error("missing scheme")),
    }
    if uri.authority().is_none() {
        return Err(parse_error("missing host"));
    }

    Ok(uri)
}

/// Relays requests to a single backend, rewriting each request URI onto the
/// target and running the response middleware over every backend reply.
#[derive(Clone)]
pub struct Forwarder {
    scheme: Scheme,
    authority: Authority,
    base_path: String,
    base_query: String,
    client: HttpClient,
    response_middleware: Arc<dyn ResponseMiddleware>,
}

impl fmt::Debug for Forwarder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Forwarder")
            .field("scheme", &self.scheme)
            .field("authority", &self.authority)
            .field("base_path", &self.base_path)
            .finish_non_exhaustive()
    }
}

impl Forwarder {
    /// `target` must be absolute, as returned by [`parse_target`]
    pub fn new(
        target: &Uri,
        client: HttpClient,
        response_middleware: Arc<dyn ResponseMiddleware>,
    ) -> ProxyResult<Self> {
        let missing = |reason: &str| ProxyError::AddressParse {
            address: target.to_string(),
            reason: reason.to_string(),
        };

        Ok(Self {
            scheme: target.scheme().cloned().ok_or_else(|| missing("missing scheme"))?,
            authority: target
                .authority()
                .cloned()
                .ok_or_else(|| missing("missing host"))?,
            base_path: target.path().to_string(),
            base_query: target.query().unwrap_or_default().to_string(),
            client,
            response_middleware,
        })
    }

    /// Forward `req`, converting any failure into a `502 Bad Gateway`
    pub async fn forward(&self, req: ProxyRequest) -> ProxyResponse {
        match self.try_forward(req).await {
            Ok(response) => response,
            Err(e) => {
                error!("Forwarding to {} failed: {}", self.authority, e);
                let mut response = Response::new(body::full("upstream request failed"));
                *response.status_mut() = StatusCode::BAD_GATEWAY;
                response
            }
        }
    }

    pub async fn try_forward(&self, req: ProxyRequest) -> Result<ProxyResponse, ForwardError> {
        let (mut parts, body) = req.into_parts();

        parts.uri = self.rewrite_uri(&parts.uri)?;
        remove_hop_by_hop_headers(&mut parts.headers);
        if let Some(info) = parts.extensions.get::<ConnectionInfo>() {
            append_forwarded_for(&mut parts.headers, &info.peer_addr.ip().to_string());
        }

        debug!("Sending {} request to upstream {}", parts.method, parts.uri);
        let target = parts.uri.to_string();

        let response = self
            .client
            .request(Request::from_parts(parts, body))
            .await
            .map_err(|e| ForwardError::RequestFailed {
                target: target.clone(),
                reason: e.to_string(),
            })?;

        let (mut parts, body) = response.into_parts();
        remove_hop_by_hop_headers(&mut parts.headers);
        debug!("Received {} from upstream {}", parts.status, target);

        self.response_middleware
            .handle(Response::from_parts(parts, body.boxed_unsync()))
            .await
            .map_err(|source| ForwardError::ResponseRejected { target, source })
    }

    /// Map a request URI onto the target: the target path prefixes the request
    /// path and the two query strings are merged
    pub fn rewrite_uri(&self, uri: &Uri) -> Result<Uri, ForwardError> {
        let path = join_paths(&self.base_path, uri.path());
        let query = match (self.base_query.as_str(), uri.query().unwrap_or_default()) {
            ("", q) | (q, "") => q.to_string(),
            (target, request) => format!("{}&{}", target, request),
        };

        let path_and_query = if query.is_empty() {
            path
        } else {
            format!("{}?{}", path, query)
        };

        let invalid = |reason: String| ForwardError::InvalidRequest {
            target: self.authority.to_string(),
            reason,
        };
        let path_and_query: PathAndQuery = path_and_query
            .parse()
            .map_err(|e: http::uri::InvalidUri| invalid(e.to_string()))?;

        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
            .map_err(|e| invalid(e.to_string()))
    }
}

/// Join two paths with exactly one slash between them
fn join_paths(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{}{}", base, &path[1..]),
        (false, false) => format!("{}/{}", base, path),
        _ => format!("{}{}", base, path),
    }
}

fn remove_hop_by_hop_headers(headers: &mut HeaderMap) {
    // Headers named by Connection are hop-by-hop too
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();
    for name in listed {
        headers.remove(name);
    }

    for name in HOP_BY_HOP_HEADERS {
        headers.remove(name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, client_ip: &str) {
    let value = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(prior) => format!("{}, {}", prior, client_ip),
        None => client_ip.to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}
