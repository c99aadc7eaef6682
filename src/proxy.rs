//! Multiple-host SNI-based reverse proxy.
//!
//! # Connection lifecycle
//! ```text
//! Accepting
//!     → Handshaking (SNI registered? → certificate resolved?)
//!         → Established → Dispatching → Forwarding → Responding
//!         | Rejected (TLS alert, no HTTP exchange)
//! ```
//!
//! Routing happens twice: once during the handshake, to decide whether to
//! offer a certificate at all, and again per request as the terminal stage
//! of the request middleware chain, so a host removed after the handshake
//! stops receiving traffic on live connections.

use crate::body::ProxyRequest;
use crate::certs::{CertificateManager, FileSystemCertificateManager};
use crate::error::{ProxyError, ProxyResult};
use crate::forward::{Forwarder, HttpClient, create_http_client, parse_target};
use crate::hosts::{Host, HostManager, InMemoryHostManager};
use crate::middleware::request::{self, RequestMiddleware, ResponseWriter};
use crate::middleware::{NoopRequestMiddleware, NoopResponseMiddleware, ResponseMiddleware};
use crate::tls::{HandshakeConfigs, normalize_server_name};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, StatusCode};
use hyper_util::rt::TokioIo;
use rustls::server::Acceptor;
use rustls::ServerConfig;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::LazyConfigAcceptor;
use tracing::{debug, error, info, warn};

/// TLS details of the connection a request arrived on, attached to every
/// request as an extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Normalized server name presented during the handshake
    pub server_name: String,
    pub peer_addr: SocketAddr,
}

/// Pluggable collaborators of the proxy.
///
/// Defaults:
/// - `request_middleware`: [`NoopRequestMiddleware`]
/// - `response_middleware`: [`NoopResponseMiddleware`]
/// - `host_manager`: [`InMemoryHostManager`]
/// - `certificate_manager`: [`FileSystemCertificateManager`] reading
///   `/etc/ssl/certs/{sni}.cert` and `/etc/ssl/certs/{sni}.key`
#[derive(Clone)]
pub struct ProxyOptions {
    pub request_middleware: Arc<dyn RequestMiddleware>,
    pub response_middleware: Arc<dyn ResponseMiddleware>,
    pub host_manager: Arc<dyn HostManager>,
    pub certificate_manager: Arc<dyn CertificateManager>,
}

impl Default for ProxyOptions {
    fn default() -> Self {
        Self {
            request_middleware: Arc::new(NoopRequestMiddleware::new()),
            response_middleware: Arc::new(NoopResponseMiddleware::new()),
            host_manager: Arc::new(InMemoryHostManager::new()),
            certificate_manager: Arc::new(FileSystemCertificateManager::default()),
        }
    }
}

/// Multiple-host SNI-based reverse proxy
pub struct Proxy {
    options: ProxyOptions,
    client: HttpClient,
}

impl Proxy {
    /// Proxy with the default options
    pub fn new() -> ProxyResult<Self> {
        Self::with_options(ProxyOptions::default())
    }

    pub fn with_options(options: ProxyOptions) -> ProxyResult<Self> {
        Ok(Self {
            options,
            client: create_http_client()?,
        })
    }

    /// Set the request-processing middleware
    pub fn with_request_middleware(mut self, middleware: impl RequestMiddleware + 'static) -> Self {
        self.options.request_middleware = Arc::new(middleware);
        self
    }

    /// Set the response-processing middleware.
    ///
    /// Applies to hosts added afterwards; existing forwarders keep the chain
    /// they were built with.
    pub fn with_response_middleware(
        mut self,
        middleware: impl ResponseMiddleware + 'static,
    ) -> Self {
        self.options.response_middleware = Arc::new(middleware);
        self
    }

    pub fn with_host_manager(mut self, host_manager: impl HostManager + 'static) -> Self {
        self.options.host_manager = Arc::new(host_manager);
        self
    }

    pub fn with_certificate_manager(
        mut self,
        certificate_manager: impl CertificateManager + 'static,
    ) -> Self {
        self.options.certificate_manager = Arc::new(certificate_manager);
        self
    }

    pub fn host_manager(&self) -> &Arc<dyn HostManager> {
        &self.options.host_manager
    }

    /// Route connections presenting `sni` to the backend at `address`.
    ///
    /// The registry is left untouched when `address` is not an absolute
    /// `http`/`https` URL.
    pub async fn add_host(&self, sni: &str, address: &str) -> ProxyResult<()> {
        let target = parse_target(address)?;
        let forwarder = Forwarder::new(
            &target,
            self.client.clone(),
            Arc::clone(&self.options.response_middleware),
        )?;

        let sni = normalize_server_name(sni);
        self.options
            .host_manager
            .put_host(&sni, address, forwarder)
            .await?;

        info!("Added target host {} -> {}", sni, address);
        Ok(())
    }

    pub async fn remove_host(&self, sni: &str) -> ProxyResult<()> {
        let sni = normalize_server_name(sni);
        self.options.host_manager.remove_host(&sni).await?;
        info!("Removed target host {}", sni);
        Ok(())
    }

    /// Bind `addr` and serve TLS connections until the listener fails
    pub async fn listen_and_serve_tls(&self, addr: &str) -> ProxyResult<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serve TLS connections accepted from `listener`
    pub async fn serve(&self, listener: TcpListener) -> ProxyResult<()> {
        let dispatcher = Dispatcher {
            hosts: Arc::clone(&self.options.host_manager),
            certificates: Arc::clone(&self.options.certificate_manager),
            handler: self.request_handler(),
            tls: Arc::new(HandshakeConfigs::new()?),
        };

        info!("SNI proxy listening on TCP {}", listener.local_addr()?);

        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let dispatcher = dispatcher.clone();
                    tokio::spawn(async move {
                        dispatcher.handle_connection(stream, peer_addr).await;
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                    // Small delay to prevent a tight error loop
                    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
                }
            }
        }
    }

    /// The request middleware with "look up host by SNI and forward" as its
    /// terminal stage
    fn request_handler(&self) -> Arc<dyn RequestMiddleware> {
        let hosts = Arc::clone(&self.options.host_manager);
        self.options
            .request_middleware
            .wrap(request::handler_fn(move |rw, req| {
                let hosts = Arc::clone(&hosts);
                async move { route_request(hosts.as_ref(), rw, req).await }
            }))
    }
}

/// Per-connection state shared by all accepted connections
#[derive(Clone)]
struct Dispatcher {
    hosts: Arc<dyn HostManager>,
    certificates: Arc<dyn CertificateManager>,
    handler: Arc<dyn RequestMiddleware>,
    tls: Arc<HandshakeConfigs>,
}

impl Dispatcher {
    async fn handle_connection(self, stream: TcpStream, peer_addr: SocketAddr) {
        let start = match LazyConfigAcceptor::new(Acceptor::default(), stream).await {
            Ok(start) => start,
            Err(e) => {
                debug!("Failed to read ClientHello from {}: {}", peer_addr, e);
                return;
            }
        };

        let server_name = start.client_hello().server_name().map(normalize_server_name);

        let (server_name, config) = match self.select_certificate(server_name).await {
            Ok(selected) => selected,
            Err(e) => {
                warn!("Rejecting TLS handshake from {}: {}", peer_addr, e);
                if let Err(e) = start.into_stream(self.tls.reject()).await {
                    debug!("Rejected handshake from {} closed: {}", peer_addr, e);
                }
                return;
            }
        };

        let tls_stream = match start.into_stream(config).await {
            Ok(tls_stream) => tls_stream,
            Err(e) => {
                error!("TLS handshake error from {}: {}", peer_addr, e);
                return;
            }
        };

        debug!("TLS established with {} for {}", peer_addr, server_name);

        let info = ConnectionInfo {
            server_name,
            peer_addr,
        };
        let handler = Arc::clone(&self.handler);
        let service = service_fn(move |req: Request<Incoming>| {
            let handler = Arc::clone(&handler);
            let info = info.clone();
            async move {
                let mut req = req.map(|body| body.boxed_unsync());
                req.extensions_mut().insert(info);
                let rw = handler.handle(ResponseWriter::new(), req).await;
                Ok::<_, Infallible>(rw.into_response())
            }
        });

        if let Err(e) = http1::Builder::new()
            .serve_connection(TokioIo::new(tls_stream), service)
            .await
        {
            debug!("Connection error from {}: {}", peer_addr, e);
        }
    }

    /// Decide whether to complete a handshake, and with which certificate
    async fn select_certificate(
        &self,
        server_name: Option<String>,
    ) -> ProxyResult<(String, Arc<ServerConfig>)> {
        let sni = server_name.ok_or_else(|| ProxyError::HostNotFound { sni: String::new() })?;

        lookup_host(self.hosts.as_ref(), &sni).await?;
        let certificate = self.certificates.get_certificate(&sni).await?;
        let config = self.tls.accept_with(certificate)?;

        Ok((sni, config))
    }
}

async fn lookup_host(hosts: &dyn HostManager, sni: &str) -> ProxyResult<Arc<Host>> {
    hosts
        .get_host(sni)
        .await?
        .ok_or_else(|| ProxyError::HostNotFound {
            sni: sni.to_string(),
        })
}

/// Terminal stage of the request chain: locate the host by SNI and forward
async fn route_request(
    hosts: &dyn HostManager,
    mut rw: ResponseWriter,
    req: ProxyRequest,
) -> ResponseWriter {
    let sni = req
        .extensions()
        .get::<ConnectionInfo>()
        .map(|info| info.server_name.clone())
        .unwrap_or_default();

    match lookup_host(hosts, &sni).await {
        Ok(host) => {
            debug!("Forwarding {} {} to {}", req.method(), req.uri(), host.address);
            rw.write(host.forwarder.forward(req).await);
        }
        Err(e @ ProxyError::HostNotFound { .. }) => {
            debug!("{}", e);
            rw.write_text(StatusCode::BAD_REQUEST, e.to_string());
        }
        Err(e) => {
            error!("Host lookup failed for SNI {}: {}", sni, e);
            rw.write_text(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to get target host for SNI \"{}\": {}", sni, e),
            );
        }
    }

    rw
}
