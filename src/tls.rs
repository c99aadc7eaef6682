//! Handshake-time certificate selection.
//!
//! The dispatcher reads the ClientHello first, decides on a certificate
//! asynchronously, and only then hands rustls a configuration for that one
//! handshake. Rejected handshakes are driven through a configuration whose
//! resolver never yields a certificate, so the peer receives a plain TLS
//! alert and nothing else.

use rustls::ServerConfig;
use rustls::crypto::CryptoProvider;
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use std::sync::Arc;

/// Certificate chosen for a single handshake
#[derive(Debug)]
struct SelectedCertificate(Arc<CertifiedKey>);

impl ResolvesServerCert for SelectedCertificate {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        Some(Arc::clone(&self.0))
    }
}

/// Resolver that fails every handshake
#[derive(Debug)]
struct RejectHandshake;

impl ResolvesServerCert for RejectHandshake {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        None
    }
}

/// Builds per-handshake server configurations
#[derive(Debug)]
pub struct HandshakeConfigs {
    provider: Arc<CryptoProvider>,
    reject: Arc<ServerConfig>,
}

impl HandshakeConfigs {
    pub fn new() -> Result<Self, rustls::Error> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let reject = Arc::new(server_config(&provider, Arc::new(RejectHandshake))?);
        Ok(Self { provider, reject })
    }

    /// Configuration completing the handshake with `certificate`
    pub fn accept_with(
        &self,
        certificate: Arc<CertifiedKey>,
    ) -> Result<Arc<ServerConfig>, rustls::Error> {
        let config = server_config(&self.provider, Arc::new(SelectedCertificate(certificate)))?;
        Ok(Arc::new(config))
    }

    /// Configuration that aborts the handshake with an alert
    pub fn reject(&self) -> Arc<ServerConfig> {
        Arc::clone(&self.reject)
    }
}

fn server_config(
    provider: &Arc<CryptoProvider>,
    resolver: Arc<dyn ResolvesServerCert>,
) -> Result<ServerConfig, rustls::Error> {
    let mut config = ServerConfig::builder_with_provider(Arc::clone(provider))
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_cert_resolver(resolver);
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(config)
}

/// Normalize a requested server name: lowercase, trailing dot trimmed
pub fn normalize_server_name(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}
