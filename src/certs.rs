use crate::error::CertificateError;
use async_trait::async_trait;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::sign::CertifiedKey;
use std::io::BufReader;
use std::sync::Arc;
use tokio::fs;
use tracing::debug;

/// Placeholder substituted with the server name in path templates
pub const SNI_PLACEHOLDER: &str = "{sni}";

pub const DEFAULT_CERT_PATH_TEMPLATE: &str = "/etc/ssl/certs/{sni}.cert";
pub const DEFAULT_KEY_PATH_TEMPLATE: &str = "/etc/ssl/certs/{sni}.key";

/// Certificate-management functionality required of a multiple-host proxy.
///
/// Implementations are called once per handshake and must not cache on
/// behalf of the proxy; wrap a manager if caching is wanted.
#[async_trait]
pub trait CertificateManager: Send + Sync {
    async fn get_certificate(&self, sni: &str) -> Result<Arc<CertifiedKey>, CertificateError>;
}

/// Loads a PEM certificate chain and private key from disk for each server
/// name, using two path templates containing `{sni}`.
pub struct FileSystemCertificateManager {
    cert_path_template: String,
    key_path_template: String,
    provider: Arc<CryptoProvider>,
}

impl FileSystemCertificateManager {
    pub fn new(cert_path_template: impl Into<String>, key_path_template: impl Into<String>) -> Self {
        Self {
            cert_path_template: cert_path_template.into(),
            key_path_template: key_path_template.into(),
            provider: Arc::new(rustls::crypto::ring::default_provider()),
        }
    }

    pub fn cert_path(&self, sni: &str) -> String {
        self.cert_path_template.replace(SNI_PLACEHOLDER, sni)
    }

    pub fn key_path(&self, sni: &str) -> String {
        self.key_path_template.replace(SNI_PLACEHOLDER, sni)
    }

    /// Load and pair a PEM certificate chain with its PEM private key
    pub async fn load_key_pair(
        &self,
        sni: &str,
        cert_path: &str,
        key_path: &str,
    ) -> Result<Arc<CertifiedKey>, CertificateError> {
        let cert_bytes = read_file(cert_path).await?;
        let key_bytes = read_file(key_path).await?;

        let certs = parse_certificates(cert_path, &cert_bytes)?;
        let key = parse_private_key(key_path, &key_bytes)?;

        let signing_key = self
            .provider
            .key_provider
            .load_private_key(key)
            .map_err(|e| CertificateError::PrivateKey {
                path: key_path.to_string(),
                reason: e.to_string(),
            })?;

        let certified_key = CertifiedKey::new(certs, signing_key);
        match certified_key.keys_match() {
            // Providers that cannot expose the public key are trusted as-is
            Ok(()) | Err(rustls::Error::InconsistentKeys(rustls::InconsistentKeys::Unknown)) => {}
            Err(e) => {
                return Err(CertificateError::KeyMismatch {
                    sni: sni.to_string(),
                    reason: e.to_string(),
                });
            }
        }

        Ok(Arc::new(certified_key))
    }
}

impl Default for FileSystemCertificateManager {
    fn default() -> Self {
        Self::new(DEFAULT_CERT_PATH_TEMPLATE, DEFAULT_KEY_PATH_TEMPLATE)
    }
}

#[async_trait]
impl CertificateManager for FileSystemCertificateManager {
    async fn get_certificate(&self, sni: &str) -> Result<Arc<CertifiedKey>, CertificateError> {
        validate_server_name(sni)?;

        let cert_path = self.cert_path(sni);
        let key_path = self.key_path(sni);
        debug!(
            "Loading certificate for {} from {} and {}",
            sni, cert_path, key_path
        );

        self.load_key_pair(sni, &cert_path, &key_path).await
    }
}

/// Reject server names that could escape the certificate directory.
///
/// Accepts dot-separated labels of ASCII letters, digits, '-' and '_'.
pub fn validate_server_name(sni: &str) -> Result<(), CertificateError> {
    let unsafe_name = || CertificateError::UnsafeServerName {
        sni: sni.to_string(),
    };

    if sni.is_empty() || sni.len() > 253 {
        return Err(unsafe_name());
    }

    for label in sni.split('.') {
        if label.is_empty() || label.len() > 63 {
            return Err(unsafe_name());
        }
        if !label
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(unsafe_name());
        }
    }

    Ok(())
}

async fn read_file(path: &str) -> Result<Vec<u8>, CertificateError> {
    fs::read(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            CertificateError::FileNotFound {
                path: path.to_string(),
            }
        } else {
            CertificateError::LoadFailed {
                path: path.to_string(),
                reason: e.to_string(),
            }
        }
    })
}

fn parse_certificates(
    path: &str,
    pem: &[u8],
) -> Result<Vec<CertificateDer<'static>>, CertificateError> {
    let mut reader = BufReader::new(pem);
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CertificateError::InvalidFormat {
            path: path.to_string(),
            reason: e.to_string(),
        })?;

    if certs.is_empty() {
        return Err(CertificateError::InvalidFormat {
            path: path.to_string(),
            reason: "no certificates found".to_string(),
        });
    }

    Ok(certs)
}

fn parse_private_key(path: &str, pem: &[u8]) -> Result<PrivateKeyDer<'static>, CertificateError> {
    let mut reader = BufReader::new(pem);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| CertificateError::PrivateKey {
            path: path.to_string(),
            reason: e.to_string(),
        })?
        .ok_or_else(|| CertificateError::PrivateKey {
            path: path.to_string(),
            reason: "no private key found".to_string(),
        })
}
