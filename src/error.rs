//! Error types for the SNI proxy

use thiserror::Error;

/// Main error type for proxy operations
#[derive(Error, Debug)]
pub enum ProxyError {
    /// Backend address passed to `add_host` could not be parsed
    #[error("failed to parse target address \"{address}\": {reason}")]
    AddressParse { address: String, reason: String },

    /// Host registry failure (not "unknown host")
    #[error("host registry error: {0}")]
    Registry(#[from] RegistryError),

    /// No host registered for the server name
    #[error("no target host available for SNI \"{sni}\"")]
    HostNotFound { sni: String },

    /// Certificate errors
    #[error("certificate error: {0}")]
    Certificate(#[from] CertificateError),

    /// TLS configuration errors
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Network I/O errors
    #[error("network I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Internal failures of a host registry
#[derive(Error, Debug)]
pub enum RegistryError {
    /// A writer panicked while holding the registry lock
    #[error("host registry lock poisoned")]
    Poisoned,

    /// Failure reported by a registry backed by an external store
    #[error("host registry backend failure: {0}")]
    Backend(String),
}

/// Certificate-related errors
#[derive(Error, Debug)]
pub enum CertificateError {
    /// Certificate or key file not found
    #[error("certificate file not found: {path}")]
    FileNotFound { path: String },

    /// Failed to read a certificate or key file
    #[error("failed to load certificate from {path}: {reason}")]
    LoadFailed { path: String, reason: String },

    /// Invalid certificate format
    #[error("invalid certificate format in {path}: {reason}")]
    InvalidFormat { path: String, reason: String },

    /// Private key error
    #[error("private key error in {path}: {reason}")]
    PrivateKey { path: String, reason: String },

    /// Certificate and key do not belong together
    #[error("certificate and private key for {sni} do not match: {reason}")]
    KeyMismatch { sni: String, reason: String },

    /// Server name cannot be used to build a file path
    #[error("refusing to resolve certificate for unsafe server name: {sni:?}")]
    UnsafeServerName { sni: String },
}

/// Failure signalled by a response middleware node
#[derive(Error, Debug)]
#[error("response middleware failed: {message}")]
pub struct ResponseMiddlewareError {
    message: String,
}

impl ResponseMiddlewareError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors raised while relaying a request to a backend
#[derive(Error, Debug)]
pub enum ForwardError {
    /// Request could not be rebuilt for the backend
    #[error("failed to build upstream request to {target}: {reason}")]
    InvalidRequest { target: String, reason: String },

    /// Backend could not be reached or the exchange failed
    #[error("upstream request to {target} failed: {reason}")]
    RequestFailed { target: String, reason: String },

    /// Response middleware rejected the backend response
    #[error("response from {target} rejected: {source}")]
    ResponseRejected {
        target: String,
        #[source]
        source: ResponseMiddlewareError,
    },
}

/// Result type alias for convenience
pub type ProxyResult<T> = Result<T, ProxyError>;
