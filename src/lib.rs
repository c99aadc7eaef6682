pub mod body;
pub mod certs;
pub mod config;
pub mod error;
pub mod forward;
pub mod hosts;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod proxy;
pub mod tls;

// Re-export commonly used types for convenience
pub use certs::{CertificateManager, FileSystemCertificateManager};
pub use config::{AppConfig, HostConfig, LoggingConfig, ServerConfig, TlsConfig};
pub use error::{ProxyError, ProxyResult};
pub use hosts::{Host, HostManager, InMemoryHostManager};
pub use proxy::{ConnectionInfo, Proxy, ProxyOptions};
