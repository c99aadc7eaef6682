use crate::certs::{DEFAULT_CERT_PATH_TEMPLATE, DEFAULT_KEY_PATH_TEMPLATE, SNI_PLACEHOLDER};
use crate::forward::parse_target;
use crate::tls::normalize_server_name;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Hosts registered at startup
    #[serde(default)]
    pub hosts: Vec<HostConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the TLS listener binds to (e.g., "0.0.0.0:8443")
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Certificate file path; `{sni}` is replaced with the requested server name
    #[serde(default = "default_cert_path_template")]
    pub cert_path_template: String,
    /// Private key file path; `{sni}` is replaced with the requested server name
    #[serde(default = "default_key_path_template")]
    pub key_path_template: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log file path; console only when unset
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub json: bool,
    /// Rotate the log file daily
    #[serde(default)]
    pub rotation: bool,
    /// Emit one access-log line per request and collect request metrics
    #[serde(default)]
    pub access_log: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    pub sni: String,
    /// Absolute `http`/`https` URL of the backend
    pub target: String,
}

fn default_bind_address() -> String {
    "0.0.0.0:8443".to_string()
}

fn default_cert_path_template() -> String {
    DEFAULT_CERT_PATH_TEMPLATE.to_string()
}

fn default_key_path_template() -> String {
    DEFAULT_KEY_PATH_TEMPLATE.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            cert_path_template: default_cert_path_template(),
            key_path_template: default_key_path_template(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
            json: false,
            rotation: false,
            access_log: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: AppConfig =
            toml::from_str(&content).with_context(|| "Failed to parse config file")?;
        Ok(config)
    }

    /// Load configuration from file or use default
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::from_file(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config file, using defaults: {}", e);
            Self::default()
        })
    }

    /// Check the configuration before anything is started
    pub fn validate(&self) -> Result<()> {
        self.server
            .bind_address
            .parse::<SocketAddr>()
            .with_context(|| format!("Invalid bind address: {}", self.server.bind_address))?;

        for (name, template) in [
            ("cert_path_template", &self.tls.cert_path_template),
            ("key_path_template", &self.tls.key_path_template),
        ] {
            if !template.contains(SNI_PLACEHOLDER) {
                bail!(
                    "tls.{} must contain the {} placeholder: {}",
                    name,
                    SNI_PLACEHOLDER,
                    template
                );
            }
        }

        let mut seen = HashSet::new();
        for host in &self.hosts {
            if host.sni.trim().is_empty() {
                bail!("Host entry with target {} has an empty sni", host.target);
            }
            if !seen.insert(normalize_server_name(&host.sni)) {
                bail!("Duplicate host entry for sni {}", host.sni);
            }
            parse_target(&host.target)
                .with_context(|| format!("Invalid target for sni {}", host.sni))?;
        }

        Ok(())
    }
}
