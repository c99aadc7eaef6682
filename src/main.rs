use anyhow::{Context, Result};
use sni_proxy::certs::FileSystemCertificateManager;
use sni_proxy::config::AppConfig;
use sni_proxy::logging;
use sni_proxy::metrics::ProxyMetrics;
use sni_proxy::middleware::{RequestMiddlewareChain, request_metrics};
use sni_proxy::proxy::Proxy;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    // Load config first (before logging init) to get logging config; a load
    // failure is reported once logging is up
    let (config, load_error) = match AppConfig::from_file(&config_path) {
        Ok(config) => (config, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };

    // Validate configuration before starting
    config
        .validate()
        .context("Configuration validation failed")?;

    // Initialize logging system
    let _guard =
        logging::init_logging(&config.logging).context("Failed to initialize logging system")?;

    info!("SNI Proxy starting...");
    if let Some(e) = load_error {
        warn!("Failed to load config file {}, using defaults: {:#}", config_path, e);
    }
    info!(
        "Logging initialized - level: {}, file: {:?}, json: {}",
        config.logging.level, config.logging.file, config.logging.json
    );

    let metrics = Arc::new(ProxyMetrics::new());
    let mut proxy = Proxy::new()
        .context("Failed to create proxy")?
        .with_certificate_manager(FileSystemCertificateManager::new(
            config.tls.cert_path_template.clone(),
            config.tls.key_path_template.clone(),
        ));
    if config.logging.access_log {
        proxy = proxy.with_request_middleware(RequestMiddlewareChain::new([request_metrics(
            Arc::clone(&metrics),
        )]));
    }

    for host in &config.hosts {
        proxy
            .add_host(&host.sni, &host.target)
            .await
            .with_context(|| format!("Failed to add host {}", host.sni))?;
    }

    info!(
        "SNI Proxy serving {} host(s) on {}. Press Ctrl+C to shutdown.",
        config.hosts.len(),
        config.server.bind_address
    );

    tokio::select! {
        result = proxy.listen_and_serve_tls(&config.server.bind_address) => {
            result.context("SNI Proxy stopped")?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            info!("Shutdown signal received, shutting down...");
        }
    }

    let snapshot = metrics.snapshot();
    if snapshot.total_requests > 0 {
        info!(
            "Served {} requests ({:.1}% successful, avg {:.2} ms)",
            snapshot.total_requests,
            snapshot.success_rate,
            snapshot.average_processing_time_ms
        );
    }

    Ok(())
}
