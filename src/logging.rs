use crate::config::LoggingConfig;
use anyhow::{Context, Result};
use std::path::Path;
use std::str::FromStr;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Initialize logging system based on configuration.
///
/// Console output always goes to stderr in plain text. When `config.file` is
/// set, a second layer writes to that file, as JSON if `config.json` is set.
/// The returned guard must be held for as long as file logging is wanted.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let env_filter = env_filter(config);

    let Some(log_file) = &config.file else {
        // Console logging only
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(ChronoUtc::rfc_3339());
        let layer: BoxedLayer = if config.json {
            layer.json().with_filter(env_filter).boxed()
        } else {
            layer.with_filter(env_filter).boxed()
        };
        tracing_subscriber::registry().with(layer).init();
        return Ok(None);
    };

    let (writer, guard) = file_writer(log_file, config.rotation)?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339());
    let file_layer: BoxedLayer = if config.json {
        file_layer.json().with_filter(env_filter.clone()).boxed()
    } else {
        file_layer.with_filter(env_filter.clone()).boxed()
    };

    let console_layer: BoxedLayer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_timer(ChronoUtc::rfc_3339())
        .with_filter(env_filter)
        .boxed();

    tracing_subscriber::registry()
        .with(vec![file_layer, console_layer])
        .init();

    Ok(Some(guard))
}

/// RUST_LOG wins over the configured level
fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::from_str(&config.level).unwrap_or_else(|_| EnvFilter::new("info"))
    })
}

fn file_writer(log_file: &str, rotation: bool) -> Result<(NonBlocking, WorkerGuard)> {
    if rotation {
        let path = Path::new(log_file);
        let file_appender = tracing_appender::rolling::daily(
            path.parent().unwrap_or_else(|| Path::new(".")),
            path.file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("sni-proxy.log"),
        );
        return Ok(tracing_appender::non_blocking(file_appender));
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("Failed to open log file: {}", log_file))?;
    Ok(tracing_appender::non_blocking(file))
}
