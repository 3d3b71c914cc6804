//! Tracing subscriber setup for the binary and for embedders.

use std::sync::OnceLock;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::config::{LogFormat, LoggingConfig};
use crate::error::TextmillError;

static INSTALLED: OnceLock<()> = OnceLock::new();

/// Installs the global subscriber and routes `log` records into it.
///
/// `RUST_LOG` overrides the configured level. Calling this again after a
/// successful call does nothing.
pub fn init(config: &LoggingConfig) -> Result<(), TextmillError> {
    if INSTALLED.get().is_some() {
        return Ok(());
    }

    let subscriber = tracing_subscriber::registry()
        .with(create_fmt_layer(config.format))
        .with(create_env_filter(config)?);

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| TextmillError::Logging(format!("Failed to initialize tracing: {}", e)))?;
    tracing_log::LogTracer::init()
        .map_err(|e| TextmillError::Logging(format!("Failed to bridge log records: {}", e)))?;

    let _ = INSTALLED.set(());
    Ok(())
}

fn create_env_filter(config: &LoggingConfig) -> Result<EnvFilter, TextmillError> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| TextmillError::Logging(format!("Failed to create env filter: {}", e)))
}

fn create_fmt_layer(format: LogFormat) -> Box<dyn Layer<Registry> + Send + Sync> {
    match format {
        LogFormat::Pretty => fmt::layer().with_target(true).with_level(true).boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .boxed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_init_is_idempotent() {
        let config = LoggingConfig::default();
        init(&config).unwrap();
        init(&config).unwrap();
        log::info!("routed through tracing");
    }

    #[test]
    #[serial]
    fn test_env_filter_from_config() {
        std::env::remove_var("RUST_LOG");
        let config = LoggingConfig {
            level: "textmill=debug,warn".to_string(),
            ..Default::default()
        };
        let filter = create_env_filter(&config).unwrap();
        assert!(filter.to_string().contains("textmill=debug"));
    }
}
