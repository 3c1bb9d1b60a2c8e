//! Logging and tracing setup

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use crate::infrastructure::config::LoggingConfig;

/// Installs the global tracing subscriber from configuration.
///
/// `RUST_LOG` wins over the configured filter; the configured `filter`
/// wins over the plain `level`.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let fallback = config
        .filter
        .clone()
        .unwrap_or_else(|| format!("idios={},tower_http=info,lapin=warn", config.level));
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    if config.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {e}"))?;
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {e}"))?;
    }

    Ok(())
}
