use std::fs;
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// Builds the filter: `RUST_LOG` wins, otherwise the configured directives.
pub fn build_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new("info"))
    })
}

/// Console output plus a daily-rolling JSON file under `config.dir`.
///
/// The returned guard flushes the file writer when dropped; hold it until exit.
/// If the log directory cannot be created only the console layer is installed.
pub fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    if let Err(e) = fs::create_dir_all(&config.dir) {
        tracing_subscriber::registry()
            .with(build_filter(config))
            .with(fmt::layer().with_target(true).with_writer(std::io::stdout))
            .init();
        warn!("File logging disabled, cannot create {}: {}", config.dir.display(), e);
        return None;
    }

    let file_appender = tracing_appender::rolling::daily(&config.dir, &config.file_prefix);
    let (writer, guard) = tracing_appender::non_blocking(file_appender);
    let file_layer = fmt::layer().json().with_writer(writer);

    tracing_subscriber::registry()
        .with(build_filter(config))
        .with(file_layer)
        .with(fmt::layer().with_target(true).with_writer(std::io::stdout))
        .init();

    Some(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_directives_fall_back_to_default_level() {
        // Only meaningful when RUST_LOG is not set for the test process
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config = LoggingConfig {
            filter: "dc_campaign_finance=[".into(),
            ..LoggingConfig::default()
        };
        assert!(!build_filter(&config).to_string().contains("dc_campaign_finance"));
    }

    #[test]
    fn configured_directives_are_used() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config = LoggingConfig {
            filter: "dc_campaign_finance=debug".into(),
            ..LoggingConfig::default()
        };
        assert!(build_filter(&config).to_string().contains("dc_campaign_finance=debug"));
    }
}
