//! Tracing initialization with configurable logging formats.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogFormat, LoggingConfig};

/// Crates whose debug output drowns out the jobs' own logs.
const QUIET_DEPENDENCIES: &str = "hyper=warn,hyper_util=warn,h2=warn,rustls=warn,reqwest=warn,tiberius=warn,azure_core=info,azure_identity=info";

/// Initialize the global tracing subscriber.
///
/// This sets up:
/// - Console logging with configurable format (pretty, compact, JSON)
/// - Environment-based log filtering (`RUST_LOG` takes precedence)
pub fn init_tracing(logging: &LoggingConfig) -> Result<(), TracingError> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let filter = build_env_filter(logging, rust_log.as_deref());

    let result = match (&logging.format, logging.timestamps) {
        (LogFormat::Pretty, true) => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .pretty()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(logging.file_line)
                .with_line_number(logging.file_line);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
        }
        (LogFormat::Pretty, false) => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .pretty()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(logging.file_line)
                .with_line_number(logging.file_line)
                .without_time();
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
        }
        (LogFormat::Compact, true) => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_target(true)
                .with_file(logging.file_line)
                .with_line_number(logging.file_line);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
        }
        (LogFormat::Compact, false) => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_target(true)
                .with_file(logging.file_line)
                .with_line_number(logging.file_line)
                .without_time();
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
        }
        (LogFormat::Json, true) => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_file(logging.file_line)
                .with_line_number(logging.file_line)
                .with_current_span(true);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
        }
        (LogFormat::Json, false) => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_file(logging.file_line)
                .with_line_number(logging.file_line)
                .with_current_span(true)
                .without_time();
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
        }
    };

    result.map_err(|e| TracingError::Init(e.to_string()))
}

/// Build the environment filter from logging config.
fn build_env_filter(config: &LoggingConfig, rust_log: Option<&str>) -> EnvFilter {
    let base_level = config.level.as_str();
    EnvFilter::try_new(filter_directives(config, rust_log))
        .unwrap_or_else(|_| EnvFilter::new(base_level))
}

/// Filter directives in order of precedence: `RUST_LOG`, then the configured
/// filter appended to the level, then the level with noisy crates quieted.
fn filter_directives(config: &LoggingConfig, rust_log: Option<&str>) -> String {
    let base_level = config.level.as_str();

    if let Some(env_filter) = rust_log.filter(|f| !f.trim().is_empty()) {
        env_filter.to_string()
    } else if let Some(filter) = &config.filter {
        format!("{},{}", base_level, filter)
    } else {
        format!("{},{}", base_level, QUIET_DEPENDENCIES)
    }
}

/// Tracing initialization errors.
#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("Failed to initialize tracing: {0}")]
    Init(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn test_rust_log_takes_precedence() {
        let config = LoggingConfig {
            filter: Some("culler=trace".to_string()),
            ..Default::default()
        };
        assert_eq!(
            filter_directives(&config, Some("culler=debug")),
            "culler=debug"
        );
        // Blank RUST_LOG is ignored
        assert_eq!(filter_directives(&config, Some("  ")), "info,culler=trace");
    }

    #[test]
    fn test_default_filter_quiets_dependencies() {
        let config = LoggingConfig {
            level: LogLevel::Debug,
            ..Default::default()
        };
        let directives = filter_directives(&config, None);
        assert!(directives.starts_with("debug,"));
        assert!(directives.contains("tiberius=warn"));
        assert!(directives.contains("reqwest=warn"));
    }

    #[test]
    fn test_invalid_directives_fall_back_to_level() {
        let config = LoggingConfig {
            level: LogLevel::Warn,
            ..Default::default()
        };
        let filter = build_env_filter(&config, Some("culler=notalevel"));
        assert_eq!(filter.to_string(), "warn");
    }
}
