use std::str::FromStr;

use super::{ConfigError, lookup_var, process_env};

pub const LOG_LEVEL_VAR: &str = "LOG_LEVEL";
pub const LOG_FORMAT_VAR: &str = "LOG_FORMAT";
pub const LOG_FILTER_VAR: &str = "LOG_FILTER";

// ─────────────────────────────────────────────────────────────────────────────
// Logging
// ─────────────────────────────────────────────────────────────────────────────

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level.
    pub level: LogLevel,

    /// Log format.
    pub format: LogFormat,

    /// Include timestamps.
    pub timestamps: bool,

    /// Include file/line information.
    pub file_line: bool,

    /// Filter directives (e.g., "culler=debug,tiberius=warn").
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::default(),
            format: LogFormat::default(),
            timestamps: true,
            file_line: false,
            filter: None,
        }
    }
}

impl LoggingConfig {
    /// Resolve logging settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&process_env)
    }

    pub fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup_var(lookup, LOG_LEVEL_VAR) {
            config.level = raw.parse::<LogLevel>().map_err(|reason| ConfigError::Invalid {
                name: LOG_LEVEL_VAR,
                value: raw.clone(),
                reason,
            })?;
        }

        if let Some(raw) = lookup_var(lookup, LOG_FORMAT_VAR) {
            config.format = raw.parse::<LogFormat>().map_err(|reason| ConfigError::Invalid {
                name: LOG_FORMAT_VAR,
                value: raw.clone(),
                reason,
            })?;
        }

        config.filter = lookup_var(lookup, LOG_FILTER_VAR);
        Ok(config)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" | "information" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable multi-line format.
    Pretty,
    /// Compact single-line format.
    #[default]
    Compact,
    /// JSON format (for log aggregation).
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_logging_config() {
        let config = LoggingConfig::from_lookup(&|_: &str| None).unwrap();
        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.format, LogFormat::Compact);
        assert!(config.timestamps);
        assert!(config.filter.is_none());
    }

    #[test]
    fn test_parse_level_and_format() {
        let lookup = |k: &str| match k {
            "LOG_LEVEL" => Some("Warning".to_string()),
            "LOG_FORMAT" => Some("JSON".to_string()),
            "LOG_FILTER" => Some("tiberius=debug".to_string()),
            _ => None,
        };
        let config = LoggingConfig::from_lookup(&lookup).unwrap();
        assert_eq!(config.level, LogLevel::Warn);
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.filter.as_deref(), Some("tiberius=debug"));
    }

    #[test]
    fn test_unknown_format_rejected() {
        let lookup = |k: &str| (k == "LOG_FORMAT").then(|| "xml".to_string());
        let err = LoggingConfig::from_lookup(&lookup).unwrap_err();
        assert!(err.to_string().contains("unknown log format 'xml'"));
    }
}
