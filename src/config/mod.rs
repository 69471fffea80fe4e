//! Configuration module for the cleanup jobs.
//!
//! Both jobs are configured entirely through the process environment. The
//! environment is read fresh on every invocation, so a scheduled runner picks
//! up changes between runs without a restart.
//!
//! # Example
//!
//! ```sh
//! STORAGE_ACCOUNT_NAME=contosoarchive
//! SQL_SERVER=contoso.database.windows.net
//! SQL_DATABASE=operations
//! RETENTION_DAYS=90
//! ```

mod database;
mod observability;
mod retention;
mod storage;

pub use database::*;
pub use observability::*;
pub use retention::*;
pub use storage::*;

/// Configuration errors. These are always fatal: a job that cannot resolve its
/// configuration attempts no work.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is not set")]
    Missing(&'static str),

    #[error("Missing required environment variables: {}", .0.join(" and/or "))]
    MissingAll(Vec<&'static str>),

    #[error("Invalid value for {name}: {value:?} ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Read a variable, treating empty and whitespace-only values as unset.
pub(crate) fn lookup_var<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse an optional numeric variable, falling back to `default` when unset.
pub(crate) fn parse_var<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup_var(lookup, name) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}

/// Environment lookup backed by the real process environment.
pub(crate) fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_lookup_var_blank_is_unset() {
        let lookup = env(&[("A", "   "), ("B", " value ")]);
        assert_eq!(lookup_var(&lookup, "A"), None);
        assert_eq!(lookup_var(&lookup, "B").as_deref(), Some("value"));
        assert_eq!(lookup_var(&lookup, "C"), None);
    }

    #[test]
    fn test_parse_var_default_and_invalid() {
        let lookup = env(&[("PORT", "not-a-number")]);
        assert_eq!(parse_var(&lookup, "MISSING", 7u16).unwrap(), 7);

        let err = parse_var(&lookup, "PORT", 1433u16).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "PORT", .. }));
        assert!(err.to_string().contains("not-a-number"));
    }

    #[test]
    fn test_missing_all_message() {
        let err = ConfigError::MissingAll(vec!["SQL_SERVER", "SQL_DATABASE"]);
        assert_eq!(
            err.to_string(),
            "Missing required environment variables: SQL_SERVER and/or SQL_DATABASE"
        );
    }
}
