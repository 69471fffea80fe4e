//! Blob cleanup job configuration.
//!
//! ```sh
//! STORAGE_ACCOUNT_NAME=contosoarchive
//! # Optional: point at Azurite or a sovereign cloud endpoint
//! STORAGE_BLOB_ENDPOINT=http://127.0.0.1:10000/devstoreaccount1
//! ```

use super::{ConfigError, RetentionConfig, lookup_var, process_env};

pub const STORAGE_ACCOUNT_NAME_VAR: &str = "STORAGE_ACCOUNT_NAME";
pub const STORAGE_BLOB_ENDPOINT_VAR: &str = "STORAGE_BLOB_ENDPOINT";
pub const AZURE_CLIENT_ID_VAR: &str = "AZURE_CLIENT_ID";

/// Configuration for the blob retention job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobJobConfig {
    /// Storage account name (required).
    pub account_name: String,

    /// Blob service endpoint override. When unset the public cloud endpoint
    /// for `account_name` is used.
    pub endpoint: Option<String>,

    /// Client ID of a user-assigned managed identity.
    /// When unset the system-assigned identity is used.
    pub managed_identity_client_id: Option<String>,

    /// Retention window.
    pub retention: RetentionConfig,
}

impl BlobJobConfig {
    /// Resolve the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&process_env)
    }

    /// Resolve the configuration from an arbitrary lookup function.
    pub fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let account_name = lookup_var(lookup, STORAGE_ACCOUNT_NAME_VAR)
            .ok_or(ConfigError::Missing(STORAGE_ACCOUNT_NAME_VAR))?;

        let config = Self {
            account_name,
            endpoint: lookup_var(lookup, STORAGE_BLOB_ENDPOINT_VAR),
            managed_identity_client_id: lookup_var(lookup, AZURE_CLIENT_ID_VAR),
            retention: RetentionConfig::from_lookup(lookup)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Account names are 3-24 lowercase letters and digits.
        let name = &self.account_name;
        let valid_name = (3..=24).contains(&name.len())
            && name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
        if !valid_name {
            return Err(ConfigError::Invalid {
                name: STORAGE_ACCOUNT_NAME_VAR,
                value: name.clone(),
                reason: "expected 3-24 lowercase letters or digits".to_string(),
            });
        }

        if let Some(endpoint) = &self.endpoint {
            url::Url::parse(endpoint).map_err(|e| ConfigError::Invalid {
                name: STORAGE_BLOB_ENDPOINT_VAR,
                value: endpoint.clone(),
                reason: e.to_string(),
            })?;
        }

        Ok(())
    }

    /// The blob service URL for this account.
    pub fn account_url(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://{}.blob.core.windows.net", self.account_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serial_test::serial;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_missing_account_name_is_fatal() {
        let err = BlobJobConfig::from_lookup(&env(&[("RETENTION_DAYS", "30")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(STORAGE_ACCOUNT_NAME_VAR)));
        assert_eq!(
            err.to_string(),
            "STORAGE_ACCOUNT_NAME environment variable is not set"
        );
    }

    #[test]
    fn test_minimal_config() {
        let config =
            BlobJobConfig::from_lookup(&env(&[("STORAGE_ACCOUNT_NAME", "contosoarchive")]))
                .unwrap();
        assert_eq!(config.account_name, "contosoarchive");
        assert_eq!(config.retention.retention_days, 90);
        assert_eq!(config.managed_identity_client_id, None);
        assert_eq!(
            config.account_url(),
            "https://contosoarchive.blob.core.windows.net"
        );
    }

    #[test]
    fn test_endpoint_override() {
        let config = BlobJobConfig::from_lookup(&env(&[
            ("STORAGE_ACCOUNT_NAME", "devstoreaccount1"),
            (
                "STORAGE_BLOB_ENDPOINT",
                "http://127.0.0.1:10000/devstoreaccount1/",
            ),
            ("AZURE_CLIENT_ID", "00000000-0000-0000-0000-000000000001"),
        ]))
        .unwrap();
        assert_eq!(
            config.account_url(),
            "http://127.0.0.1:10000/devstoreaccount1"
        );
        assert_eq!(
            config.managed_identity_client_id.as_deref(),
            Some("00000000-0000-0000-0000-000000000001")
        );
    }

    #[test]
    fn test_invalid_account_name() {
        let err = BlobJobConfig::from_lookup(&env(&[("STORAGE_ACCOUNT_NAME", "Not_Valid")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: STORAGE_ACCOUNT_NAME_VAR,
                ..
            }
        ));
    }

    #[test]
    fn test_invalid_retention_days_is_fatal() {
        let err = BlobJobConfig::from_lookup(&env(&[
            ("STORAGE_ACCOUNT_NAME", "contosoarchive"),
            ("RETENTION_DAYS", "-1"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    #[serial]
    fn test_from_env_reads_process_environment() {
        temp_env::with_vars(
            [
                ("STORAGE_ACCOUNT_NAME", Some("contosoarchive")),
                ("RETENTION_DAYS", Some("14")),
                ("STORAGE_BLOB_ENDPOINT", None),
                ("AZURE_CLIENT_ID", None),
            ],
            || {
                let config = BlobJobConfig::from_env().unwrap();
                assert_eq!(config.account_name, "contosoarchive");
                assert_eq!(config.retention.retention_days, 14);
            },
        );
    }
}
