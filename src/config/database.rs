//! Database cleanup job configuration.
//!
//! ```sh
//! SQL_SERVER=contoso.database.windows.net
//! SQL_DATABASE=operations
//! # Optional
//! SQL_PORT=1433
//! SQL_CONNECT_TIMEOUT_SECS=30
//! SQL_CONNECTION_STRING="Server=tcp:contoso.database.windows.net,1433;..."
//! ```

use std::time::Duration;

use super::{AZURE_CLIENT_ID_VAR, ConfigError, RetentionConfig, lookup_var, parse_var, process_env};

pub const SQL_SERVER_VAR: &str = "SQL_SERVER";
pub const SQL_DATABASE_VAR: &str = "SQL_DATABASE";
pub const SQL_PORT_VAR: &str = "SQL_PORT";
pub const SQL_CONNECT_TIMEOUT_VAR: &str = "SQL_CONNECT_TIMEOUT_SECS";
pub const SQL_CONNECTION_STRING_VAR: &str = "SQL_CONNECTION_STRING";

/// Configuration for the database retention job.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseJobConfig {
    /// SQL server host name (required).
    pub server: String,

    /// Database name (required).
    pub database: String,

    /// TCP port.
    /// Default: 1433
    pub port: u16,

    /// Connection timeout in seconds.
    /// Default: 30
    pub connect_timeout_secs: u64,

    /// Connection string used for the first connection attempt. When unset one
    /// is built from the fields above.
    pub connection_string: Option<String>,

    /// Client ID of a user-assigned managed identity.
    pub managed_identity_client_id: Option<String>,

    /// Retention window.
    pub retention: RetentionConfig,
}

// The connection string may embed credentials.
impl std::fmt::Debug for DatabaseJobConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseJobConfig")
            .field("server", &self.server)
            .field("database", &self.database)
            .field("port", &self.port)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field(
                "connection_string",
                &self.connection_string.as_ref().map(|_| "****"),
            )
            .field("managed_identity_client_id", &self.managed_identity_client_id)
            .field("retention", &self.retention)
            .finish()
    }
}

fn default_port() -> u16 {
    1433
}

fn default_connect_timeout_secs() -> u64 {
    30
}

impl DatabaseJobConfig {
    /// Resolve the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&process_env)
    }

    /// Resolve the configuration from an arbitrary lookup function.
    pub fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let server = lookup_var(lookup, SQL_SERVER_VAR);
        let database = lookup_var(lookup, SQL_DATABASE_VAR);

        tracing::info!(
            sql_server_configured = server.is_some(),
            sql_database_configured = database.is_some(),
            "Resolved database cleanup configuration"
        );

        let (server, database) = match (server, database) {
            (Some(server), Some(database)) => (server, database),
            _ => {
                return Err(ConfigError::MissingAll(vec![
                    SQL_SERVER_VAR,
                    SQL_DATABASE_VAR,
                ]));
            }
        };

        let config = Self {
            server,
            database,
            port: parse_var(lookup, SQL_PORT_VAR, default_port())?,
            connect_timeout_secs: parse_var(
                lookup,
                SQL_CONNECT_TIMEOUT_VAR,
                default_connect_timeout_secs(),
            )?,
            connection_string: lookup_var(lookup, SQL_CONNECTION_STRING_VAR),
            managed_identity_client_id: lookup_var(lookup, AZURE_CLIENT_ID_VAR),
            retention: RetentionConfig::from_lookup(lookup)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                name: SQL_CONNECT_TIMEOUT_VAR,
                value: "0".to_string(),
                reason: "timeout must be at least one second".to_string(),
            });
        }
        if self.server.contains(';') || self.database.contains(';') {
            return Err(ConfigError::Invalid {
                name: if self.server.contains(';') {
                    SQL_SERVER_VAR
                } else {
                    SQL_DATABASE_VAR
                },
                value: String::new(),
                reason: "value must not contain ';'".to_string(),
            });
        }
        Ok(())
    }

    /// Get the connect timeout as a Duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// The connection string for the first attempt. The built default asks
    /// for the host's managed identity.
    pub fn connection_string(&self) -> String {
        match &self.connection_string {
            Some(explicit) => explicit.clone(),
            None => format!(
                "Server=tcp:{},{};Database={};Authentication=ActiveDirectoryManagedIdentity;Encrypt=true;TrustServerCertificate=false;Connect Timeout={};",
                self.server, self.port, self.database, self.connect_timeout_secs
            ),
        }
    }

    /// Connection target suitable for logs (never includes credentials).
    pub fn masked_target(&self) -> String {
        format!("Server=tcp:{},{};Database={}", self.server, self.port, self.database)
    }
}
