//! SQL Server / Azure SQL sessions over `tiberius`.

use std::{borrow::Cow, sync::Arc, time::Duration};

use async_trait::async_trait;
use tiberius::{AuthMethod, Client, Config, ToSql, error::Error as TdsError};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use super::{AuthMode, CleanupTarget, DbError, DbResult, SqlAuth, SqlConnector, SqlSession, quote_ident};
use crate::{
    config::DatabaseJobConfig,
    identity::{AccessToken, SQL_DATABASE_SCOPE, TokenProvider},
};

type TdsClient = Client<Compat<TcpStream>>;

/// `Authentication=` values that name the host's managed identity.
const MANAGED_IDENTITY_METHODS: [&str; 2] = ["ActiveDirectoryManagedIdentity", "ActiveDirectoryMsi"];

/// Opens TDS sessions from an ADO.NET style connection string.
///
/// `tiberius` only understands SQL and Windows logins in the string itself.
/// An `Authentication=ActiveDirectoryManagedIdentity` keyword is resolved here
/// by asking the configured identity for a SQL token and presenting it at
/// login.
pub struct MssqlConnector {
    connection_string: String,
    connect_timeout: Duration,
    target: String,
    identity: Option<Arc<dyn TokenProvider>>,
}

/// Credentials presented at login.
#[derive(Debug)]
enum Login {
    /// Whatever SQL or Windows login the connection string carries.
    Embedded,
    Token(AccessToken),
}

impl MssqlConnector {
    pub fn new(connection_string: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            connection_string: connection_string.into(),
            connect_timeout,
            target: "sql server".to_string(),
            identity: None,
        }
    }

    pub fn from_config(config: &DatabaseJobConfig) -> Self {
        Self {
            connection_string: config.connection_string(),
            connect_timeout: config.connect_timeout(),
            target: config.masked_target(),
            identity: None,
        }
    }

    /// Identity used when the connection string asks for managed identity.
    pub fn with_identity(mut self, identity: Arc<dyn TokenProvider>) -> Self {
        self.identity = Some(identity);
        self
    }

    async fn login_for(&self, auth: &SqlAuth) -> DbResult<Login> {
        match auth {
            SqlAuth::AccessToken(token) => Ok(Login::Token(token.clone())),
            SqlAuth::ConnectionString => match authentication_keyword(&self.connection_string) {
                None => Ok(Login::Embedded),
                Some(method)
                    if MANAGED_IDENTITY_METHODS
                        .iter()
                        .any(|m| m.eq_ignore_ascii_case(method)) =>
                {
                    let identity = self.identity.as_ref().ok_or_else(|| {
                        DbError::Auth(format!("Authentication={} but no managed identity is available", method))
                    })?;
                    let token = identity
                        .token(SQL_DATABASE_SCOPE)
                        .await
                        .map_err(|e| DbError::Auth(e.to_string()))?;
                    Ok(Login::Token(token))
                }
                Some(method) => Err(DbError::Auth(format!("unsupported Authentication={}", method))),
            },
        }
    }

    fn config_for(&self, login: &Login) -> DbResult<Config> {
        let mut config = Config::from_ado_string(&self.connection_string)
            .map_err(|e| DbError::Connection(format!("invalid connection string: {}", e)))?;
        if let Login::Token(token) = login {
            config.authentication(AuthMethod::AADToken(token.secret().to_string()));
        }
        Ok(config)
    }

    async fn open(&self, config: Config) -> DbResult<TdsClient> {
        let tcp = tokio::time::timeout(self.connect_timeout, TcpStream::connect(config.get_addr()))
            .await
            .map_err(|_| DbError::Timeout(self.connect_timeout))?
            .map_err(|e| DbError::Connection(e.to_string()))?;
        tcp.set_nodelay(true)
            .map_err(|e| DbError::Connection(e.to_string()))?;

        tokio::time::timeout(self.connect_timeout, Client::connect(config, tcp.compat_write()))
            .await
            .map_err(|_| DbError::Timeout(self.connect_timeout))?
            .map_err(DbError::from)
    }
}

/// The value of the `Authentication` keyword, if the string has one.
fn authentication_keyword(connection_string: &str) -> Option<&str> {
    connection_string.split(';').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        let value = value.trim();
        (key.trim().eq_ignore_ascii_case("authentication") && !value.is_empty()).then_some(value)
    })
}

#[async_trait]
impl SqlConnector for MssqlConnector {
    async fn connect(&self, auth: SqlAuth) -> DbResult<Box<dyn SqlSession>> {
        let login = self.login_for(&auth).await?;

        let client = match self.open(self.config_for(&login)?).await {
            Ok(client) => client,
            // Azure SQL gateways may redirect the login to the hosting node.
            Err(DbError::Mssql(TdsError::Routing { host, port })) => {
                tracing::debug!(host = %host, port, "Following SQL gateway redirect");
                let mut config = self.config_for(&login)?;
                config.host(&host);
                config.port(port);
                self.open(config).await?
            }
            Err(e) => return Err(e),
        };

        Ok(Box::new(MssqlSession {
            client,
            mode: auth.mode(),
        }))
    }

    fn target(&self) -> String {
        self.target.clone()
    }
}

/// How a statement reaches the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dispatch {
    /// Plain SQL batch. Transaction state set here outlives the statement.
    Batch,
    /// `sp_executesql` RPC with bound parameters. The server rejects a
    /// change in `@@TRANCOUNT` across the call, so transaction control must
    /// not go this way.
    Rpc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Statement {
    sql: Cow<'static, str>,
    dispatch: Dispatch,
}

impl Statement {
    const fn batch(sql: &'static str) -> Self {
        Self {
            sql: Cow::Borrowed(sql),
            dispatch: Dispatch::Batch,
        }
    }

    fn rpc(sql: impl Into<Cow<'static, str>>) -> Self {
        Self {
            sql: sql.into(),
            dispatch: Dispatch::Rpc,
        }
    }
}

const BEGIN: Statement = Statement::batch("BEGIN TRANSACTION");
const COMMIT: Statement = Statement::batch("COMMIT TRANSACTION");
// A failed statement may already have aborted the transaction.
const ROLLBACK: Statement = Statement::batch("IF @@TRANCOUNT > 0 ROLLBACK TRANSACTION");
const SERVER_VERSION: Statement = Statement::batch("SELECT @@VERSION");

fn table_exists_sql() -> Statement {
    Statement::rpc("SELECT COUNT(*) FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_NAME = @P1")
}

fn count_sql(target: &CleanupTarget) -> Statement {
    Statement::rpc(format!(
        "SELECT COUNT_BIG(*) FROM {} WHERE {} < DATEADD(day, @P1, GETDATE())",
        quote_ident(target.table),
        quote_ident(target.timestamp_column)
    ))
}

fn delete_sql(target: &CleanupTarget) -> Statement {
    Statement::rpc(format!(
        "DELETE FROM {} WHERE {} < DATEADD(day, @P1, GETDATE())",
        quote_ident(target.table),
        quote_ident(target.timestamp_column)
    ))
}

struct MssqlSession {
    client: TdsClient,
    mode: AuthMode,
}

impl MssqlSession {
    /// Run a statement that returns no rows; yields the affected row count
    /// for RPC statements.
    async fn execute(&mut self, statement: &Statement, params: &[&dyn ToSql]) -> DbResult<u64> {
        match statement.dispatch {
            Dispatch::Batch => {
                self.client
                    .simple_query(&*statement.sql)
                    .await?
                    .into_results()
                    .await?;
                Ok(0)
            }
            Dispatch::Rpc => Ok(self.client.execute(&*statement.sql, params).await?.total()),
        }
    }

    /// First column of the first row, if any.
    async fn scalar<T>(&mut self, statement: &Statement, params: &[&dyn ToSql]) -> DbResult<Option<T>>
    where
        T: for<'a> tiberius::FromSql<'a> + 'static,
    {
        let stream = match statement.dispatch {
            Dispatch::Batch => self.client.simple_query(&*statement.sql).await?,
            Dispatch::Rpc => self.client.query(&*statement.sql, params).await?,
        };
        let row = stream.into_row().await?;
        Ok(match row {
            Some(row) => row.try_get::<T, _>(0)?,
            None => None,
        })
    }
}

#[async_trait]
impl SqlSession for MssqlSession {
    fn auth_mode(&self) -> AuthMode {
        self.mode
    }

    async fn server_version(&mut self) -> DbResult<String> {
        let stream = self.client.simple_query(&*SERVER_VERSION.sql).await?;
        let row = stream.into_row().await?;
        Ok(row
            .and_then(|r| r.get::<&str, _>(0).map(str::to_string))
            .unwrap_or_default())
    }

    async fn table_exists(&mut self, table: &str) -> DbResult<bool> {
        let count = self.scalar::<i32>(&table_exists_sql(), &[&table]).await?;
        Ok(count.unwrap_or(0) > 0)
    }

    async fn count_expired(&mut self, target: &CleanupTarget, day_offset: i32) -> DbResult<i64> {
        let count = self.scalar::<i64>(&count_sql(target), &[&day_offset]).await?;
        Ok(count.unwrap_or(0))
    }

    async fn begin(&mut self) -> DbResult<()> {
        self.execute(&BEGIN, &[]).await?;
        Ok(())
    }

    async fn delete_expired(&mut self, target: &CleanupTarget, day_offset: i32) -> DbResult<u64> {
        self.execute(&delete_sql(target), &[&day_offset]).await
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.execute(&COMMIT, &[]).await?;
        Ok(())
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.execute(&ROLLBACK, &[]).await?;
        Ok(())
    }
}
