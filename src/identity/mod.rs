//! Platform identity token acquisition.
//!
//! Both jobs authenticate with tokens issued to the workload's identity
//! instead of stored keys or passwords:
//! - Managed Identity (when running in Azure)
//! - Azure CLI credentials (for local development)
//!
//! [`TokenProvider`] is the seam the jobs depend on. [`CachedTokenProvider`]
//! wraps any provider and reuses tokens until shortly before they expire.

#[cfg(feature = "azure-sdk")]
mod azure;

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
#[cfg(feature = "azure-sdk")]
pub use azure::CredentialChain;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tokio::sync::RwLock;

/// Scope for Azure Storage data-plane requests.
pub const STORAGE_SCOPE: &str = "https://storage.azure.com/.default";

/// Scope for Azure SQL Database logins.
pub const SQL_DATABASE_SCOPE: &str = "https://database.windows.net/.default";

/// Buffer time before token expiry to trigger refresh (5 minutes).
const TOKEN_REFRESH_BUFFER_SECS: i64 = 300;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Failed to create credential: {0}")]
    Credential(String),

    #[error("No credential could provide a token for {scope}: {reasons}")]
    Unavailable { scope: String, reasons: String },
}

pub type IdentityResult<T> = Result<T, IdentityError>;

/// An access token and its expiry.
///
/// The token value is redacted from `Debug` output.
#[derive(Clone)]
pub struct AccessToken {
    secret: Arc<str>,
    pub expires_on: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(secret: impl Into<Arc<str>>, expires_on: DateTime<Utc>) -> Self {
        Self {
            secret: secret.into(),
            expires_on,
        }
    }

    /// The raw token value.
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Pre-formatted `Authorization` header value.
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.secret)
    }

    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(TOKEN_REFRESH_BUFFER_SECS) < self.expires_on
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"****")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

/// Source of bearer tokens for a resource scope.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Acquire a token for `scope`.
    async fn token(&self, scope: &str) -> IdentityResult<AccessToken>;
}

/// Token provider that caches one token per scope.
///
/// Tokens are refreshed once they come within five minutes of expiry, so a
/// long run over many containers reuses the same token.
pub struct CachedTokenProvider {
    inner: Arc<dyn TokenProvider>,
    cache: RwLock<HashMap<String, AccessToken>>,
}

impl CachedTokenProvider {
    pub fn new(inner: Arc<dyn TokenProvider>) -> Self {
        Self {
            inner,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Clears the cached tokens, forcing a refresh on the next call.
    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
    }
}

#[async_trait]
impl TokenProvider for CachedTokenProvider {
    async fn token(&self, scope: &str) -> IdentityResult<AccessToken> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(scope)
                && cached.is_fresh(Utc::now())
            {
                return Ok(cached.clone());
            }
        }

        let mut cache = self.cache.write().await;

        // Another caller may have refreshed while we waited for the write lock.
        if let Some(cached) = cache.get(scope)
            && cached.is_fresh(Utc::now())
        {
            return Ok(cached.clone());
        }

        let token = self.inner.token(scope).await?;
        tracing::debug!(
            scope,
            expires_on = %token.expires_on,
            "Acquired new access token"
        );
        cache.insert(scope.to_string(), token.clone());
        Ok(token)
    }
}

/// Token provider returning a fixed token (for testing and emulators).
pub struct StaticTokenProvider {
    token: AccessToken,
}

impl StaticTokenProvider {
    pub fn new(secret: &str) -> Self {
        Self {
            token: AccessToken::new(secret, Utc::now() + Duration::hours(1)),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self, _scope: &str) -> IdentityResult<AccessToken> {
        Ok(self.token.clone())
    }
}
