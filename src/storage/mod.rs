//! Object storage backends for the blob cleanup job.
//!
//! This module provides a trait-based abstraction over the blob service so the
//! cleanup logic can run against different backends:
//!
//! - **Azure**: The Blob service REST API, authenticated with identity tokens
//!   (requires the `storage-azure` feature)
//! - **Memory**: An in-process store for tests and local experiments

#[cfg(feature = "storage-azure")]
mod azure;
mod memory;

use std::{fmt, str::FromStr};

use async_trait::async_trait;
#[cfg(feature = "storage-azure")]
pub use azure::AzureBlobStore;
use chrono::{DateTime, Utc};
pub use memory::MemoryBlobStore;
use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The container or blob does not exist (for deletes, usually a benign race).
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Storage request failed with status {status}: {code} {message}")]
    Http {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Blob access tier as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AccessTier {
    Hot,
    Cool,
    Cold,
    Archive,
    /// Premium page/block blob tiers (P4..P80, Premium).
    Premium(String),
    /// Any tier this crate does not know about.
    Other(String),
}

impl FromStr for AccessTier {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Hot" => AccessTier::Hot,
            "Cool" => AccessTier::Cool,
            "Cold" => AccessTier::Cold,
            "Archive" => AccessTier::Archive,
            "Premium" => AccessTier::Premium(s.to_string()),
            p if p.len() > 1 && p.starts_with('P') && p[1..].chars().all(|c| c.is_ascii_digit()) => {
                AccessTier::Premium(p.to_string())
            }
            other => AccessTier::Other(other.to_string()),
        })
    }
}

impl fmt::Display for AccessTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessTier::Hot => f.write_str("Hot"),
            AccessTier::Cool => f.write_str("Cool"),
            AccessTier::Cold => f.write_str("Cold"),
            AccessTier::Archive => f.write_str("Archive"),
            AccessTier::Premium(tier) | AccessTier::Other(tier) => f.write_str(tier),
        }
    }
}

/// Storage account details returned by the connectivity probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub sku_name: String,
    pub account_kind: String,
}

/// A container in the storage account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerInfo {
    pub name: String,
}

/// A blob and the metadata the retention policy needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobItem {
    pub name: String,
    /// None when the service does not report a tier for this blob.
    pub tier: Option<AccessTier>,
    pub last_modified: DateTime<Utc>,
}

/// Trait for pluggable blob storage backends.
///
/// Implementations must be `Send + Sync` to support async contexts.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Probe the account, verifying that credentials and network access work.
    async fn account_info(&self) -> StorageResult<AccountInfo>;

    /// List every container in the account.
    async fn list_containers(&self) -> StorageResult<Vec<ContainerInfo>>;

    /// List every blob in a container.
    async fn list_blobs(&self, container: &str) -> StorageResult<Vec<BlobItem>>;

    /// Delete a blob. Returns [`StorageError::NotFound`] if it does not exist.
    async fn delete_blob(&self, container: &str, blob: &str) -> StorageResult<()>;

    /// Get the backend type name (for logging/debugging).
    fn backend_name(&self) -> &'static str;
}
