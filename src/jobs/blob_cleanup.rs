//! Blob retention job.
//!
//! Walks every container in the account and deletes blobs that sit in the
//! Archive tier and are older than the retention window. Blobs in any other
//! tier are left alone regardless of age.

#[cfg(feature = "storage-azure")]
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

use super::{JobError, JobResult};
#[cfg(feature = "storage-azure")]
use crate::{
    config::BlobJobConfig,
    identity::{CachedTokenProvider, CredentialChain},
    storage::AzureBlobStore,
};
use crate::{
    retention::{RetentionPolicy, RunSummary, age_days},
    storage::{BlobItem, BlobStore, StorageError},
};

/// Results from a single blob cleanup run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BlobRunResult {
    /// Containers enumerated.
    pub containers: u64,
    pub summary: RunSummary,
    /// Duration of the run in milliseconds.
    pub duration_ms: u64,
}

/// Resolve configuration from the environment and run one pass.
#[cfg(feature = "storage-azure")]
pub async fn run_from_env() -> JobResult<BlobRunResult> {
    let config = BlobJobConfig::from_env()?;
    invoke(&config).await
}

/// Run one pass against the configured Azure Storage account.
#[cfg(feature = "storage-azure")]
pub async fn invoke(config: &BlobJobConfig) -> JobResult<BlobRunResult> {
    tracing::info!(
        account = %config.account_name,
        retention_days = config.retention.retention_days,
        "Blob retention cleanup started"
    );

    let chain = CredentialChain::platform_default(config.managed_identity_client_id.as_deref())
        .map_err(|e| JobError::Connectivity(e.to_string()))?;
    let tokens = Arc::new(CachedTokenProvider::new(Arc::new(chain)));
    let store = AzureBlobStore::new(&config.account_url(), tokens)
        .map_err(|e| JobError::Connectivity(e.to_string()))?;

    run_blob_cleanup(&store, config.retention.policy(), Utc::now()).await
}

/// Perform a single cleanup pass over every container in `store`.
///
/// Fails only when the account cannot be probed or its containers cannot be
/// listed. Listing or delete failures inside a container are counted in the
/// summary and the pass moves on.
pub async fn run_blob_cleanup(
    store: &dyn BlobStore,
    policy: RetentionPolicy,
    now: DateTime<Utc>,
) -> JobResult<BlobRunResult> {
    let start = Instant::now();

    let account = store.account_info().await.map_err(|e| {
        tracing::error!(backend = store.backend_name(), error = %e, "Storage account probe failed");
        JobError::Connectivity(format!("storage account unreachable: {}", e))
    })?;
    tracing::info!(
        sku = %account.sku_name,
        kind = %account.account_kind,
        "Connected to storage account"
    );

    let containers = store
        .list_containers()
        .await
        .map_err(|e| JobError::Connectivity(format!("failed to list containers: {}", e)))?;

    let mut result = BlobRunResult::default();

    for container in &containers {
        result.containers += 1;
        tracing::info!(container = %container.name, "Processing container");

        let blobs = match store.list_blobs(&container.name).await {
            Ok(blobs) => blobs,
            Err(e) => {
                tracing::error!(container = %container.name, error = %e, "Failed to list blobs");
                result.summary.errors += 1;
                continue;
            }
        };

        for blob in &blobs {
            process_blob(store, &container.name, blob, policy, now, &mut result.summary).await;
        }
    }

    result.duration_ms = start.elapsed().as_millis() as u64;
    let summary = &result.summary;
    tracing::info!(
        containers = result.containers,
        processed = summary.processed,
        deleted = summary.deleted,
        skipped = summary.skipped,
        errors = summary.errors,
        duration_ms = result.duration_ms,
        "Blob retention cleanup complete"
    );

    Ok(result)
}

async fn process_blob(
    store: &dyn BlobStore,
    container: &str,
    blob: &BlobItem,
    policy: RetentionPolicy,
    now: DateTime<Utc>,
    summary: &mut RunSummary,
) {
    summary.processed += 1;

    let age = age_days(blob.last_modified, now);
    let tier = blob
        .tier
        .as_ref()
        .map_or_else(|| "unknown".to_string(), ToString::to_string);
    tracing::debug!(
        container,
        blob = %blob.name,
        tier = %tier,
        last_modified = %blob.last_modified,
        age_days = age,
        "Examining blob"
    );

    if !policy.should_delete_blob(blob, now) {
        tracing::info!(
            container,
            blob = %blob.name,
            tier = %tier,
            age_days = age,
            "Skipping blob"
        );
        summary.skipped += 1;
        return;
    }

    match store.delete_blob(container, &blob.name).await {
        Ok(()) => {
            tracing::info!(container, blob = %blob.name, age_days = age, "Deleted archived blob");
            summary.deleted += 1;
        }
        Err(StorageError::NotFound(_)) => {
            tracing::warn!(container, blob = %blob.name, "Blob not found (already deleted?)");
            summary.errors += 1;
        }
        Err(e) => {
            tracing::error!(container, blob = %blob.name, error = %e, "Failed to delete blob");
            summary.errors += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::storage::{AccessTier, MemoryBlobStore};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 6, 0, 0).unwrap()
    }

    fn blob(name: &str, tier: AccessTier, age_days: i64) -> BlobItem {
        BlobItem {
            name: name.to_string(),
            tier: Some(tier),
            last_modified: now() - Duration::days(age_days),
        }
    }

    #[tokio::test]
    async fn test_deletes_only_aged_archive_blobs() {
        let store = MemoryBlobStore::new();
        store.insert("archive1", blob("x.txt", AccessTier::Archive, 100));
        store.insert("archive1", blob("y.txt", AccessTier::Hot, 200));
        store.insert("archive1", blob("z.txt", AccessTier::Archive, 30));

        let result = run_blob_cleanup(&store, RetentionPolicy::new(90), now())
            .await
            .unwrap();

        assert_eq!(result.containers, 1);
        assert_eq!(result.summary.processed, 3);
        assert_eq!(result.summary.deleted, 1);
        assert_eq!(result.summary.skipped, 2);
        assert_eq!(result.summary.errors, 0);
        assert!(!store.contains("archive1", "x.txt"));
        assert!(store.contains("archive1", "y.txt"));
        assert!(store.contains("archive1", "z.txt"));
    }

    #[tokio::test]
    async fn test_unreachable_account_is_fatal() {
        let store = MemoryBlobStore::unreachable();
        let err = run_blob_cleanup(&store, RetentionPolicy::new(90), now())
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Connectivity(_)));
    }

    #[tokio::test]
    async fn test_container_listing_failure_continues() {
        let store = MemoryBlobStore::new();
        store.insert("a-locked", blob("old.txt", AccessTier::Archive, 400));
        store.insert("b-open", blob("old.txt", AccessTier::Archive, 400));
        store.fail_listing("a-locked");

        let result = run_blob_cleanup(&store, RetentionPolicy::new(90), now())
            .await
            .unwrap();

        assert_eq!(result.containers, 2);
        assert_eq!(result.summary.errors, 1);
        assert_eq!(result.summary.deleted, 1);
        assert!(store.contains("a-locked", "old.txt"));
        assert!(!store.contains("b-open", "old.txt"));
    }

    #[tokio::test]
    async fn test_delete_failures_are_counted_not_fatal() {
        let store = MemoryBlobStore::new();
        store.insert("c", blob("broken.txt", AccessTier::Archive, 400));
        store.insert("c", blob("gone.txt", AccessTier::Archive, 400));
        store.insert("c", blob("ok.txt", AccessTier::Archive, 400));
        store.fail_delete("c", "broken.txt");
        store.vanish_before_delete("c", "gone.txt");

        let result = run_blob_cleanup(&store, RetentionPolicy::new(90), now())
            .await
            .unwrap();

        assert_eq!(result.summary.processed, 3);
        assert_eq!(result.summary.deleted, 1);
        assert_eq!(result.summary.errors, 2);
        assert_eq!(store.delete_calls(), 3);
    }

    #[tokio::test]
    async fn test_blob_without_tier_is_skipped() {
        let store = MemoryBlobStore::new();
        store.insert(
            "c",
            BlobItem {
                name: "page.vhd".to_string(),
                tier: None,
                last_modified: now() - Duration::days(1000),
            },
        );

        let result = run_blob_cleanup(&store, RetentionPolicy::new(0), now())
            .await
            .unwrap();
        assert_eq!(result.summary.skipped, 1);
        assert_eq!(store.delete_calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_account() {
        let store = MemoryBlobStore::new();
        let result = run_blob_cleanup(&store, RetentionPolicy::new(90), now())
            .await
            .unwrap();
        assert_eq!(result.containers, 0);
        assert_eq!(result.summary, RunSummary::default());
    }
}
