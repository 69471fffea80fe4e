//! Azure Blob service backend using the REST API.
//!
//! Requests are authorized with bearer tokens from a [`TokenProvider`] for the
//! storage scope, so the workload identity needs a data-plane role such as
//! *Storage Blob Data Contributor* on the account.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use url::Url;

use super::{AccessTier, AccountInfo, BlobItem, BlobStore, ContainerInfo, StorageError, StorageResult};
use crate::identity::{STORAGE_SCOPE, TokenProvider};

/// REST API version sent with every request. Needs 2021-12-02 or later to
/// report the Cold tier.
const API_VERSION: &str = "2023-11-03";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Blob store backed by an Azure Storage account.
pub struct AzureBlobStore {
    base_url: Url,
    client: Client,
    tokens: Arc<dyn TokenProvider>,
}

impl AzureBlobStore {
    /// Create a store for the account at `account_url`
    /// (e.g. `https://contosoarchive.blob.core.windows.net`).
    pub fn new(account_url: &str, tokens: Arc<dyn TokenProvider>) -> StorageResult<Self> {
        Self::with_client(account_url, tokens, Client::new())
    }

    pub fn with_client(
        account_url: &str,
        tokens: Arc<dyn TokenProvider>,
        client: Client,
    ) -> StorageResult<Self> {
        let base_url = Url::parse(account_url)
            .map_err(|e| StorageError::Malformed(format!("invalid account URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(StorageError::Malformed(format!(
                "account URL cannot have a path: {}",
                account_url
            )));
        }

        Ok(Self {
            base_url,
            client,
            tokens,
        })
    }

    /// Base URL with `segments` appended to its path.
    fn url_for(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send(&self, method: reqwest::Method, url: Url) -> StorageResult<Response> {
        let token = self
            .tokens
            .token(STORAGE_SCOPE)
            .await
            .map_err(|e| StorageError::Auth(e.to_string()))?;

        let response = self
            .client
            .request(method, url)
            .bearer_auth(token.secret())
            .header("x-ms-version", API_VERSION)
            .header(
                "x-ms-date",
                Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
            )
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_from_response(response).await)
        }
    }

    async fn get_xml<T>(&self, url: Url) -> StorageResult<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let body = self
            .send(reqwest::Method::GET, url)
            .await?
            .text()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;
        quick_xml::de::from_str(&body).map_err(|e| StorageError::Malformed(e.to_string()))
    }
}

async fn error_from_response(response: Response) -> StorageError {
    let status = response.status();
    let header_code = response
        .headers()
        .get("x-ms-error-code")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response.text().await.unwrap_or_default();
    let parsed: Option<ErrorXml> = quick_xml::de::from_str(&body).ok();

    let code = header_code
        .or_else(|| parsed.as_ref().and_then(|e| e.code.clone()))
        .unwrap_or_default();
    let message = parsed
        .and_then(|e| e.message)
        .map(|m| m.lines().next().unwrap_or_default().to_string())
        .unwrap_or_default();

    if status == StatusCode::NOT_FOUND {
        return StorageError::NotFound(if code.is_empty() { message } else { code });
    }

    StorageError::Http {
        status: status.as_u16(),
        code,
        message,
    }
}

fn next_marker(marker: Option<String>) -> Option<String> {
    marker.filter(|m| !m.is_empty())
}

fn parse_last_modified(raw: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Malformed(format!("invalid Last-Modified '{}': {}", raw, e)))
}

#[async_trait]
impl BlobStore for AzureBlobStore {
    async fn account_info(&self) -> StorageResult<AccountInfo> {
        let mut url = self.url_for(&[""]);
        url.query_pairs_mut()
            .append_pair("restype", "account")
            .append_pair("comp", "properties");

        let response = self.send(reqwest::Method::GET, url).await?;
        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };

        Ok(AccountInfo {
            sku_name: header("x-ms-sku-name"),
            account_kind: header("x-ms-account-kind"),
        })
    }

    async fn list_containers(&self) -> StorageResult<Vec<ContainerInfo>> {
        let mut containers = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut url = self.url_for(&[""]);
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("comp", "list");
                if let Some(m) = &marker {
                    query.append_pair("marker", m);
                }
            }

            let page: ContainerListXml = self.get_xml(url).await?;
            containers.extend(
                page.containers
                    .items
                    .into_iter()
                    .map(|c| ContainerInfo { name: c.name }),
            );

            marker = next_marker(page.next_marker);
            if marker.is_none() {
                break;
            }
        }

        Ok(containers)
    }

    async fn list_blobs(&self, container: &str) -> StorageResult<Vec<BlobItem>> {
        let mut blobs = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut url = self.url_for(&[container]);
            {
                let mut query = url.query_pairs_mut();
                query
                    .append_pair("restype", "container")
                    .append_pair("comp", "list");
                if let Some(m) = &marker {
                    query.append_pair("marker", m);
                }
            }

            let page: BlobListXml = self.get_xml(url).await?;
            for blob in page.blobs.items {
                blobs.push(BlobItem {
                    last_modified: parse_last_modified(&blob.properties.last_modified)?,
                    tier: blob
                        .properties
                        .access_tier
                        .filter(|t| !t.is_empty())
                        .and_then(|t| t.parse::<AccessTier>().ok()),
                    name: blob.name,
                });
            }

            marker = next_marker(page.next_marker);
            if marker.is_none() {
                break;
            }
        }

        Ok(blobs)
    }

    async fn delete_blob(&self, container: &str, blob: &str) -> StorageResult<()> {
        let mut segments = vec![container];
        segments.extend(blob.split('/'));
        let url = self.url_for(&segments);

        self.send(reqwest::Method::DELETE, url).await.map_err(|e| match e {
            StorageError::NotFound(_) => StorageError::NotFound(format!("{}/{}", container, blob)),
            other => other,
        })?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "azure"
    }
}

// Wire formats of the List Containers and List Blobs responses.

#[derive(Debug, Deserialize)]
struct ContainerListXml {
    #[serde(rename = "Containers", default)]
    containers: ContainersXml,
    #[serde(rename = "NextMarker", default)]
    next_marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ContainersXml {
    #[serde(rename = "Container", default)]
    items: Vec<ContainerXml>,
}

#[derive(Debug, Deserialize)]
struct ContainerXml {
    #[serde(rename = "Name")]
    name: String,
}

#[derive(Debug, Deserialize)]
struct BlobListXml {
    #[serde(rename = "Blobs", default)]
    blobs: BlobsXml,
    #[serde(rename = "NextMarker", default)]
    next_marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BlobsXml {
    #[serde(rename = "Blob", default)]
    items: Vec<BlobXml>,
}

#[derive(Debug, Deserialize)]
struct BlobXml {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Properties")]
    properties: BlobPropertiesXml,
}

#[derive(Debug, Deserialize)]
struct BlobPropertiesXml {
    #[serde(rename = "Last-Modified")]
    last_modified: String,
    #[serde(rename = "AccessTier", default)]
    access_tier: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorXml {
    #[serde(rename = "Code", default)]
    code: Option<String>,
    #[serde(rename = "Message", default)]
    message: Option<String>,
}
