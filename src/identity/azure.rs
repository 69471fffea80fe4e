//! Azure credential chain backed by the Azure SDK for Rust.

use std::sync::Arc;

use async_trait::async_trait;
use azure_core::credentials::TokenCredential;
use azure_identity::{
    AzureCliCredential, ManagedIdentityCredential, ManagedIdentityCredentialOptions,
    UserAssignedId,
};
use chrono::{DateTime, Utc};

use super::{AccessToken, IdentityError, IdentityResult, TokenProvider};

/// Ordered list of Azure credentials; the first one that yields a token wins.
pub struct CredentialChain {
    sources: Vec<(&'static str, Arc<dyn TokenCredential>)>,
}

impl std::fmt::Debug for CredentialChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialChain")
            .field("sources", &self.source_names())
            .finish()
    }
}

impl CredentialChain {
    /// The default platform chain: Managed Identity, then Azure CLI.
    ///
    /// For a user-assigned managed identity, pass its client ID. For the
    /// system-assigned identity, pass None.
    pub fn platform_default(client_id: Option<&str>) -> IdentityResult<Self> {
        let mut sources = Vec::new();

        match managed_identity(client_id) {
            Ok(credential) => sources.push(("ManagedIdentity", credential)),
            Err(e) => tracing::debug!(error = %e, "Managed identity credential unavailable"),
        }
        match AzureCliCredential::new(None) {
            Ok(credential) => sources.push(("AzureCli", credential as Arc<dyn TokenCredential>)),
            Err(e) => tracing::debug!(error = %e, "Azure CLI credential unavailable"),
        }

        if sources.is_empty() {
            return Err(IdentityError::Credential(
                "neither managed identity nor Azure CLI credentials could be created".to_string(),
            ));
        }

        Ok(Self { sources })
    }

    /// The host's managed identity alone, as a driver resolving
    /// `Authentication=ActiveDirectoryManagedIdentity` would use it.
    pub fn managed_identity_only(client_id: Option<&str>) -> IdentityResult<Self> {
        let credential = managed_identity(client_id)
            .map_err(|e| IdentityError::Credential(e.to_string()))?;
        Ok(Self {
            sources: vec![("ManagedIdentity", credential)],
        })
    }

    /// Names of the credential sources, in the order they are tried.
    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|(name, _)| *name).collect()
    }
}

fn managed_identity(client_id: Option<&str>) -> azure_core::Result<Arc<dyn TokenCredential>> {
    let options = client_id.map(|id| {
        tracing::info!(client_id = id, "Using user-assigned managed identity");
        ManagedIdentityCredentialOptions {
            user_assigned_id: Some(UserAssignedId::ClientId(id.to_string())),
            ..Default::default()
        }
    });
    Ok(ManagedIdentityCredential::new(options)? as Arc<dyn TokenCredential>)
}

#[async_trait]
impl TokenProvider for CredentialChain {
    async fn token(&self, scope: &str) -> IdentityResult<AccessToken> {
        let mut failures = Vec::with_capacity(self.sources.len());

        for (name, credential) in &self.sources {
            match credential.get_token(&[scope], None).await {
                Ok(token) => {
                    let expires_on =
                        DateTime::<Utc>::from_timestamp(token.expires_on.unix_timestamp(), 0)
                            .unwrap_or_else(Utc::now);
                    tracing::debug!(source = name, scope, "Acquired token");
                    return Ok(AccessToken::new(token.token.secret(), expires_on));
                }
                Err(e) => {
                    tracing::debug!(source = name, scope, error = %e, "Credential failed");
                    failures.push(format!("{}: {}", name, e));
                }
            }
        }

        Err(IdentityError::Unavailable {
            scope: scope.to_string(),
            reasons: failures.join("; "),
        })
    }
}
