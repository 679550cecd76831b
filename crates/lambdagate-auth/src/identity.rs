//! Locally synchronized view of the identity store.
//!
//! Workload identities and their secrets live in an external, eventually
//! consistent store. A background sync keeps an [`IdentityCache`] up to date;
//! request handling only ever reads the cache. The cache also carries a
//! readiness flag so the server can refuse to start serving before the first
//! sync has landed.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use lambdagate_core::{PartitionStore, TenantPartition};
use tokio::sync::watch;

/// Annotation naming the identity that owns a secret.
pub const OWNER_ANNOTATION: &str = "kubernetes.io/service-account.name";

/// Secret data field holding the signing token.
pub const TOKEN_FIELD: &str = "token";

/// A workload identity; its name is the SigV4 access key id.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WorkloadIdentity {
    /// Partition the identity lives in.
    pub partition: TenantPartition,
    /// Identity name.
    pub name: String,
    /// Names of the secrets bound to this identity.
    #[serde(default)]
    pub secrets: Vec<String>,
}

/// A secret record as seen in the identity store.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SecretRecord {
    /// Partition the secret lives in.
    pub partition: TenantPartition,
    /// Secret name.
    pub name: String,
    /// Free-form annotations; [`OWNER_ANNOTATION`] links it to an identity.
    #[serde(default)]
    pub annotations: HashMap<String, String>,
    /// Secret payload fields; [`TOKEN_FIELD`] holds the signing token.
    #[serde(default)]
    pub data: HashMap<String, String>,
}

impl SecretRecord {
    /// The identity this secret is annotated as belonging to.
    #[must_use]
    pub fn owner(&self) -> Option<&str> {
        self.annotations.get(OWNER_ANNOTATION).map(String::as_str)
    }

    /// The signing token, if present.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.data.get(TOKEN_FIELD).map(String::as_str)
    }
}

/// The initial sync did not complete within the boot window.
#[derive(Debug, thiserror::Error)]
#[error("identity cache not synced within {0:?}")]
pub struct SyncTimeout(pub Duration);

/// Process-wide cache of identities and secrets, partitioned by tenant.
#[derive(Debug)]
pub struct IdentityCache {
    identities: PartitionStore<WorkloadIdentity>,
    secrets: PartitionStore<SecretRecord>,
    synced: watch::Sender<bool>,
}

impl IdentityCache {
    /// Create an empty, not yet synced cache.
    #[must_use]
    pub fn new() -> Self {
        let (synced, _) = watch::channel(false);
        Self {
            identities: PartitionStore::new(),
            secrets: PartitionStore::new(),
            synced,
        }
    }

    /// Look up an identity.
    #[must_use]
    pub fn identity(&self, partition: &TenantPartition, name: &str) -> Option<Arc<WorkloadIdentity>> {
        self.identities.get(partition, name)
    }

    /// Look up a secret.
    #[must_use]
    pub fn secret(&self, partition: &TenantPartition, name: &str) -> Option<Arc<SecretRecord>> {
        self.secrets.get(partition, name)
    }

    /// Every secret currently visible in a partition.
    #[must_use]
    pub fn secrets_in(&self, partition: &TenantPartition) -> Vec<Arc<SecretRecord>> {
        self.secrets.list(partition)
    }

    /// Insert or replace an identity.
    pub fn upsert_identity(&self, identity: WorkloadIdentity) {
        let partition = identity.partition.clone();
        let name = identity.name.clone();
        self.identities.insert(&partition, name, identity);
    }

    /// Insert or replace a secret.
    pub fn upsert_secret(&self, secret: SecretRecord) {
        let partition = secret.partition.clone();
        let name = secret.name.clone();
        self.secrets.insert(&partition, name, secret);
    }

    /// Replace the whole cached view with a fresh listing.
    pub fn replace(
        &self,
        identities: impl IntoIterator<Item = WorkloadIdentity>,
        secrets: impl IntoIterator<Item = SecretRecord>,
    ) {
        self.identities.replace_all(
            identities
                .into_iter()
                .map(|i| (i.partition.clone(), i.name.clone(), i)),
        );
        self.secrets.replace_all(
            secrets
                .into_iter()
                .map(|s| (s.partition.clone(), s.name.clone(), s)),
        );
    }

    /// Flag the initial sync as complete and wake anyone waiting on it.
    pub fn mark_synced(&self) {
        self.synced.send_replace(true);
    }

    /// Whether the initial sync has completed.
    #[must_use]
    pub fn is_synced(&self) -> bool {
        *self.synced.borrow()
    }

    /// Wait until the initial sync completes, at most `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncTimeout`] when the boot window elapses first.
    pub async fn wait_for_sync(&self, timeout: Duration) -> Result<(), SyncTimeout> {
        let mut rx = self.synced.subscribe();
        match tokio::time::timeout(timeout, rx.wait_for(|synced| *synced)).await {
            Ok(Ok(_)) => Ok(()),
            // The sender lives in `self`, so the channel cannot close while we wait.
            Ok(Err(_)) | Err(_) => Err(SyncTimeout(timeout)),
        }
    }
}

impl Default for IdentityCache {
    fn default() -> Self {
        Self::new()
    }
}
