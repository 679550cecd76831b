//! Secret resolution for SigV4 verification.
//!
//! [`SecretResolver`] turns a presented access key id, scoped to a tenant
//! partition, into the secret token it signs with. [`CredentialStore`] is the
//! production implementation on top of the synchronized [`IdentityCache`];
//! [`StaticSecretResolver`] is a fixed table for tests and development.

use std::collections::HashMap;
use std::sync::Arc;

use lambdagate_core::TenantPartition;
use tracing::debug;

use crate::error::CredentialError;
use crate::identity::IdentityCache;

/// Trait for looking up signing secrets by access key id and partition.
pub trait SecretResolver: Send + Sync {
    /// Resolve the secret token for `access_key_id` in `partition`.
    ///
    /// # Errors
    ///
    /// Returns a [`CredentialError`] describing the internal cause. Callers
    /// must not expose which variant occurred.
    fn resolve_secret(
        &self,
        access_key_id: &str,
        partition: &TenantPartition,
    ) -> Result<String, CredentialError>;
}

/// Resolves secrets from the synchronized identity cache.
///
/// Resolution order:
///
/// 1. When the identity has exactly one bound secret, that secret is fetched
///    by name.
/// 2. Otherwise every secret in the partition is scanned for one whose owner
///    annotation names the identity. Per-tenant secret counts are small and
///    this path is rare.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    cache: Arc<IdentityCache>,
}

impl CredentialStore {
    /// Create a store reading from `cache`.
    #[must_use]
    pub fn new(cache: Arc<IdentityCache>) -> Self {
        Self { cache }
    }
}

impl SecretResolver for CredentialStore {
    fn resolve_secret(
        &self,
        access_key_id: &str,
        partition: &TenantPartition,
    ) -> Result<String, CredentialError> {
        let identity = self.cache.identity(partition, access_key_id).ok_or_else(|| {
            CredentialError::IdentityNotFound {
                partition: partition.clone(),
                name: access_key_id.to_owned(),
            }
        })?;

        let secret = if let [only] = identity.secrets.as_slice() {
            debug!(%partition, identity = %identity.name, secret = %only, "resolving bound secret");
            self.cache.secret(partition, only)
        } else {
            debug!(
                %partition,
                identity = %identity.name,
                bindings = identity.secrets.len(),
                "scanning partition secrets by owner annotation"
            );
            self.cache
                .secrets_in(partition)
                .into_iter()
                .find(|s| s.owner() == Some(identity.name.as_str()))
        };

        let secret = secret.ok_or_else(|| CredentialError::SecretNotFound {
            partition: partition.clone(),
            name: identity.name.clone(),
        })?;

        secret
            .token()
            .map(ToOwned::to_owned)
            .ok_or_else(|| CredentialError::TokenMissing {
                partition: partition.clone(),
                secret: secret.name.clone(),
            })
    }
}

/// A fixed in-memory table of `(partition, access key id) → secret`.
///
/// # Examples
///
/// ```
/// use lambdagate_auth::credentials::{SecretResolver, StaticSecretResolver};
/// use lambdagate_core::TenantPartition;
///
/// let resolver = StaticSecretResolver::new(vec![(
///     TenantPartition::new("prod"),
///     "builder".to_owned(),
///     "s3cr3t".to_owned(),
/// )]);
///
/// let secret = resolver
///     .resolve_secret("builder", &TenantPartition::new("prod"))
///     .unwrap();
/// assert_eq!(secret, "s3cr3t");
/// ```
#[derive(Debug, Clone, Default)]
pub struct StaticSecretResolver {
    secrets: HashMap<(TenantPartition, String), String>,
}

impl StaticSecretResolver {
    /// Create a resolver from `(partition, access_key_id, secret)` triples.
    pub fn new(entries: impl IntoIterator<Item = (TenantPartition, String, String)>) -> Self {
        Self {
            secrets: entries
                .into_iter()
                .map(|(partition, key, secret)| ((partition, key), secret))
                .collect(),
        }
    }
}

impl SecretResolver for StaticSecretResolver {
    fn resolve_secret(
        &self,
        access_key_id: &str,
        partition: &TenantPartition,
    ) -> Result<String, CredentialError> {
        self.secrets
            .get(&(partition.clone(), access_key_id.to_owned()))
            .cloned()
            .ok_or_else(|| CredentialError::IdentityNotFound {
                partition: partition.clone(),
                name: access_key_id.to_owned(),
            })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::identity::{OWNER_ANNOTATION, SecretRecord, TOKEN_FIELD, WorkloadIdentity};

    fn prod() -> TenantPartition {
        TenantPartition::new("prod")
    }

    fn identity(name: &str, secrets: &[&str]) -> WorkloadIdentity {
        WorkloadIdentity {
            partition: prod(),
            name: name.to_owned(),
            secrets: secrets.iter().map(|s| (*s).to_owned()).collect(),
        }
    }

    fn secret(name: &str, owner: Option<&str>, token: Option<&str>) -> SecretRecord {
        SecretRecord {
            partition: prod(),
            name: name.to_owned(),
            annotations: owner
                .map(|o| HashMap::from([(OWNER_ANNOTATION.to_owned(), o.to_owned())]))
                .unwrap_or_default(),
            data: token
                .map(|t| HashMap::from([(TOKEN_FIELD.to_owned(), t.to_owned())]))
                .unwrap_or_default(),
        }
    }

    fn store_with(identities: Vec<WorkloadIdentity>, secrets: Vec<SecretRecord>) -> CredentialStore {
        let cache = Arc::new(IdentityCache::new());
        cache.replace(identities, secrets);
        CredentialStore::new(cache)
    }

    #[test]
    fn test_should_resolve_single_bound_secret() {
        let store = store_with(
            vec![identity("builder", &["builder-token"])],
            vec![secret("builder-token", None, Some("tok-1"))],
        );
        assert_eq!(store.resolve_secret("builder", &prod()).unwrap(), "tok-1");
    }

    #[test]
    fn test_should_scan_by_owner_when_no_binding() {
        let store = store_with(
            vec![identity("builder", &[])],
            vec![
                secret("other-token", Some("deployer"), Some("tok-other")),
                secret("builder-token-abc", Some("builder"), Some("tok-2")),
            ],
        );
        assert_eq!(store.resolve_secret("builder", &prod()).unwrap(), "tok-2");
    }

    #[test]
    fn test_should_scan_by_owner_when_multiple_bindings() {
        let store = store_with(
            vec![identity("builder", &["dockercfg", "builder-token"])],
            vec![
                secret("dockercfg", None, None),
                secret("builder-token", Some("builder"), Some("tok-3")),
            ],
        );
        assert_eq!(store.resolve_secret("builder", &prod()).unwrap(), "tok-3");
    }

    #[test]
    fn test_should_fail_for_unknown_identity() {
        let store = store_with(vec![], vec![]);
        assert!(matches!(
            store.resolve_secret("ghost", &prod()),
            Err(CredentialError::IdentityNotFound { .. })
        ));
    }

    #[test]
    fn test_should_fail_when_bound_secret_is_gone() {
        let store = store_with(vec![identity("builder", &["deleted"])], vec![]);
        assert!(matches!(
            store.resolve_secret("builder", &prod()),
            Err(CredentialError::SecretNotFound { .. })
        ));
    }

    #[test]
    fn test_should_fail_when_token_field_is_missing() {
        let store = store_with(
            vec![identity("builder", &["builder-token"])],
            vec![secret("builder-token", Some("builder"), None)],
        );
        assert!(matches!(
            store.resolve_secret("builder", &prod()),
            Err(CredentialError::TokenMissing { .. })
        ));
    }

    #[test]
    fn test_should_not_cross_partitions() {
        let store = store_with(
            vec![identity("builder", &["builder-token"])],
            vec![secret("builder-token", None, Some("tok"))],
        );
        assert!(
            store
                .resolve_secret("builder", &TenantPartition::new("dev"))
                .is_err()
        );
    }

    #[test]
    fn test_should_tolerate_concurrent_mutation_during_scan() {
        let cache = Arc::new(IdentityCache::new());
        cache.upsert_identity(identity("builder", &[]));
        cache.upsert_secret(secret("builder-token", Some("builder"), Some("tok")));
        let store = CredentialStore::new(Arc::clone(&cache));

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for i in 0..500 {
                    let noise = (0..i % 7).map(|n| secret(&format!("noise-{n}"), None, None));
                    cache.replace(
                        vec![identity("builder", &[])],
                        std::iter::once(secret("builder-token", Some("builder"), Some("tok")))
                            .chain(noise),
                    );
                }
            });
            for _ in 0..500 {
                assert_eq!(store.resolve_secret("builder", &prod()).unwrap(), "tok");
            }
        });
    }

    #[test]
    fn test_should_resolve_from_static_table() {
        let resolver = StaticSecretResolver::new(vec![(
            prod(),
            "builder".to_owned(),
            "secret".to_owned(),
        )]);
        assert_eq!(resolver.resolve_secret("builder", &prod()).unwrap(), "secret");
        assert!(resolver.resolve_secret("builder", &TenantPartition::new("dev")).is_err());
    }
}
