//! Configuration management for LambdaGate.
//!
//! All configuration is driven by environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{GatewayError, GatewayResult};
use crate::types::TenantPartition;

/// Global configuration for the gateway.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Bind address for the HTTP listener.
    pub gateway_listen: String,
    /// Log level used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Fixed tenant partition. `None` means the gateway is multi-tenant and
    /// the credential-scope region selects the partition.
    pub namespace: Option<TenantPartition>,
    /// Whether SigV4 signatures are verified against the identity store.
    pub signature_verification: bool,
    /// Path of the identity/function snapshot loaded by the background sync.
    pub identity_snapshot: Option<PathBuf>,
    /// Period between snapshot reloads.
    pub sync_interval: Duration,
    /// Boot window for the initial sync.
    pub sync_timeout: Duration,
    /// Address of the NATS server carrying invoke requests and replies.
    pub nats_url: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            gateway_listen: "0.0.0.0:9000".to_owned(),
            log_level: "info".to_owned(),
            namespace: None,
            signature_verification: false,
            identity_snapshot: None,
            sync_interval: Duration::from_secs(30),
            sync_timeout: Duration::from_secs(30),
            nats_url: "nats://127.0.0.1:4222".to_owned(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// Unparseable numeric values fall back to their defaults, as does a zero
    /// sync interval.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(v) = lookup("GATEWAY_LISTEN") {
            config.gateway_listen = v;
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            config.log_level = v;
        }
        if let Some(v) = lookup("GATEWAY_NAMESPACE") {
            let v = v.trim();
            if !v.is_empty() {
                config.namespace = Some(TenantPartition::new(v));
            }
        }
        if let Some(v) = lookup("SIGNATURE_VERIFICATION") {
            config.signature_verification = parse_bool(&v);
        }
        if let Some(v) = lookup("IDENTITY_SNAPSHOT") {
            if !v.is_empty() {
                config.identity_snapshot = Some(PathBuf::from(v));
            }
        }
        if let Some(secs) = lookup("IDENTITY_SYNC_INTERVAL_SECS")
            .and_then(|v| v.parse().ok())
            .filter(|secs| *secs > 0)
        {
            config.sync_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = lookup("SYNC_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            config.sync_timeout = Duration::from_secs(secs);
        }

        if let Some(v) = lookup("NATS_URL") {
            if !v.trim().is_empty() {
                config.nats_url = v.trim().to_owned();
            }
        }

        config
    }

    /// The bind address as a socket address.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidListenAddress`] when `gateway_listen`
    /// does not parse.
    pub fn listen_addr(&self) -> GatewayResult<SocketAddr> {
        self.gateway_listen
            .parse()
            .map_err(|source| GatewayError::InvalidListenAddress {
                addr: self.gateway_listen.clone(),
                source,
            })
    }
}

fn parse_bool(v: &str) -> bool {
    matches!(v, "1" | "true" | "yes" | "TRUE" | "YES" | "True")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_should_create_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.gateway_listen, "0.0.0.0:9000");
        assert!(config.namespace.is_none());
        assert!(!config.signature_verification);
        assert_eq!(config.sync_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_should_load_values_from_lookup() {
        let config = GatewayConfig::from_lookup(lookup_from(&[
            ("GATEWAY_LISTEN", "127.0.0.1:8080"),
            ("GATEWAY_NAMESPACE", "prod"),
            ("SIGNATURE_VERIFICATION", "true"),
            ("IDENTITY_SNAPSHOT", "/etc/lambdagate/snapshot.json"),
            ("SYNC_TIMEOUT_SECS", "5"),
            ("NATS_URL", "nats://bus.internal:4222"),
        ]));

        assert_eq!(config.gateway_listen, "127.0.0.1:8080");
        assert_eq!(config.namespace, Some(TenantPartition::new("prod")));
        assert!(config.signature_verification);
        assert_eq!(
            config.identity_snapshot,
            Some(PathBuf::from("/etc/lambdagate/snapshot.json"))
        );
        assert_eq!(config.sync_timeout, Duration::from_secs(5));
        assert_eq!(config.nats_url, "nats://bus.internal:4222");
    }

    #[test]
    fn test_should_treat_blank_namespace_as_multi_tenant() {
        let config = GatewayConfig::from_lookup(lookup_from(&[("GATEWAY_NAMESPACE", "  ")]));
        assert!(config.namespace.is_none());
    }

    #[test]
    fn test_should_ignore_unparseable_durations() {
        let config =
            GatewayConfig::from_lookup(lookup_from(&[("IDENTITY_SYNC_INTERVAL_SECS", "soon")]));
        assert_eq!(config.sync_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_should_parse_listen_addr() {
        let config = GatewayConfig::default();
        assert_eq!(config.listen_addr().unwrap().port(), 9000);

        let config = GatewayConfig::from_lookup(lookup_from(&[("GATEWAY_LISTEN", "localhost")]));
        let err = config.listen_addr().unwrap_err();
        assert!(err.to_string().contains("\"localhost\""));
    }

    #[test]
    fn test_should_keep_default_for_zero_sync_interval() {
        let config = GatewayConfig::from_lookup(lookup_from(&[("IDENTITY_SYNC_INTERVAL_SECS", "0")]));
        assert_eq!(config.sync_interval, Duration::from_secs(30));

        let config = GatewayConfig::from_lookup(lookup_from(&[("IDENTITY_SYNC_INTERVAL_SECS", "7")]));
        assert_eq!(config.sync_interval, Duration::from_secs(7));
    }
}
