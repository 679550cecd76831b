//! Background sync of identities, secrets, and function definitions.
//!
//! The control plane is read from a JSON snapshot file:
//!
//! ```json
//! {
//!   "identities": [{"partition": "prod", "name": "builder", "secrets": ["builder-token"]}],
//!   "secrets": [{"partition": "prod", "name": "builder-token", "data": {"token": "..."}}],
//!   "functions": [{"partition": "prod", "name": "echo", "timeout_secs": 5}]
//! }
//! ```
//!
//! Each reload replaces the cached view wholesale. A reload that fails after
//! the first successful sync leaves the previous view in place.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use lambdagate_auth::IdentityCache;
use lambdagate_auth::identity::{SecretRecord, WorkloadIdentity};
use lambdagate_invoke::{FunctionDefinition, InMemoryFunctionRegistry};
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Shortest reload period; `tokio::time::interval` rejects zero.
const MIN_SYNC_INTERVAL: Duration = Duration::from_secs(1);

/// Contents of a snapshot file.
#[derive(Debug, Default, Deserialize)]
pub struct ControlPlaneSnapshot {
    #[serde(default)]
    pub identities: Vec<WorkloadIdentity>,
    #[serde(default)]
    pub secrets: Vec<SecretRecord>,
    #[serde(default)]
    pub functions: Vec<FunctionDefinition>,
}

/// Read and parse a snapshot file.
pub async fn load_snapshot(path: &Path) -> Result<ControlPlaneSnapshot> {
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read snapshot {}", path.display()))?;
    serde_json::from_slice(&raw)
        .with_context(|| format!("invalid snapshot JSON in {}", path.display()))
}

/// Keeps the identity cache and function registry in step with the snapshot.
#[derive(Debug)]
pub struct SnapshotSync {
    path: Option<PathBuf>,
    interval: Duration,
    identities: Arc<IdentityCache>,
    functions: Arc<InMemoryFunctionRegistry>,
}

impl SnapshotSync {
    pub fn new(
        path: Option<PathBuf>,
        interval: Duration,
        identities: Arc<IdentityCache>,
        functions: Arc<InMemoryFunctionRegistry>,
    ) -> Self {
        Self {
            path,
            interval,
            identities,
            functions,
        }
    }

    /// Load the snapshot once and swap it in.
    ///
    /// Without a snapshot path the view stays empty and is marked synced.
    pub async fn sync_once(&self) -> Result<()> {
        let Some(path) = &self.path else {
            self.identities.mark_synced();
            return Ok(());
        };

        let snapshot = load_snapshot(path).await?;
        debug!(
            identities = snapshot.identities.len(),
            secrets = snapshot.secrets.len(),
            functions = snapshot.functions.len(),
            "applying control-plane snapshot"
        );
        self.identities.replace(snapshot.identities, snapshot.secrets);
        self.functions.replace(snapshot.functions);
        self.identities.mark_synced();
        Ok(())
    }

    /// Reload forever on the configured interval.
    pub async fn run(self) {
        if self.path.is_none() {
            info!("no identity snapshot configured, serving an empty control plane");
            self.identities.mark_synced();
            return;
        }

        let mut ticker = tokio::time::interval(self.interval.max(MIN_SYNC_INTERVAL));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = self.sync_once().await {
                if self.identities.is_synced() {
                    warn!(error = %format!("{e:#}"), "snapshot reload failed, keeping previous view");
                } else {
                    warn!(error = %format!("{e:#}"), "initial snapshot load failed");
                }
            }
        }
    }
}
