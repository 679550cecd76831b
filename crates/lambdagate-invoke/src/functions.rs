//! Function definitions as read from the backend control plane.

use std::sync::Arc;
use std::time::Duration;

use lambdagate_core::{FunctionEndpoint, PartitionStore, TenantPartition};
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// Execution budget used when a definition carries none.
pub const DEFAULT_TIMEOUT_SECS: u64 = 3;

/// The part of a function's configuration the gateway reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    /// Owning partition.
    pub partition: TenantPartition,
    /// Function name.
    pub name: String,
    /// Execution timeout in seconds; `0` means the default.
    #[serde(default)]
    pub timeout_secs: u64,
}

impl FunctionDefinition {
    /// Address of this function on the bus.
    #[must_use]
    pub fn endpoint(&self) -> FunctionEndpoint {
        FunctionEndpoint::new(self.partition.clone(), self.name.clone())
    }

    /// Configured execution timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        match self.timeout_secs {
            0 => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            secs => Duration::from_secs(secs),
        }
    }
}

/// Read access to function definitions.
pub trait FunctionRegistry: Send + Sync {
    /// Look up a function. `Ok(None)` means it does not exist.
    fn get_function(
        &self,
        partition: &TenantPartition,
        name: &str,
    ) -> Result<Option<Arc<FunctionDefinition>>, RegistryError>;
}

/// Function registry held in memory, filled by the background sync.
#[derive(Debug, Default)]
pub struct InMemoryFunctionRegistry {
    functions: PartitionStore<FunctionDefinition>,
}

impl InMemoryFunctionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a definition.
    pub fn upsert(&self, function: FunctionDefinition) {
        let partition = function.partition.clone();
        let name = function.name.clone();
        self.functions.insert(&partition, name, function);
    }

    /// Replace every definition.
    pub fn replace(&self, functions: impl IntoIterator<Item = FunctionDefinition>) {
        self.functions.replace_all(
            functions
                .into_iter()
                .map(|f| (f.partition.clone(), f.name.clone(), f)),
        );
    }

    /// Definitions in a partition.
    #[must_use]
    pub fn list(&self, partition: &TenantPartition) -> Vec<Arc<FunctionDefinition>> {
        self.functions.list(partition)
    }
}

impl FunctionRegistry for InMemoryFunctionRegistry {
    fn get_function(
        &self,
        partition: &TenantPartition,
        name: &str,
    ) -> Result<Option<Arc<FunctionDefinition>>, RegistryError> {
        Ok(self.functions.get(partition, name))
    }
}
