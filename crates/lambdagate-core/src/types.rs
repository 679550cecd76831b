//! Domain types shared across the gateway crates.

use std::fmt;

/// Multi-tenant scoping key.
///
/// The region declared in a SigV4 credential scope doubles as the tenant
/// partition: identities, secrets, and functions are all namespaced by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct TenantPartition(String);

impl TenantPartition {
    /// Create a new partition key.
    #[must_use]
    pub fn new(partition: impl Into<String>) -> Self {
        Self(partition.into())
    }

    /// Get the partition as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the partition key is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for TenantPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantPartition {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Address of a deployed function: its tenant partition plus its name.
///
/// Rendered as `partition/name`, which is also how the execution bus scopes
/// request subjects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct FunctionEndpoint {
    /// Partition owning the function.
    pub partition: TenantPartition,
    /// Function name within the partition.
    pub name: String,
}

impl FunctionEndpoint {
    /// Create a new endpoint.
    #[must_use]
    pub fn new(partition: impl Into<TenantPartition>, name: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for FunctionEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.partition, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_render_endpoint_as_partition_slash_name() {
        let endpoint = FunctionEndpoint::new("prod", "resize-image");
        assert_eq!(endpoint.to_string(), "prod/resize-image");
    }

    #[test]
    fn test_should_serialize_partition_transparently() {
        let json = serde_json::to_string(&TenantPartition::new("prod")).unwrap();
        assert_eq!(json, "\"prod\"");
    }
}
