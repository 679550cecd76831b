//! Core types, configuration, and state management for LambdaGate.
//!
//! This crate provides the building blocks shared by the authentication,
//! invocation, and HTTP crates: tenant-partitioned state storage, gateway
//! configuration, and the small set of domain types (tenant partitions and
//! function endpoints) that flow between them.

mod config;
mod error;
mod state;
mod types;

pub use config::GatewayConfig;
pub use error::{GatewayError, GatewayResult};
pub use state::PartitionStore;
pub use types::{FunctionEndpoint, TenantPartition};
