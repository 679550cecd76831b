//! Lambda-compatible HTTP service layer for LambdaGate.
//!
//! This crate turns SigV4-signed Lambda API calls into invocations on the
//! execution bus and renders the Lambda wire responses:
//!
//! - [`service`] - The hyper service: body buffering, authentication,
//!   routing, common headers
//! - [`router`] - `POST /{apiVersion}/functions/{name}/invocations`
//! - [`invoke`] - The `Invoke` operation and its log/completion loop
//! - [`response`] - Error envelopes, framing, and response headers
//! - [`error`] - Lambda error codes and their HTTP status

pub mod error;
pub mod invoke;
pub mod response;
pub mod router;
pub mod service;

pub use error::{LambdaError, LambdaErrorCode};
pub use invoke::{InvocationGateway, InvocationType, InvokeRequest, LogType};
pub use response::LambdaResponse;
pub use service::{GatewayDeps, LambdaHttpService};
