//! Bus-mediated function invocation for LambdaGate.
//!
//! A synchronous Lambda `Invoke` call becomes an asynchronous exchange on an
//! execution bus: the gateway publishes one request to the function's subject
//! and listens on a private reply inbox for log lines and a final outcome.
//!
//! - [`bus`] - The [`ExecutionBus`] seam and an in-process implementation
//! - [`nats`] - [`NatsBus`], the Core NATS transport used in production
//! - [`correlator`] - [`InvocationCorrelator`] and its per-request handle
//! - [`log_stream`] - Append-only log buffer with a wake-up signal
//! - [`messages`] - Subjects and wire messages
//! - [`functions`] - Function definitions and the registry seam
//! - [`clock`] - Injectable wall clock

pub mod bus;
pub mod clock;
pub mod correlator;
pub mod error;
pub mod functions;
pub mod log_stream;
pub mod messages;
pub mod nats;

pub use bus::{ExecutionBus, InMemoryBus, Subscription};
pub use clock::{Clock, SystemClock};
pub use correlator::{
    FailureKind, InvocationCorrelator, InvocationFailure, InvocationHandle, InvocationResult,
};
pub use error::{BusError, CorrelatorError, RegistryError};
pub use functions::{FunctionDefinition, FunctionRegistry, InMemoryFunctionRegistry};
pub use log_stream::{LogBuffer, LogCursor, LogEvent};
pub use messages::InvokeRequestRecord;
pub use nats::NatsBus;
