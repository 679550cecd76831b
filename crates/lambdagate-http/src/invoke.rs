//! The `Invoke` operation.
//!
//! Order of checks: body must be JSON, the function must exist in the
//! caller's partition, then the invocation type decides what happens:
//!
//! | `X-Amz-Invocation-Type` | Outcome |
//! |---|---|
//! | `RequestResponse` (default) | run, wait, 200 with result or error envelope |
//! | `DryRun` | 204, nothing published |
//! | `Event` | 400 `InvalidParameterValueException` |
//!
//! A `RequestResponse` call drains logs and watches for completion in one
//! loop; neither blocks the other. The deadline belongs to the correlator, so
//! a silent executor still produces a completion.

use std::str::FromStr;
use std::sync::Arc;

use bytes::Bytes;
use lambdagate_auth::AuthenticatedContext;
use lambdagate_invoke::{
    FunctionDefinition, FunctionRegistry, InvocationCorrelator, InvocationResult,
    InvokeRequestRecord, LogCursor,
};
use serde_json::value::RawValue;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::error::LambdaError;
use crate::response::{LambdaResponse, dry_run_response, invocation_response};

/// Request header selecting the invocation type.
pub const INVOCATION_TYPE_HEADER: &str = "x-amz-invocation-type";

/// Request header asking for tail logs.
pub const LOG_TYPE_HEADER: &str = "x-amz-log-type";

/// How the caller wants the function run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvocationType {
    /// Run and wait for the outcome.
    #[default]
    RequestResponse,
    /// Fire and forget; not supported.
    Event,
    /// Validate only.
    DryRun,
}

impl FromStr for InvocationType {
    type Err = LambdaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RequestResponse" => Ok(Self::RequestResponse),
            "Event" => Ok(Self::Event),
            "DryRun" => Ok(Self::DryRun),
            other => Err(LambdaError::invalid_parameter(format!(
                "unsupported invocation type: {other}"
            ))),
        }
    }
}

/// Whether to return tail logs. Anything but `Tail` means none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogType {
    /// No logs in the response.
    #[default]
    None,
    /// Logs in `X-Amz-Log-Result`.
    Tail,
}

impl LogType {
    fn from_header(value: Option<&str>) -> Self {
        match value {
            Some("Tail") => Self::Tail,
            _ => Self::None,
        }
    }
}

/// A parsed `Invoke` call.
#[derive(Debug, Clone)]
pub struct InvokeRequest {
    /// Target function name.
    pub function_name: String,
    /// Raw JSON arguments.
    pub args: Bytes,
    /// Raw `X-Amz-Invocation-Type` value; interpreted after the function
    /// lookup.
    pub raw_invocation_type: Option<String>,
    /// Requested log type.
    pub log_type: LogType,
}

impl InvokeRequest {
    /// Read the invocation options from the request headers.
    #[must_use]
    pub fn from_parts(function_name: String, headers: &http::HeaderMap, args: Bytes) -> Self {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
        Self {
            function_name,
            args,
            raw_invocation_type: header(INVOCATION_TYPE_HEADER).map(ToOwned::to_owned),
            log_type: LogType::from_header(header(LOG_TYPE_HEADER)),
        }
    }

    /// The requested invocation type; absent or empty means
    /// `RequestResponse`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameterValueException` for an unknown type.
    pub fn invocation_type(&self) -> Result<InvocationType, LambdaError> {
        match self.raw_invocation_type.as_deref() {
            None | Some("") => Ok(InvocationType::default()),
            Some(value) => value.parse(),
        }
    }
}

/// Newline-joined log text collected during one invocation.
#[derive(Debug, Default)]
pub struct LogAccumulator {
    text: String,
}

impl LogAccumulator {
    /// Pull every currently available event from `cursor` without waiting.
    pub fn drain(&mut self, cursor: &mut LogCursor) {
        while let Some(event) = cursor.next_event() {
            self.text.push_str(&event.text);
            self.text.push('\n');
        }
    }

    /// The accumulated text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

/// Drives invocations from HTTP calls to rendered responses.
#[derive(Clone)]
pub struct InvocationGateway {
    functions: Arc<dyn FunctionRegistry>,
    correlator: InvocationCorrelator,
    shutdown: watch::Receiver<bool>,
}

impl std::fmt::Debug for InvocationGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationGateway")
            .field("correlator", &self.correlator)
            .finish_non_exhaustive()
    }
}

impl InvocationGateway {
    /// Create a gateway. In-flight invocations abort once `shutdown` is `true`.
    #[must_use]
    pub fn new(
        functions: Arc<dyn FunctionRegistry>,
        correlator: InvocationCorrelator,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            functions,
            correlator,
            shutdown,
        }
    }

    /// Handle one `Invoke` call for an authenticated caller.
    ///
    /// # Errors
    ///
    /// Returns a [`LambdaError`] for invalid input, unknown functions, and
    /// upstream failures. Remote execution failures are not errors here; they
    /// render as 200 responses.
    pub async fn invoke(
        &self,
        ctx: &AuthenticatedContext,
        request: InvokeRequest,
    ) -> Result<LambdaResponse, LambdaError> {
        serde_json::from_slice::<&RawValue>(&request.args).map_err(|e| {
            LambdaError::invalid_parameter(format!("request body is not valid JSON: {e}"))
                .with_source(e)
        })?;

        let function = self.lookup(ctx, &request.function_name)?;

        match request.invocation_type()? {
            InvocationType::DryRun => {
                debug!(function = %function.endpoint(), "dry run");
                Ok(dry_run_response())
            }
            InvocationType::Event => Err(LambdaError::invalid_parameter(
                "asynchronous invocation is not supported",
            )),
            InvocationType::RequestResponse => {
                self.request_response(&function, request.args, request.log_type)
                    .await
            }
        }
    }

    fn lookup(
        &self,
        ctx: &AuthenticatedContext,
        name: &str,
    ) -> Result<Arc<FunctionDefinition>, LambdaError> {
        match self.functions.get_function(&ctx.partition, name) {
            Ok(Some(function)) => Ok(function),
            Ok(None) => Err(LambdaError::not_found(format!(
                "Function not found: {}/{name}",
                ctx.partition
            ))),
            Err(e) => {
                error!(partition = %ctx.partition, function = name, error = %e, "function lookup failed");
                Err(LambdaError::service("failed to read function definition").with_source(e))
            }
        }
    }

    async fn request_response(
        &self,
        function: &FunctionDefinition,
        args: Bytes,
        log_type: LogType,
    ) -> Result<LambdaResponse, LambdaError> {
        let record = InvokeRequestRecord::new(function.endpoint(), args, function.timeout());
        let mut handle = self.correlator.open(record).await.map_err(|e| {
            error!(function = %function.endpoint(), error = %e, "failed to start invocation");
            LambdaError::service("failed to start invocation").with_source(e)
        })?;
        info!(
            request_id = handle.request_id(),
            function = %handle.endpoint(),
            "invocation started"
        );

        let mut cursor = handle.logs();
        let mut logs = LogAccumulator::default();
        let mut shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                () = cursor.changed() => logs.drain(&mut cursor),
                () = handle.done() => break,
                () = shutdown_requested(&mut shutdown) => {
                    info!(request_id = handle.request_id(), "invocation aborted by shutdown");
                    return Err(LambdaError::service("gateway is shutting down"));
                }
            }
        }
        logs.drain(&mut cursor);

        let result = handle.result().ok_or_else(|| {
            LambdaError::service("invocation finished without an outcome")
        })?;
        if let InvocationResult::Failure(failure) = &result {
            debug!(
                request_id = handle.request_id(),
                kind = ?failure.kind,
                message = %failure.message,
                "invocation failed remotely"
            );
        }

        let tail = (log_type == LogType::Tail).then(|| logs.as_str());
        Ok(invocation_response(&result, tail))
    }
}

/// Resolve once shutdown is signalled. Never resolves if the signal source is
/// gone without signalling.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    let signalled = rx.wait_for(|stop| *stop).await.is_ok();
    if !signalled {
        std::future::pending::<()>().await;
    }
}
