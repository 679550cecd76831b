//! Turning a one-shot bus publish into an awaitable invocation.
//!
//! [`InvocationCorrelator::open`] subscribes to a private reply inbox, publishes
//! the request exactly once, and hands back an [`InvocationHandle`]. A pump
//! task owned by the handle reads the inbox: log lines go into the handle's
//! [`LogBuffer`], the first result or error resolves the handle, and the
//! function's deadline resolves it with a timeout failure if nothing else did.
//!
//! Dropping the handle aborts the pump, which releases the inbox subscription
//! and the deadline timer. Nothing ever waits for a reply that may not come.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, TimeDelta, Utc};
use lambdagate_core::FunctionEndpoint;
use serde_json::value::RawValue;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::bus::{ExecutionBus, Subscription};
use crate::clock::Clock;
use crate::error::CorrelatorError;
use crate::log_stream::{LogBuffer, LogCursor};
use crate::messages::{
    InvokeMessage, InvokeRequestRecord, RemoteError, ReplyMessage, reply_inbox, request_subject,
};

/// Why an invocation did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// The function itself reported an error.
    Function {
        /// Error class reported by the executor, if any.
        error_type: Option<String>,
    },
    /// The configured timeout elapsed first.
    Timeout,
    /// The reply channel went away before an outcome arrived.
    Aborted,
}

/// A remote-side failure outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationFailure {
    /// Failure class.
    pub kind: FailureKind,
    /// Human-readable message.
    pub message: String,
}

impl InvocationFailure {
    fn timeout(timeout: Duration) -> Self {
        Self {
            kind: FailureKind::Timeout,
            message: format!("Task timed out after {:.2} seconds", timeout.as_secs_f64()),
        }
    }

    fn aborted(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Aborted,
            message: message.into(),
        }
    }
}

impl From<RemoteError> for InvocationFailure {
    fn from(err: RemoteError) -> Self {
        Self {
            kind: FailureKind::Function {
                error_type: err.error_type,
            },
            message: err.message,
        }
    }
}

/// The single outcome of an invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationResult {
    /// The raw JSON payload returned by the function.
    Success(Bytes),
    /// The function failed, timed out, or the session was lost.
    Failure(InvocationFailure),
}

/// Opens invocation sessions on the execution bus.
#[derive(Debug, Clone)]
pub struct InvocationCorrelator {
    bus: Arc<dyn ExecutionBus>,
    clock: Arc<dyn Clock>,
}

impl InvocationCorrelator {
    /// Create a correlator publishing through `bus`.
    #[must_use]
    pub fn new(bus: Arc<dyn ExecutionBus>, clock: Arc<dyn Clock>) -> Self {
        Self { bus, clock }
    }

    /// Publish `record` once and return a handle on its outcome.
    ///
    /// # Errors
    ///
    /// Fails without retrying when the arguments are not JSON, or when the
    /// reply inbox cannot be opened or the publish is refused.
    pub async fn open(
        &self,
        record: InvokeRequestRecord,
    ) -> Result<InvocationHandle, CorrelatorError> {
        let args: Box<RawValue> =
            serde_json::from_slice(&record.args).map_err(CorrelatorError::InvalidArgs)?;

        let reply_to = reply_inbox(&record.endpoint);
        let inbox = self.bus.subscribe(&reply_to).await?;

        let message = InvokeMessage {
            request_id: record.request_id.clone(),
            args,
            reply_to,
            deadline: deadline_after(self.clock.now(), record.timeout),
            with_logs: true,
        };
        let payload = serde_json::to_vec(&message).map_err(CorrelatorError::Encode)?;

        let subject = request_subject(&record.endpoint);
        self.bus.publish(&subject, Bytes::from(payload)).await?;
        debug!(
            request_id = %record.request_id,
            %subject,
            timeout = ?record.timeout,
            "invoke request published"
        );

        let logs = Arc::new(LogBuffer::new());
        let (result_tx, result_rx) = watch::channel(None);
        let pump = tokio::spawn(pump_replies(
            inbox,
            Arc::clone(&logs),
            result_tx,
            record.timeout,
            record.request_id.clone(),
        ));

        Ok(InvocationHandle {
            request_id: record.request_id,
            endpoint: record.endpoint,
            logs,
            result: result_rx,
            pump,
        })
    }
}

/// A live invocation. Owned by exactly one caller; dropping it releases
/// everything tied to the session.
pub struct InvocationHandle {
    request_id: String,
    endpoint: FunctionEndpoint,
    logs: Arc<LogBuffer>,
    result: watch::Receiver<Option<InvocationResult>>,
    pump: JoinHandle<()>,
}

impl InvocationHandle {
    /// The request's content fingerprint.
    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// The invoked function.
    #[must_use]
    pub fn endpoint(&self) -> &FunctionEndpoint {
        &self.endpoint
    }

    /// A reader over this invocation's log lines, from the first one.
    #[must_use]
    pub fn logs(&self) -> LogCursor {
        LogCursor::new(Arc::clone(&self.logs))
    }

    /// Resolve once the outcome is known.
    ///
    /// Cancel safe, and returns immediately on every call after completion.
    pub async fn done(&mut self) {
        // An error means the pump is gone; `result` then reports the loss.
        let _ = self.result.wait_for(Option::is_some).await;
    }

    /// The outcome, or `None` while still running.
    ///
    /// If the pump task died without an outcome, reports an aborted failure.
    #[must_use]
    pub fn result(&self) -> Option<InvocationResult> {
        if let Some(result) = self.result.borrow().clone() {
            return Some(result);
        }
        self.pump.is_finished().then(|| {
            InvocationResult::Failure(InvocationFailure::aborted("invocation session lost"))
        })
    }
}

impl fmt::Debug for InvocationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvocationHandle")
            .field("request_id", &self.request_id)
            .field("endpoint", &self.endpoint)
            .field("logs", &self.logs.len())
            .finish_non_exhaustive()
    }
}

impl Drop for InvocationHandle {
    fn drop(&mut self) {
        if !self.pump.is_finished() {
            debug!(request_id = %self.request_id, "abandoning invocation");
        }
        self.pump.abort();
    }
}

async fn pump_replies(
    mut inbox: Subscription,
    logs: Arc<LogBuffer>,
    result_tx: watch::Sender<Option<InvocationResult>>,
    timeout: Duration,
    request_id: String,
) {
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    let outcome = loop {
        tokio::select! {
            message = inbox.next() => {
                let Some(bytes) = message else {
                    break InvocationResult::Failure(InvocationFailure::aborted(
                        "reply inbox closed before completion",
                    ));
                };
                match serde_json::from_slice::<ReplyMessage>(&bytes) {
                    Ok(ReplyMessage::Log(line)) => {
                        logs.push(line);
                    }
                    Ok(ReplyMessage::Result(raw)) => {
                        break InvocationResult::Success(Bytes::from(raw.get().to_owned()));
                    }
                    Ok(ReplyMessage::Error(err)) => {
                        break InvocationResult::Failure(err.into());
                    }
                    Err(err) => {
                        warn!(%request_id, %err, "ignoring undecodable reply");
                    }
                }
            }
            () = &mut deadline => {
                debug!(%request_id, ?timeout, "invocation deadline reached");
                break InvocationResult::Failure(InvocationFailure::timeout(timeout));
            }
        }
    };

    result_tx.send_replace(Some(outcome));
}

fn deadline_after(now: DateTime<Utc>, timeout: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(timeout)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
