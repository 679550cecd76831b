//! Wire messages exchanged with function executors.
//!
//! Requests are published to `refunc.<partition>.<function>`. Each invocation
//! gets a private reply inbox on which the executor streams log lines and
//! finally one result or error:
//!
//! ```text
//! → refunc.prod.echo
//!   {"request_id":"…","args":{…},"reply_to":"_lambdagate.inbox.prod.echo.…",
//!    "deadline":"2024-03-15T10:15:03Z","with_logs":true}
//! ← {"log":"starting"}
//! ← {"log":"done"}
//! ← {"result":{"ok":true}}
//! ```

use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use lambdagate_core::FunctionEndpoint;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use sha2::{Digest, Sha256};

/// Prefix of every request subject.
pub const REQUEST_SUBJECT_PREFIX: &str = "refunc";

/// Prefix of every reply inbox.
pub const INBOX_PREFIX: &str = "_lambdagate.inbox";

/// Subject the executor for `endpoint` listens on.
#[must_use]
pub fn request_subject(endpoint: &FunctionEndpoint) -> String {
    format!(
        "{REQUEST_SUBJECT_PREFIX}.{}.{}",
        endpoint.partition, endpoint.name
    )
}

/// A fresh, unguessable reply inbox for one invocation against `endpoint`.
#[must_use]
pub fn reply_inbox(endpoint: &FunctionEndpoint) -> String {
    format!(
        "{INBOX_PREFIX}.{}.{}.{}",
        endpoint.partition,
        endpoint.name,
        uuid::Uuid::new_v4().simple()
    )
}

/// Content fingerprint of an arguments payload.
///
/// Identical payloads share an id. It is used for tracing only and never for
/// deduplication.
#[must_use]
pub fn request_id(args: &[u8]) -> String {
    let mut id = hex::encode(Sha256::digest(args));
    id.truncate(32);
    id
}

/// One unit of work for the bus: what to run, with what, for how long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokeRequestRecord {
    /// Fingerprint of `args`.
    pub request_id: String,
    /// The function to run.
    pub endpoint: FunctionEndpoint,
    /// Raw JSON arguments, passed through untouched.
    pub args: Bytes,
    /// Execution budget from the function's configuration.
    pub timeout: Duration,
}

impl InvokeRequestRecord {
    /// Build a record, deriving its request id from `args`.
    #[must_use]
    pub fn new(endpoint: FunctionEndpoint, args: Bytes, timeout: Duration) -> Self {
        Self {
            request_id: request_id(&args),
            endpoint,
            args,
            timeout,
        }
    }
}

/// The request message published to the function subject.
#[derive(Debug, Serialize, Deserialize)]
pub struct InvokeMessage {
    /// Fingerprint of the arguments.
    pub request_id: String,
    /// Arguments, embedded verbatim.
    pub args: Box<RawValue>,
    /// Inbox to stream replies to.
    pub reply_to: String,
    /// Point in time after which the gateway stops waiting.
    pub deadline: DateTime<Utc>,
    /// Whether the executor should forward log lines.
    pub with_logs: bool,
}

/// Error details reported by an executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    /// Human-readable message.
    pub message: String,
    /// Error class, e.g. `Runtime.ExitError`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

/// One message on a reply inbox.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyMessage {
    /// A log line.
    Log(String),
    /// Successful completion with a raw JSON payload.
    Result(Box<RawValue>),
    /// Failed completion.
    Error(RemoteError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_derive_stable_request_id_from_content() {
        let a = request_id(br#"{"x":1}"#);
        assert_eq!(a.len(), 32);
        assert_eq!(a, request_id(br#"{"x":1}"#));
        assert_ne!(a, request_id(br#"{"x":2}"#));
    }

    #[test]
    fn test_should_scope_subjects_to_endpoint() {
        let endpoint = FunctionEndpoint::new("prod", "echo");
        assert_eq!(request_subject(&endpoint), "refunc.prod.echo");

        let a = reply_inbox(&endpoint);
        let b = reply_inbox(&endpoint);
        assert!(a.starts_with("_lambdagate.inbox.prod.echo."));
        assert_ne!(a, b);
    }

    #[test]
    fn test_should_decode_tagged_replies() {
        let log: ReplyMessage = serde_json::from_str(r#"{"log":"hello"}"#).unwrap();
        assert!(matches!(log, ReplyMessage::Log(line) if line == "hello"));

        let result: ReplyMessage = serde_json::from_str(r#"{"result":{"a":[1,2]}}"#).unwrap();
        assert!(matches!(result, ReplyMessage::Result(raw) if raw.get() == r#"{"a":[1,2]}"#));

        let error: ReplyMessage =
            serde_json::from_str(r#"{"error":{"message":"boom"}}"#).unwrap();
        assert!(matches!(
            error,
            ReplyMessage::Error(RemoteError { message, error_type: None }) if message == "boom"
        ));
    }

    #[test]
    fn test_should_embed_args_verbatim() {
        let message = InvokeMessage {
            request_id: "id".to_owned(),
            args: serde_json::from_str(r#"[1, "two"]"#).unwrap(),
            reply_to: "inbox".to_owned(),
            deadline: DateTime::from_timestamp(0, 0).unwrap(),
            with_logs: true,
        };
        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains(r#""args":[1, "two"]"#));
        assert!(json.contains(r#""deadline":"1970-01-01T00:00:00Z""#));
    }
}
