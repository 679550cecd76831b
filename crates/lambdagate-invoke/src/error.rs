//! Error types for the invocation pipeline.

/// Failures of the execution bus transport.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// The initial connection could not be established.
    #[error("failed to connect to {url}: {reason}")]
    Connect {
        /// Server address.
        url: String,
        /// Transport-specific cause.
        reason: String,
    },

    /// The bus connection is gone.
    #[error("execution bus is closed")]
    Closed,

    /// A publish was refused by the transport.
    #[error("failed to publish to {subject}: {reason}")]
    Publish {
        /// Target subject.
        subject: String,
        /// Transport-specific cause.
        reason: String,
    },

    /// A subscription could not be set up.
    #[error("failed to subscribe to {subject}: {reason}")]
    Subscribe {
        /// Target subject.
        subject: String,
        /// Transport-specific cause.
        reason: String,
    },
}

/// Failures opening an invocation session.
///
/// All of these surface to HTTP callers as an upstream service error. None is
/// retried.
#[derive(Debug, thiserror::Error)]
pub enum CorrelatorError {
    /// The arguments payload is not a single JSON value.
    #[error("invocation arguments are not valid JSON: {0}")]
    InvalidArgs(#[source] serde_json::Error),

    /// The request message could not be encoded.
    #[error("failed to encode invoke request: {0}")]
    Encode(#[source] serde_json::Error),

    /// Subscribing to the reply inbox or publishing the request failed.
    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Failures reading the function registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The backend could not answer.
    #[error("function registry unavailable: {0}")]
    Unavailable(String),
}
