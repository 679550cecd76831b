//! Error types for the LambdaGate core.

/// Core error type for LambdaGate infrastructure.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// `GATEWAY_LISTEN` is not a socket address.
    #[error("invalid listen address {addr:?}: {source}")]
    InvalidListenAddress {
        /// The configured value.
        addr: String,
        /// Parser failure.
        #[source]
        source: std::net::AddrParseError,
    },
}

/// Convenience result type for LambdaGate operations.
pub type GatewayResult<T> = Result<T, GatewayError>;
