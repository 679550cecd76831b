//! Lambda API error types.
//!
//! Errors are rendered as the Lambda JSON envelope:
//!
//! ```json
//! {"Type": "User", "message": "...", "__type": "ResourceNotFoundException"}
//! ```

use std::fmt;

use lambdagate_auth::AuthErrorCode;
use lambdagate_auth::authenticator::Rejection;

/// Error codes the gateway can answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LambdaErrorCode {
    /// Bad date, malformed credential, or signature mismatch.
    InvalidCredentialException,
    /// Missing `Authorization` header.
    InvalidAuthorizationException,
    /// Region outside the gateway's partition.
    InvalidRegionException,
    /// Malformed body or unsupported invocation type.
    InvalidParameterValueException,
    /// Unknown function or route.
    ResourceNotFoundException,
    /// Backend or bus failure.
    ServiceException,
}

impl LambdaErrorCode {
    /// The `__type` string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidCredentialException => "InvalidCredentialException",
            Self::InvalidAuthorizationException => "InvalidAuthorizationException",
            Self::InvalidRegionException => "InvalidRegionException",
            Self::InvalidParameterValueException => "InvalidParameterValueException",
            Self::ResourceNotFoundException => "ResourceNotFoundException",
            Self::ServiceException => "ServiceException",
        }
    }

    /// The HTTP status this code maps to outside the authenticator.
    #[must_use]
    pub fn default_status_code(&self) -> http::StatusCode {
        match self {
            Self::ResourceNotFoundException => http::StatusCode::NOT_FOUND,
            Self::ServiceException => http::StatusCode::INTERNAL_SERVER_ERROR,
            _ => http::StatusCode::BAD_REQUEST,
        }
    }
}

impl fmt::Display for LambdaErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<AuthErrorCode> for LambdaErrorCode {
    fn from(code: AuthErrorCode) -> Self {
        match code {
            AuthErrorCode::InvalidCredentialException => Self::InvalidCredentialException,
            AuthErrorCode::InvalidAuthorizationException => Self::InvalidAuthorizationException,
            AuthErrorCode::InvalidRegionException => Self::InvalidRegionException,
        }
    }
}

/// A Lambda API error response.
#[derive(Debug)]
pub struct LambdaError {
    /// The error code.
    pub code: LambdaErrorCode,
    /// A human-readable message.
    pub message: String,
    /// The HTTP status code.
    pub status_code: http::StatusCode,
    /// The underlying cause, logged but never rendered.
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for LambdaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LambdaError({}): {}", self.code, self.message)
    }
}

impl std::error::Error for LambdaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl LambdaError {
    /// Create an error whose message is the code itself.
    #[must_use]
    pub fn new(code: LambdaErrorCode) -> Self {
        Self::with_message(code, code.as_str())
    }

    /// Create an error with a custom message.
    #[must_use]
    pub fn with_message(code: LambdaErrorCode, message: impl Into<String>) -> Self {
        Self {
            status_code: code.default_status_code(),
            message: message.into(),
            code,
            source: None,
        }
    }

    /// Attach the underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// The `Type` field: `Server` for 5xx, `User` otherwise.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        if self.status_code.is_server_error() {
            "Server"
        } else {
            "User"
        }
    }

    /// Authentication rejections always answer 400 and only name the code.
    #[must_use]
    pub fn from_rejection(rejection: Rejection) -> Self {
        let code = LambdaErrorCode::from(rejection.code());
        Self {
            code,
            message: code.as_str().to_owned(),
            status_code: http::StatusCode::BAD_REQUEST,
            source: Some(Box::new(rejection)),
        }
    }

    /// 400 InvalidParameterValueException.
    #[must_use]
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::with_message(LambdaErrorCode::InvalidParameterValueException, message)
    }

    /// 404 ResourceNotFoundException.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::with_message(LambdaErrorCode::ResourceNotFoundException, message)
    }

    /// 500 ServiceException.
    #[must_use]
    pub fn service(message: impl Into<String>) -> Self {
        Self::with_message(LambdaErrorCode::ServiceException, message)
    }
}
