//! Error types for request authentication.
//!
//! [`AuthError`] carries the precise internal cause of a rejection for
//! diagnostics. Callers only ever see the coarse [`AuthErrorCode`] returned by
//! [`AuthError::code`], so a client cannot tell an unknown identity from a
//! missing secret or a bad signature.

use std::fmt;

use lambdagate_core::TenantPartition;

/// Wire-level error codes produced by the authenticator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorCode {
    /// Bad date, malformed header or scope, unresolvable credential, or
    /// signature mismatch.
    InvalidCredentialException,
    /// The `Authorization` header is absent.
    InvalidAuthorizationException,
    /// The credential-scope region is empty or outside the fixed partition.
    InvalidRegionException,
}

impl AuthErrorCode {
    /// Returns the error code string used in the `__type` field.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidCredentialException => "InvalidCredentialException",
            Self::InvalidAuthorizationException => "InvalidAuthorizationException",
            Self::InvalidRegionException => "InvalidRegionException",
        }
    }
}

impl fmt::Display for AuthErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The five slash-delimited fields of a SigV4 credential scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeField {
    /// `<accessKeyId>`
    AccessKeyId,
    /// `<date8>` (`yyyyMMdd`)
    Date,
    /// `<region>`
    Region,
    /// `<service>`; must be `lambda`.
    Service,
    /// `aws4_request`
    Terminator,
}

impl fmt::Display for ScopeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AccessKeyId => "access key id",
            Self::Date => "date",
            Self::Region => "region",
            Self::Service => "service",
            Self::Terminator => "terminator",
        })
    }
}

/// Why the credential scope could not be extracted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
    /// No `Credential=` parameter.
    #[error("missing Credential parameter")]
    MissingCredential,

    /// No `SignedHeaders=` parameter following the credential.
    #[error("missing SignedHeaders parameter")]
    MissingSignedHeaders,

    /// The scope did not split into exactly five fields.
    #[error("credential scope has {0} fields, expected 5")]
    FieldCount(usize),

    /// One field failed validation.
    #[error("invalid credential scope {field}: {value:?}")]
    InvalidField {
        /// The failing field.
        field: ScopeField,
        /// The presented value.
        value: String,
    },
}

/// Failure to resolve a secret token for an access key.
///
/// Every variant surfaces externally as
/// [`AuthErrorCode::InvalidCredentialException`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    /// No workload identity with that name in the partition.
    #[error("identity {partition}/{name} not found")]
    IdentityNotFound {
        /// Partition searched.
        partition: TenantPartition,
        /// Identity name (the access key id).
        name: String,
    },

    /// The identity exists but no secret is bound to it.
    #[error("no secret found for identity {partition}/{name}")]
    SecretNotFound {
        /// Partition searched.
        partition: TenantPartition,
        /// Identity name.
        name: String,
    },

    /// The bound secret has no token field.
    #[error("secret {partition}/{secret} has no token field")]
    TokenMissing {
        /// Partition searched.
        partition: TenantPartition,
        /// Secret name.
        secret: String,
    },
}

/// Errors that can occur while authenticating a request.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// `X-Amz-Date` is missing or not `yyyyMMdd'T'HHmmss'Z'`.
    #[error("invalid X-Amz-Date: {0:?}")]
    InvalidDate(String),

    /// The `Authorization` header is missing.
    #[error("missing Authorization header")]
    MissingAuthHeader,

    /// The `Authorization` header is present but not parseable.
    #[error("malformed Authorization header")]
    MalformedAuthHeader,

    /// The signing algorithm is not `AWS4-HMAC-SHA256`.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The credential scope is malformed.
    #[error(transparent)]
    InvalidScope(#[from] ScopeError),

    /// The credential-scope region is empty.
    #[error("empty region in credential scope")]
    EmptyRegion,

    /// The credential-scope region differs from the fixed partition.
    #[error("region {presented} is outside partition {expected}")]
    RegionMismatch {
        /// The partition this gateway is bound to.
        expected: TenantPartition,
        /// The region presented by the client.
        presented: String,
    },

    /// The access key could not be resolved to a secret.
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// The recomputed signature does not match the presented one.
    #[error("signature does not match")]
    SignatureDoesNotMatch,
}

impl AuthError {
    /// Map the internal cause to its wire-level code.
    #[must_use]
    pub fn code(&self) -> AuthErrorCode {
        match self {
            Self::MissingAuthHeader => AuthErrorCode::InvalidAuthorizationException,
            Self::EmptyRegion | Self::RegionMismatch { .. } => {
                AuthErrorCode::InvalidRegionException
            }
            Self::InvalidDate(_)
            | Self::MalformedAuthHeader
            | Self::UnsupportedAlgorithm(_)
            | Self::InvalidScope(_)
            | Self::Credential(_)
            | Self::SignatureDoesNotMatch => AuthErrorCode::InvalidCredentialException,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_collapse_credential_failures_to_one_code() {
        let partition = TenantPartition::new("prod");
        let errors = [
            AuthError::Credential(CredentialError::IdentityNotFound {
                partition: partition.clone(),
                name: "a".to_owned(),
            }),
            AuthError::Credential(CredentialError::SecretNotFound {
                partition: partition.clone(),
                name: "a".to_owned(),
            }),
            AuthError::Credential(CredentialError::TokenMissing {
                partition,
                secret: "a-token".to_owned(),
            }),
            AuthError::SignatureDoesNotMatch,
        ];
        for err in errors {
            assert_eq!(err.code(), AuthErrorCode::InvalidCredentialException);
        }
    }

    #[test]
    fn test_should_map_missing_header_to_invalid_authorization() {
        assert_eq!(
            AuthError::MissingAuthHeader.code(),
            AuthErrorCode::InvalidAuthorizationException
        );
    }

    #[test]
    fn test_should_map_region_failures_to_invalid_region() {
        assert_eq!(AuthError::EmptyRegion.code().as_str(), "InvalidRegionException");
        let err = AuthError::RegionMismatch {
            expected: TenantPartition::new("prod"),
            presented: "dev".to_owned(),
        };
        assert_eq!(err.code(), AuthErrorCode::InvalidRegionException);
    }

    #[test]
    fn test_should_describe_failing_scope_field() {
        let err = ScopeError::InvalidField {
            field: ScopeField::Service,
            value: "s3".to_owned(),
        };
        assert_eq!(err.to_string(), "invalid credential scope service: \"s3\"");
    }
}
