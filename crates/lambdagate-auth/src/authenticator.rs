//! The request authentication state machine.
//!
//! Every request walks the same stages in order:
//!
//! ```text
//! ParseDate → ExtractAuthorizationHeader → ExtractCredentialScope
//!   → ValidateRegionScope → [VerifySignature] → Authorized
//! ```
//!
//! Each stage either advances or produces a terminal [`Rejection`]. The
//! signature stage only runs when verification is enabled; without it the
//! declared region is trusted once it parses.

use std::fmt;
use std::sync::Arc;

use chrono::NaiveDateTime;
use lambdagate_core::TenantPartition;
use tracing::{debug, warn};

use crate::credentials::SecretResolver;
use crate::error::{AuthError, AuthErrorCode};
use crate::sigv4::{self, AMZ_DATE_FORMAT, ParsedAuthorization};

/// Header carrying the signing timestamp.
pub const AMZ_DATE_HEADER: &str = "x-amz-date";

/// Width of a basic-format `X-Amz-Date` value (`YYYYMMDD'T'HHMMSS'Z'`).
const AMZ_DATE_LEN: usize = 16;

/// Static authenticator settings.
#[derive(Debug, Clone, Default)]
pub struct AuthenticatorConfig {
    /// When set, every request must be scoped to exactly this partition.
    pub namespace: Option<TenantPartition>,
    /// Whether signatures are recomputed and compared.
    pub verify_signatures: bool,
}

/// Stages of the authentication state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStage {
    /// Parse `X-Amz-Date`.
    ParseDate,
    /// Read the `Authorization` header and its algorithm.
    ExtractAuthorizationHeader,
    /// Parse the five-field credential scope.
    ExtractCredentialScope,
    /// Check the scope region against the fixed partition.
    ValidateRegionScope,
    /// Resolve the secret and compare signatures.
    VerifySignature,
    /// Terminal success.
    Authorized,
}

impl fmt::Display for AuthStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A terminal authentication failure.
#[derive(Debug, thiserror::Error)]
#[error("rejected at {stage}: {error}")]
pub struct Rejection {
    /// The stage that failed.
    pub stage: AuthStage,
    /// The internal cause. Never shown to clients.
    #[source]
    pub error: AuthError,
}

impl Rejection {
    /// The wire-level error code for this rejection.
    #[must_use]
    pub fn code(&self) -> AuthErrorCode {
        self.error.code()
    }
}

/// Identity attached to a request that passed authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedContext {
    /// The tenant partition every downstream lookup is scoped to.
    pub partition: TenantPartition,
    /// The verified access key id; `None` when signatures are not checked.
    pub access_key_id: Option<String>,
}

/// Progress through the machine, carrying what each stage produced.
enum Step<'a> {
    ParseDate,
    ExtractAuthorizationHeader {
        amz_date: &'a str,
    },
    ExtractCredentialScope {
        amz_date: &'a str,
        header: &'a str,
    },
    ValidateRegionScope {
        amz_date: &'a str,
        parsed: ParsedAuthorization,
    },
    VerifySignature {
        amz_date: &'a str,
        parsed: ParsedAuthorization,
        partition: TenantPartition,
    },
    Authorized(AuthenticatedContext),
}

impl Step<'_> {
    fn stage(&self) -> AuthStage {
        match self {
            Self::ParseDate => AuthStage::ParseDate,
            Self::ExtractAuthorizationHeader { .. } => AuthStage::ExtractAuthorizationHeader,
            Self::ExtractCredentialScope { .. } => AuthStage::ExtractCredentialScope,
            Self::ValidateRegionScope { .. } => AuthStage::ValidateRegionScope,
            Self::VerifySignature { .. } => AuthStage::VerifySignature,
            Self::Authorized(_) => AuthStage::Authorized,
        }
    }
}

/// Authenticates inbound requests. Constructed once at startup.
#[derive(Clone)]
pub struct RequestAuthenticator {
    config: AuthenticatorConfig,
    secrets: Arc<dyn SecretResolver>,
}

impl fmt::Debug for RequestAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestAuthenticator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RequestAuthenticator {
    /// Create an authenticator resolving secrets through `secrets`.
    #[must_use]
    pub fn new(config: AuthenticatorConfig, secrets: Arc<dyn SecretResolver>) -> Self {
        Self { config, secrets }
    }

    /// The authenticator settings.
    #[must_use]
    pub fn config(&self) -> &AuthenticatorConfig {
        &self.config
    }

    /// Run the state machine over a request head and its buffered body.
    ///
    /// # Errors
    ///
    /// Returns a [`Rejection`] naming the failing stage. The caller must
    /// answer immediately and skip all routing.
    pub fn authenticate(
        &self,
        parts: &http::request::Parts,
        body: &[u8],
    ) -> Result<AuthenticatedContext, Rejection> {
        let mut step = Step::ParseDate;
        loop {
            let stage = step.stage();
            step = match self.advance(step, parts, body) {
                Ok(Step::Authorized(ctx)) => {
                    debug!(partition = %ctx.partition, "request authorized");
                    return Ok(ctx);
                }
                Ok(next) => next,
                Err(error) => {
                    let rejection = Rejection { stage, error };
                    match &rejection.error {
                        AuthError::Credential(cause) => {
                            warn!(%stage, %cause, "credential resolution failed");
                        }
                        error => debug!(%stage, %error, "request rejected"),
                    }
                    return Err(rejection);
                }
            };
        }
    }

    fn advance<'a>(
        &self,
        step: Step<'a>,
        parts: &'a http::request::Parts,
        body: &[u8],
    ) -> Result<Step<'a>, AuthError> {
        match step {
            Step::ParseDate => {
                let raw = parts
                    .headers
                    .get(AMZ_DATE_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default();
                // chrono accepts single-digit fields; SigV4 dates are fixed width.
                if raw.len() != AMZ_DATE_LEN {
                    return Err(AuthError::InvalidDate(raw.to_owned()));
                }
                NaiveDateTime::parse_from_str(raw, AMZ_DATE_FORMAT)
                    .map_err(|_| AuthError::InvalidDate(raw.to_owned()))?;
                Ok(Step::ExtractAuthorizationHeader { amz_date: raw })
            }
            Step::ExtractAuthorizationHeader { amz_date } => {
                let header = parts
                    .headers
                    .get(http::header::AUTHORIZATION)
                    .ok_or(AuthError::MissingAuthHeader)?
                    .to_str()
                    .map_err(|_| AuthError::MalformedAuthHeader)?;
                Ok(Step::ExtractCredentialScope { amz_date, header })
            }
            Step::ExtractCredentialScope { amz_date, header } => {
                let parsed = sigv4::parse_authorization_header(header)?;
                Ok(Step::ValidateRegionScope { amz_date, parsed })
            }
            Step::ValidateRegionScope { amz_date, parsed } => {
                let region = parsed.scope.region.as_str();
                if region.is_empty() {
                    return Err(AuthError::EmptyRegion);
                }
                let partition = match &self.config.namespace {
                    Some(expected) if expected.as_str() != region => {
                        return Err(AuthError::RegionMismatch {
                            expected: expected.clone(),
                            presented: region.to_owned(),
                        });
                    }
                    Some(expected) => expected.clone(),
                    None => TenantPartition::new(region),
                };

                if self.config.verify_signatures {
                    Ok(Step::VerifySignature {
                        amz_date,
                        parsed,
                        partition,
                    })
                } else {
                    Ok(Step::Authorized(AuthenticatedContext {
                        partition,
                        access_key_id: None,
                    }))
                }
            }
            Step::VerifySignature {
                amz_date,
                parsed,
                partition,
            } => {
                debug!(
                    access_key_id = %parsed.scope.access_key_id,
                    scope = %parsed.scope.scope_suffix(),
                    "verifying signature"
                );
                let secret = self
                    .secrets
                    .resolve_secret(&parsed.scope.access_key_id, &partition)?;
                sigv4::verify_signature(parts, body, &parsed, &secret, amz_date)?;
                Ok(Step::Authorized(AuthenticatedContext {
                    partition,
                    access_key_id: Some(parsed.scope.access_key_id),
                }))
            }
            Step::Authorized(ctx) => Ok(Step::Authorized(ctx)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::credentials::StaticSecretResolver;
    use crate::error::CredentialError;
    use crate::sigv4::{LAMBDA_SERVICE, SigningParams, build_authorization_header};

    const AMZ_DATE: &str = "20240315T101500Z";
    const SECRET: &str = "builder-secret";

    struct CountingResolver {
        inner: StaticSecretResolver,
        calls: AtomicUsize,
    }

    impl SecretResolver for CountingResolver {
        fn resolve_secret(
            &self,
            access_key_id: &str,
            partition: &TenantPartition,
        ) -> Result<String, CredentialError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.resolve_secret(access_key_id, partition)
        }
    }

    fn resolver(region: &str) -> Arc<CountingResolver> {
        Arc::new(CountingResolver {
            inner: StaticSecretResolver::new(vec![(
                TenantPartition::new(region),
                "builder".to_owned(),
                SECRET.to_owned(),
            )]),
            calls: AtomicUsize::new(0),
        })
    }

    fn authenticator(
        namespace: Option<&str>,
        verify: bool,
        secrets: Arc<CountingResolver>,
    ) -> RequestAuthenticator {
        RequestAuthenticator::new(
            AuthenticatorConfig {
                namespace: namespace.map(TenantPartition::new),
                verify_signatures: verify,
            },
            secrets,
        )
    }

    fn unsigned(invocation_type: &str) -> http::request::Parts {
        let (parts, ()) = http::Request::builder()
            .method("POST")
            .uri("/2015-03-31/functions/echo/invocations")
            .header("host", "lambda.local:9000")
            .header("x-amz-date", AMZ_DATE)
            .header("content-type", "application/json")
            .header("x-amz-invocation-type", invocation_type)
            .body(())
            .unwrap()
            .into_parts();
        parts
    }

    fn sign(parts: &mut http::request::Parts, body: &[u8], region: &str) {
        let auth = build_authorization_header(
            parts,
            body,
            "builder",
            SigningParams {
                secret: SECRET,
                amz_date: AMZ_DATE,
                region,
                service: LAMBDA_SERVICE,
            },
        );
        parts
            .headers
            .insert(http::header::AUTHORIZATION, auth.parse().unwrap());
    }

    #[test]
    fn test_should_authorize_correctly_signed_request() {
        let body = br#"{"hello":"world"}"#;
        let mut parts = unsigned("RequestResponse");
        sign(&mut parts, body, "prod");

        let ctx = authenticator(None, true, resolver("prod"))
            .authenticate(&parts, body)
            .unwrap();
        assert_eq!(ctx.partition.as_str(), "prod");
        assert_eq!(ctx.access_key_id.as_deref(), Some("builder"));
    }

    #[test]
    fn test_should_ignore_reordering_of_non_participating_headers() {
        let body = b"{}";
        let mut parts = unsigned("RequestResponse");
        sign(&mut parts, body, "prod");

        let mut reordered = http::HeaderMap::new();
        reordered.insert("user-agent", "aws-cli/2".parse().unwrap());
        reordered.insert("x-amz-log-type", "Tail".parse().unwrap());
        let mut entries: Vec<_> = parts
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.reverse();
        for (name, value) in entries {
            reordered.insert(name, value);
        }
        parts.headers = reordered;

        assert!(
            authenticator(None, true, resolver("prod"))
                .authenticate(&parts, body)
                .is_ok()
        );
    }

    #[test]
    fn test_should_reject_altered_body() {
        let mut parts = unsigned("RequestResponse");
        sign(&mut parts, br#"{"n":1}"#, "prod");

        let rejection = authenticator(None, true, resolver("prod"))
            .authenticate(&parts, br#"{"n":2}"#)
            .unwrap_err();
        assert_eq!(rejection.stage, AuthStage::VerifySignature);
        assert_eq!(rejection.code(), AuthErrorCode::InvalidCredentialException);
    }

    #[test]
    fn test_should_reject_region_outside_namespace_before_verifying() {
        let body = b"{}";
        let mut parts = unsigned("RequestResponse");
        sign(&mut parts, body, "dev");
        let secrets = resolver("dev");

        let rejection = authenticator(Some("prod"), true, Arc::clone(&secrets))
            .authenticate(&parts, body)
            .unwrap_err();
        assert_eq!(rejection.stage, AuthStage::ValidateRegionScope);
        assert_eq!(rejection.code(), AuthErrorCode::InvalidRegionException);
        assert_eq!(secrets.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_should_reject_empty_region() {
        let mut parts = unsigned("RequestResponse");
        parts.headers.insert(
            http::header::AUTHORIZATION,
            "AWS4-HMAC-SHA256 Credential=builder/20240315//lambda/aws4_request, \
             SignedHeaders=host, Signature=00"
                .parse()
                .unwrap(),
        );
        let rejection = authenticator(None, false, resolver("prod"))
            .authenticate(&parts, b"")
            .unwrap_err();
        assert_eq!(rejection.code(), AuthErrorCode::InvalidRegionException);
    }

    #[test]
    fn test_should_reject_missing_or_malformed_date() {
        let mut parts = unsigned("RequestResponse");
        sign(&mut parts, b"{}", "prod");
        let auth = authenticator(None, true, resolver("prod"));

        parts
            .headers
            .insert("x-amz-date", "2024-03-15T10:15:00Z".parse().unwrap());
        let rejection = auth.authenticate(&parts, b"{}").unwrap_err();
        assert_eq!(rejection.stage, AuthStage::ParseDate);
        assert_eq!(rejection.code(), AuthErrorCode::InvalidCredentialException);

        parts.headers.remove("x-amz-date");
        let rejection = auth.authenticate(&parts, b"{}").unwrap_err();
        assert_eq!(rejection.stage, AuthStage::ParseDate);
    }

    #[test]
    fn test_should_reject_short_date_fields() {
        let mut parts = unsigned("RequestResponse");
        sign(&mut parts, b"{}", "prod");
        let auth = authenticator(None, false, resolver("prod"));

        for short in ["2024315T101500Z", "20240315T10150Z", "2024315T1015Z"] {
            parts.headers.insert("x-amz-date", short.parse().unwrap());
            let rejection = auth.authenticate(&parts, b"{}").unwrap_err();
            assert_eq!(rejection.stage, AuthStage::ParseDate);
            assert_eq!(rejection.code(), AuthErrorCode::InvalidCredentialException);
        }
    }

    #[test]
    fn test_should_distinguish_missing_from_malformed_authorization() {
        let auth = authenticator(None, true, resolver("prod"));
        let mut parts = unsigned("RequestResponse");

        let rejection = auth.authenticate(&parts, b"").unwrap_err();
        assert_eq!(rejection.stage, AuthStage::ExtractAuthorizationHeader);
        assert_eq!(
            rejection.code(),
            AuthErrorCode::InvalidAuthorizationException
        );

        parts
            .headers
            .insert(http::header::AUTHORIZATION, "Bearer abc".parse().unwrap());
        let rejection = auth.authenticate(&parts, b"").unwrap_err();
        assert_eq!(rejection.stage, AuthStage::ExtractCredentialScope);
        assert_eq!(rejection.code(), AuthErrorCode::InvalidCredentialException);
    }

    #[test]
    fn test_should_reject_scope_with_wrong_field_count() {
        let mut parts = unsigned("RequestResponse");
        parts.headers.insert(
            http::header::AUTHORIZATION,
            "AWS4-HMAC-SHA256 Credential=builder/20240315/prod/aws4_request, \
             SignedHeaders=host, Signature=00"
                .parse()
                .unwrap(),
        );
        let rejection = authenticator(None, false, resolver("prod"))
            .authenticate(&parts, b"")
            .unwrap_err();
        assert_eq!(rejection.stage, AuthStage::ExtractCredentialScope);
        assert_eq!(rejection.code(), AuthErrorCode::InvalidCredentialException);
    }

    #[test]
    fn test_should_trust_declared_region_when_verification_disabled() {
        let mut parts = unsigned("RequestResponse");
        parts.headers.insert(
            http::header::AUTHORIZATION,
            "AWS4-HMAC-SHA256 Credential=anyone/20240315/staging/lambda/aws4_request, \
             SignedHeaders=host, Signature=bogus"
                .parse()
                .unwrap(),
        );
        let secrets = resolver("prod");
        let ctx = authenticator(None, false, Arc::clone(&secrets))
            .authenticate(&parts, b"ignored")
            .unwrap();
        assert_eq!(ctx.partition.as_str(), "staging");
        assert!(ctx.access_key_id.is_none());
        assert_eq!(secrets.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_should_collapse_unknown_identity_to_invalid_credential() {
        let body = b"{}";
        let mut parts = unsigned("RequestResponse");
        sign(&mut parts, body, "prod");

        let rejection = authenticator(None, true, resolver("dev"))
            .authenticate(&parts, body)
            .unwrap_err();
        assert!(matches!(rejection.error, AuthError::Credential(_)));
        assert_eq!(rejection.code(), AuthErrorCode::InvalidCredentialException);
    }
}
