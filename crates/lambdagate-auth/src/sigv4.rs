//! AWS Signature Version 4 parsing and verification.
//!
//! Verification flow:
//!
//! 1. Parse the `Authorization` header with a small grammar that reports which
//!    credential-scope field is wrong ([`parse_authorization_header`]).
//! 2. Rebuild the canonical request from the method, path, query, `host`,
//!    `x-amz-date`, allow-listed headers, and the buffered body.
//! 3. Derive the signing key from the secret, the `X-Amz-Date` day, the
//!    region, and the service.
//! 4. Compare the expected signature with the presented one in constant time.
//!
//! There is no freshness window: a well-formed signature for any date verifies.

use hmac::{Hmac, KeyInit, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::canonical::{build_canonical_request, collect_signing_headers};
use crate::error::{AuthError, ScopeError, ScopeField};

/// The only algorithm supported by this implementation.
pub const SUPPORTED_ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// The service name every credential scope must carry.
pub const LAMBDA_SERVICE: &str = "lambda";

/// The fixed credential-scope terminator.
pub const SCOPE_TERMINATOR: &str = "aws4_request";

/// `X-Amz-Date` layout (`yyyyMMdd'T'HHmmss'Z'`).
pub const AMZ_DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

type HmacSha256 = Hmac<Sha256>;

/// The credential scope `<id>/<date8>/<region>/<service>/aws4_request`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialScope {
    /// The access key ID (the workload identity name).
    pub access_key_id: String,
    /// The scope date (`yyyyMMdd`).
    pub date: String,
    /// The region, used as tenant partition.
    pub region: String,
    /// The service, always `lambda`.
    pub service: String,
    /// The terminator, always `aws4_request`.
    pub terminator: String,
}

impl CredentialScope {
    /// Render the scope suffix used in the string to sign.
    #[must_use]
    pub fn scope_suffix(&self) -> String {
        format!(
            "{}/{}/{}/{}",
            self.date, self.region, self.service, self.terminator
        )
    }
}

/// Parsed components of an `Authorization` header.
///
/// ```text
/// AWS4-HMAC-SHA256 Credential=builder/20240101/prod/lambda/aws4_request,
///   SignedHeaders=host;x-amz-date, Signature=<hex-signature>
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAuthorization {
    /// The signing algorithm.
    pub algorithm: String,
    /// The credential scope.
    pub scope: CredentialScope,
    /// Header names the client declared signed. Informational only.
    pub signed_headers: Vec<String>,
    /// The hex-encoded signature; empty when the client sent none.
    pub signature: String,
}

/// Parse an `Authorization` header value.
///
/// # Errors
///
/// - [`AuthError::MalformedAuthHeader`] when there is no algorithm token.
/// - [`AuthError::UnsupportedAlgorithm`] for anything but `AWS4-HMAC-SHA256`.
/// - [`AuthError::InvalidScope`] when the credential scope is absent, has a
///   field count other than five, or carries an invalid field.
pub fn parse_authorization_header(header: &str) -> Result<ParsedAuthorization, AuthError> {
    let (algorithm, rest) = header
        .trim()
        .split_once(' ')
        .ok_or(AuthError::MalformedAuthHeader)?;

    if algorithm != SUPPORTED_ALGORITHM {
        return Err(AuthError::UnsupportedAlgorithm(algorithm.to_owned()));
    }

    let mut credential = None;
    let mut signed_headers = None;
    let mut signature = None;

    for part in rest.split(',') {
        let part = part.trim();
        if let Some(value) = part.strip_prefix("Credential=") {
            credential = Some(value);
        } else if let Some(value) = part.strip_prefix("SignedHeaders=") {
            signed_headers = Some(value);
        } else if let Some(value) = part.strip_prefix("Signature=") {
            signature = Some(value);
        }
    }

    let credential = credential.ok_or(ScopeError::MissingCredential)?;
    let signed_headers = signed_headers.ok_or(ScopeError::MissingSignedHeaders)?;
    let scope = parse_credential_scope(credential)?;

    Ok(ParsedAuthorization {
        algorithm: algorithm.to_owned(),
        scope,
        signed_headers: signed_headers
            .split(';')
            .filter(|s| !s.is_empty())
            .map(str::to_ascii_lowercase)
            .collect(),
        signature: signature.unwrap_or_default().to_owned(),
    })
}

/// Parse the five-field credential scope.
///
/// The region may be empty here; the authenticator rejects an empty region
/// with its own error code during region validation.
///
/// # Errors
///
/// Returns the first [`ScopeError`] found, naming the failing field.
pub fn parse_credential_scope(credential: &str) -> Result<CredentialScope, ScopeError> {
    let fields: Vec<&str> = credential.split('/').collect();
    let [access_key_id, date, region, service, terminator] = fields.as_slice() else {
        return Err(ScopeError::FieldCount(fields.len()));
    };

    let invalid = |field: ScopeField, value: &str| ScopeError::InvalidField {
        field,
        value: value.to_owned(),
    };

    if access_key_id.is_empty() {
        return Err(invalid(ScopeField::AccessKeyId, *access_key_id));
    }
    if date.len() != 8 || !date.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid(ScopeField::Date, *date));
    }
    if *service != LAMBDA_SERVICE {
        return Err(invalid(ScopeField::Service, *service));
    }
    if *terminator != SCOPE_TERMINATOR {
        return Err(invalid(ScopeField::Terminator, *terminator));
    }

    Ok(CredentialScope {
        access_key_id: (*access_key_id).to_owned(),
        date: (*date).to_owned(),
        region: (*region).to_owned(),
        service: (*service).to_owned(),
        terminator: (*terminator).to_owned(),
    })
}

/// Build the SigV4 string to sign.
///
/// ```text
/// AWS4-HMAC-SHA256\n<timestamp>\n<credential_scope>\n<hex(SHA256(canonical_request))>
/// ```
#[must_use]
pub fn build_string_to_sign(
    timestamp: &str,
    credential_scope: &str,
    canonical_request_hash: &str,
) -> String {
    format!("{SUPPORTED_ALGORITHM}\n{timestamp}\n{credential_scope}\n{canonical_request_hash}")
}

/// Derive the SigV4 signing key using the HMAC-SHA256 chain.
///
/// ```text
/// DateKey              = HMAC-SHA256("AWS4" + secret_key, date)
/// DateRegionKey        = HMAC-SHA256(DateKey, region)
/// DateRegionServiceKey = HMAC-SHA256(DateRegionKey, service)
/// SigningKey           = HMAC-SHA256(DateRegionServiceKey, "aws4_request")
/// ```
#[must_use]
pub fn derive_signing_key(secret_key: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let date_key = hmac_sha256(format!("AWS4{secret_key}").as_bytes(), date.as_bytes());
    let date_region_key = hmac_sha256(&date_key, region.as_bytes());
    let date_region_service_key = hmac_sha256(&date_region_key, service.as_bytes());
    hmac_sha256(&date_region_service_key, SCOPE_TERMINATOR.as_bytes())
}

/// Compute the hex-encoded HMAC-SHA256 signature of `data`.
#[must_use]
pub fn compute_signature(signing_key: &[u8], data: &str) -> String {
    hex::encode(hmac_sha256(signing_key, data.as_bytes()))
}

/// SHA-256 of a payload as lowercase hex.
///
/// # Examples
///
/// ```
/// use lambdagate_auth::sigv4::hash_payload;
///
/// assert_eq!(
///     hash_payload(b""),
///     "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
/// );
/// ```
#[must_use]
pub fn hash_payload(payload: &[u8]) -> String {
    hex::encode(Sha256::digest(payload))
}

/// Inputs for signature recomputation that do not come from the request.
#[derive(Debug, Clone, Copy)]
pub struct SigningParams<'a> {
    /// The resolved secret token.
    pub secret: &'a str,
    /// The verbatim `X-Amz-Date` value.
    pub amz_date: &'a str,
    /// Region of the credential scope.
    pub region: &'a str,
    /// Service of the credential scope.
    pub service: &'a str,
}

/// Recompute the signature a client holding `params.secret` would produce
/// for this request.
///
/// The signing day is the first eight characters of `X-Amz-Date`.
#[must_use]
pub fn compute_request_signature(
    parts: &http::request::Parts,
    body: &[u8],
    params: SigningParams<'_>,
) -> String {
    let host = request_host(parts);
    let signing_headers = collect_signing_headers(&parts.headers, &host, params.amz_date);
    let header_pairs: Vec<(&str, &str)> = signing_headers
        .iter()
        .map(|(n, v)| (n.as_str(), v.as_str()))
        .collect();
    let header_names: Vec<&str> = header_pairs.iter().map(|(n, _)| *n).collect();

    let canonical_request = build_canonical_request(
        parts.method.as_str(),
        parts.uri.path(),
        parts.uri.query().unwrap_or(""),
        &header_pairs,
        &header_names,
        &hash_payload(body),
    );
    debug!(canonical_request, "built canonical request");

    let date = params.amz_date.get(..8).unwrap_or(params.amz_date);
    let credential_scope = format!(
        "{date}/{}/{}/{SCOPE_TERMINATOR}",
        params.region, params.service
    );
    let canonical_hash = hex::encode(Sha256::digest(canonical_request.as_bytes()));
    let string_to_sign = build_string_to_sign(params.amz_date, &credential_scope, &canonical_hash);

    let signing_key = derive_signing_key(params.secret, date, params.region, params.service);
    compute_signature(&signing_key, &string_to_sign)
}

/// Build the `Authorization` header a client would send for this request.
///
/// `SignedHeaders` lists exactly the headers that participate in
/// recomputation, so a request signed this way always verifies.
#[must_use]
pub fn build_authorization_header(
    parts: &http::request::Parts,
    body: &[u8],
    access_key_id: &str,
    params: SigningParams<'_>,
) -> String {
    let host = request_host(parts);
    let names: Vec<String> = collect_signing_headers(&parts.headers, &host, params.amz_date)
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    let signature = compute_request_signature(parts, body, params);
    let date = params.amz_date.get(..8).unwrap_or(params.amz_date);

    format!(
        "{SUPPORTED_ALGORITHM} Credential={access_key_id}/{date}/{}/{}/{SCOPE_TERMINATOR}, SignedHeaders={}, Signature={signature}",
        params.region,
        params.service,
        names.join(";"),
    )
}

/// Verify the presented signature against a recomputed one.
///
/// The scope date must equal the `X-Amz-Date` day, then the signatures are
/// compared byte for byte in constant time.
///
/// # Errors
///
/// Returns [`AuthError::SignatureDoesNotMatch`] on any difference.
pub fn verify_signature(
    parts: &http::request::Parts,
    body: &[u8],
    parsed: &ParsedAuthorization,
    secret: &str,
    amz_date: &str,
) -> Result<(), AuthError> {
    if amz_date.get(..8) != Some(parsed.scope.date.as_str()) {
        debug!(
            scope_date = %parsed.scope.date,
            amz_date,
            "credential scope date differs from X-Amz-Date"
        );
        return Err(AuthError::SignatureDoesNotMatch);
    }

    let expected = compute_request_signature(
        parts,
        body,
        SigningParams {
            secret,
            amz_date,
            region: &parsed.scope.region,
            service: &parsed.scope.service,
        },
    );

    if expected.as_bytes().ct_eq(parsed.signature.as_bytes()).into() {
        debug!(access_key_id = %parsed.scope.access_key_id, "signature verification succeeded");
        Ok(())
    } else {
        debug!(
            expected = %expected,
            provided = %parsed.signature,
            "signature mismatch"
        );
        Err(AuthError::SignatureDoesNotMatch)
    }
}

/// The host the client signed: the `Host` header, or the URI authority.
fn request_host(parts: &http::request::Parts) -> String {
    parts
        .headers
        .get(http::header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(ToOwned::to_owned)
        .or_else(|| parts.uri.authority().map(|a| a.as_str().to_owned()))
        .unwrap_or_default()
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can accept keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}
