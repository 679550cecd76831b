//! Canonical request construction for AWS Signature Version 4.
//!
//! This module implements the canonical request format used as signature
//! input:
//!
//! ```text
//! HTTPRequestMethod\n
//! CanonicalURI\n
//! CanonicalQueryString\n
//! CanonicalHeaders\n\n
//! SignedHeaders\n
//! HashedPayload
//! ```
//!
//! Unlike a literal SigV4 implementation, the header set is not taken from the
//! client's `SignedHeaders` list. Only `host`, `x-amz-date`, and headers on a
//! fixed allow-list participate; everything else is dropped even when the
//! client declared it signed.

use std::collections::BTreeMap;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};

/// Characters that must be percent-encoded in URI path segments.
///
/// All characters except unreserved characters (A-Z, a-z, 0-9, `-`, `_`, `.`,
/// `~`) are encoded. Forward slashes separate segments and are preserved.
const URI_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Header names (lowercase) that may participate in the signature.
pub const SIGNABLE_HEADERS: &[&str] = &[
    "cache-control",
    "content-disposition",
    "content-encoding",
    "content-language",
    "content-md5",
    "content-type",
    "expires",
    "if-match",
    "if-modified-since",
    "if-none-match",
    "if-unmodified-since",
    "range",
    "x-amz-acl",
    "x-amz-content-sha256",
    "x-amz-copy-source",
    "x-amz-copy-source-if-match",
    "x-amz-copy-source-if-modified-since",
    "x-amz-copy-source-if-none-match",
    "x-amz-copy-source-if-unmodified-since",
    "x-amz-copy-source-range",
    "x-amz-copy-source-server-side-encryption-customer-algorithm",
    "x-amz-copy-source-server-side-encryption-customer-key",
    "x-amz-copy-source-server-side-encryption-customer-key-md5",
    "x-amz-grant-full-control",
    "x-amz-grant-read",
    "x-amz-grant-read-acp",
    "x-amz-grant-write",
    "x-amz-grant-write-acp",
    "x-amz-metadata-directive",
    "x-amz-mfa",
    "x-amz-request-payer",
    "x-amz-server-side-encryption",
    "x-amz-server-side-encryption-aws-kms-key-id",
    "x-amz-server-side-encryption-customer-algorithm",
    "x-amz-server-side-encryption-customer-key",
    "x-amz-server-side-encryption-customer-key-md5",
    "x-amz-storage-class",
    "x-amz-tagging",
    "x-amz-website-redirect-location",
];

/// Header name prefixes (lowercase) whose members are always signable.
pub const SIGNABLE_HEADER_PREFIXES: &[&str] = &["x-amz-meta-", "x-amz-object-lock-"];

/// Whether a header takes part in signature recomputation.
///
/// # Examples
///
/// ```
/// use lambdagate_auth::canonical::is_signable_header;
///
/// assert!(is_signable_header("Content-Type"));
/// assert!(is_signable_header("x-amz-meta-owner"));
/// assert!(!is_signable_header("x-amz-invocation-type"));
/// ```
#[must_use]
pub fn is_signable_header(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    SIGNABLE_HEADERS.contains(&lower.as_str())
        || SIGNABLE_HEADER_PREFIXES
            .iter()
            .any(|prefix| lower.starts_with(prefix))
}

/// Collect the `(name, value)` pairs that take part in the signature.
///
/// The result always contains `host` and `x-amz-date`, followed by every
/// allow-listed header present in `headers`. For repeated headers only the
/// first value is used. Pairs are sorted by lowercase name.
#[must_use]
pub fn collect_signing_headers(
    headers: &http::HeaderMap,
    host: &str,
    amz_date: &str,
) -> Vec<(String, String)> {
    let mut pairs: BTreeMap<String, String> = BTreeMap::new();
    pairs.insert("host".to_owned(), host.to_owned());
    pairs.insert("x-amz-date".to_owned(), amz_date.to_owned());

    for name in headers.keys() {
        let name = name.as_str();
        if !is_signable_header(name) {
            continue;
        }
        let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) else {
            tracing::debug!(header = name, "skipping non-text signable header");
            continue;
        };
        pairs.insert(name.to_ascii_lowercase(), value.to_owned());
    }

    pairs.into_iter().collect()
}

/// Build the full canonical request string from its components.
///
/// # Examples
///
/// ```
/// use lambdagate_auth::canonical::build_canonical_request;
///
/// let canonical = build_canonical_request(
///     "POST",
///     "/2015-03-31/functions/echo/invocations",
///     "",
///     &[("host", "lambda.local"), ("x-amz-date", "20240101T000000Z")],
///     &["host", "x-amz-date"],
///     "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
/// );
/// assert!(canonical.starts_with("POST\n/2015-03-31/functions/echo/invocations\n"));
/// ```
#[must_use]
pub fn build_canonical_request(
    method: &str,
    uri: &str,
    query_string: &str,
    headers: &[(&str, &str)],
    signed_headers: &[&str],
    payload_hash: &str,
) -> String {
    let canonical_uri = build_canonical_uri(uri);
    let canonical_query = build_canonical_query_string(query_string);
    let canonical_headers = build_canonical_headers(headers, signed_headers);
    let signed_headers_str = build_signed_headers_string(signed_headers);

    format!(
        "{method}\n{canonical_uri}\n{canonical_query}\n{canonical_headers}\n\n{signed_headers_str}\n{payload_hash}"
    )
}

/// Build the canonical URI from the raw request path.
///
/// Each segment of the path as received is encoded once more, so an escaped
/// `%2F` in a segment becomes `%252F`. This is the non-S3 SigV4 rule: clients
/// sign the already-escaped path. Empty paths are normalized to `/`.
///
/// # Examples
///
/// ```
/// use lambdagate_auth::canonical::build_canonical_uri;
///
/// assert_eq!(build_canonical_uri("/functions/echo"), "/functions/echo");
/// assert_eq!(build_canonical_uri("/functions/a%3Ab"), "/functions/a%253Ab");
/// assert_eq!(build_canonical_uri(""), "/");
/// ```
#[must_use]
pub fn build_canonical_uri(path: &str) -> String {
    if path.is_empty() || path == "/" {
        return "/".to_owned();
    }

    path.split('/').map(uri_encode).collect::<Vec<_>>().join("/")
}

/// Build the canonical query string by sorting parameters.
///
/// Raw values are kept exactly as received; clients sign whatever encoding
/// they put on the wire.
///
/// # Examples
///
/// ```
/// use lambdagate_auth::canonical::build_canonical_query_string;
///
/// assert_eq!(build_canonical_query_string(""), "");
/// assert_eq!(build_canonical_query_string("b=2&a=1"), "a=1&b=2");
/// ```
#[must_use]
pub fn build_canonical_query_string(query: &str) -> String {
    if query.is_empty() {
        return String::new();
    }

    let mut params: Vec<(&str, &str)> = query
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|param| param.split_once('=').unwrap_or((param, "")))
        .collect();

    params.sort_unstable();

    params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Build the canonical headers block.
///
/// Only headers listed in `signed_headers` are included. Names are
/// lowercased, values trimmed with inner whitespace runs collapsed, and lines
/// sorted by name. No trailing newline.
#[must_use]
pub fn build_canonical_headers(headers: &[(&str, &str)], signed_headers: &[&str]) -> String {
    let mut header_map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let lower_name = name.to_lowercase();
        let trimmed_value = collapse_whitespace(value.trim());
        header_map
            .entry(lower_name)
            .and_modify(|existing| {
                existing.push(',');
                existing.push_str(&trimmed_value);
            })
            .or_insert(trimmed_value);
    }

    let mut sorted_signed: Vec<&str> = signed_headers.to_vec();
    sorted_signed.sort_unstable();

    sorted_signed
        .iter()
        .filter_map(|name| header_map.get(*name).map(|value| format!("{name}:{value}")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the signed headers string: sorted lowercase names joined by `;`.
///
/// # Examples
///
/// ```
/// use lambdagate_auth::canonical::build_signed_headers_string;
///
/// assert_eq!(
///     build_signed_headers_string(&["x-amz-date", "host"]),
///     "host;x-amz-date"
/// );
/// ```
#[must_use]
pub fn build_signed_headers_string(signed_headers: &[&str]) -> String {
    let mut sorted: Vec<&str> = signed_headers.to_vec();
    sorted.sort_unstable();
    sorted.join(";")
}

fn uri_encode(input: &str) -> String {
    utf8_percent_encode(input, URI_ENCODE_SET).to_string()
}

fn collapse_whitespace(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut prev_was_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !prev_was_space {
                result.push(' ');
                prev_was_space = true;
            }
        } else {
            result.push(ch);
            prev_was_space = false;
        }
    }
    result
}
