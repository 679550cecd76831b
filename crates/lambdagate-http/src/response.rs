//! Response rendering for the Lambda API.

use bytes::{Bytes, BytesMut};
use http_body_util::Full;
use lambdagate_invoke::{FailureKind, InvocationFailure, InvocationResult};

use crate::error::LambdaError;

/// Content type of every JSON response.
pub const CONTENT_TYPE: &str = "application/json";

/// Response header naming the executed function version.
pub const EXECUTED_VERSION_HEADER: &str = "x-amz-executed-version";

/// Response header carrying tail logs.
pub const LOG_RESULT_HEADER: &str = "x-amz-log-result";

/// Response header repeating the error code.
pub const ERROR_TYPE_HEADER: &str = "x-amzn-errortype";

/// Version reported for every invocation; the gateway has no versioning.
pub const EXECUTED_VERSION: &str = "0";

/// A complete gateway response.
pub type LambdaResponse = http::Response<Full<Bytes>>;

/// Serialize the `{"Type", "message", "__type"}` envelope.
#[must_use]
pub fn error_envelope(kind: &str, message: &str, error_type: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "Type": kind,
        "message": message,
        "__type": error_type,
    }))
    .expect("JSON serialization of error envelope cannot fail")
}

/// Convert a `LambdaError` into a complete HTTP error response.
#[must_use]
pub fn error_to_response(error: &LambdaError, request_id: &str) -> LambdaResponse {
    let body = error_envelope(error.kind(), &error.message, error.code.as_str());
    http::Response::builder()
        .status(error.status_code)
        .header(http::header::CONTENT_TYPE, CONTENT_TYPE)
        .header(ERROR_TYPE_HEADER, error.code.as_str())
        .header("x-amzn-requestid", request_id)
        .body(Full::new(Bytes::from(body)))
        .expect("valid error response")
}

/// Render a remote-side failure as a 200 body envelope.
#[must_use]
pub fn failure_body(failure: &InvocationFailure) -> Bytes {
    let (kind, error_type) = match &failure.kind {
        FailureKind::Function { error_type } => ("User", error_type.as_deref().unwrap_or("Unhandled")),
        FailureKind::Timeout => ("Server", "TimeoutException"),
        FailureKind::Aborted => ("Server", "ServiceException"),
    };
    Bytes::from(error_envelope(kind, &failure.message, error_type))
}

/// Append `\n` unless the payload already ends with one.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use lambdagate_http::response::ensure_trailing_newline;
///
/// let once = ensure_trailing_newline(Bytes::from_static(b"\"ok\""));
/// assert_eq!(once, "\"ok\"\n");
/// assert_eq!(ensure_trailing_newline(once.clone()), once);
/// ```
#[must_use]
pub fn ensure_trailing_newline(payload: Bytes) -> Bytes {
    if payload.ends_with(b"\n") {
        return payload;
    }
    let mut framed = BytesMut::with_capacity(payload.len() + 1);
    framed.extend_from_slice(&payload);
    framed.extend_from_slice(b"\n");
    framed.freeze()
}

/// Turn accumulated log text into a header value.
///
/// Header values cannot carry line breaks or other control bytes, so those are
/// written as spaces. Everything else goes through verbatim, not base64.
#[must_use]
pub fn log_header_value(logs: &str) -> http::HeaderValue {
    let bytes: Vec<u8> = logs
        .bytes()
        .map(|b| if (b < 0x20 && b != b'\t') || b == 0x7f { b' ' } else { b })
        .collect();
    http::HeaderValue::from_bytes(&bytes).unwrap_or_else(|_| http::HeaderValue::from_static(""))
}

/// Render the final outcome of a `RequestResponse` invocation.
///
/// Status is 200 whether the function succeeded or failed.
#[must_use]
pub fn invocation_response(result: &InvocationResult, tail_logs: Option<&str>) -> LambdaResponse {
    let payload = match result {
        InvocationResult::Success(payload) => payload.clone(),
        InvocationResult::Failure(failure) => failure_body(failure),
    };

    let mut response = http::Response::builder()
        .status(http::StatusCode::OK)
        .header(http::header::CONTENT_TYPE, CONTENT_TYPE)
        .header(EXECUTED_VERSION_HEADER, EXECUTED_VERSION)
        .body(Full::new(ensure_trailing_newline(payload)))
        .expect("valid invocation response");

    if let Some(logs) = tail_logs {
        response
            .headers_mut()
            .insert(LOG_RESULT_HEADER, log_header_value(logs));
    }
    response
}

/// The empty 204 answer to a `DryRun` invocation.
#[must_use]
pub fn dry_run_response() -> LambdaResponse {
    http::Response::builder()
        .status(http::StatusCode::NO_CONTENT)
        .body(Full::new(Bytes::new()))
        .expect("valid dry-run response")
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;
    use crate::error::LambdaErrorCode;

    async fn body_json(response: LambdaResponse) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_should_render_error_envelope() {
        let err = LambdaError::not_found("Function not found: prod/missing");
        let response = error_to_response(&err, "req-1");

        assert_eq!(response.status(), http::StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get(ERROR_TYPE_HEADER).unwrap(),
            "ResourceNotFoundException"
        );
        let json = body_json(response).await;
        assert_eq!(json["Type"], "User");
        assert_eq!(json["message"], "Function not found: prod/missing");
        assert_eq!(json["__type"], "ResourceNotFoundException");
    }

    #[tokio::test]
    async fn test_should_mark_server_errors() {
        let response = error_to_response(&LambdaError::new(LambdaErrorCode::ServiceException), "r");
        assert_eq!(body_json(response).await["Type"], "Server");
    }

    #[test]
    fn test_should_append_exactly_one_newline() {
        assert_eq!(ensure_trailing_newline(Bytes::from_static(b"\"ok\"")), "\"ok\"\n");
        assert_eq!(ensure_trailing_newline(Bytes::from_static(b"1\n")), "1\n");
        assert_eq!(ensure_trailing_newline(Bytes::new()), "\n");
    }

    #[tokio::test]
    async fn test_should_keep_status_200_for_function_failures() {
        let failure = InvocationFailure {
            kind: FailureKind::Function { error_type: None },
            message: "boom".to_owned(),
        };
        let response = invocation_response(&InvocationResult::Failure(failure), None);
        assert_eq!(response.status(), http::StatusCode::OK);
        assert_eq!(response.headers().get(EXECUTED_VERSION_HEADER).unwrap(), "0");
        assert!(response.headers().get(LOG_RESULT_HEADER).is_none());

        let json = body_json(response).await;
        assert_eq!(json["__type"], "Unhandled");
        assert_eq!(json["message"], "boom");
    }

    #[tokio::test]
    async fn test_should_describe_timeouts_as_server_failures() {
        let failure = InvocationFailure {
            kind: FailureKind::Timeout,
            message: "Task timed out after 1.00 seconds".to_owned(),
        };
        let json = body_json(invocation_response(&InvocationResult::Failure(failure), None)).await;
        assert_eq!(json["Type"], "Server");
        assert_eq!(json["__type"], "TimeoutException");
    }

    #[test]
    fn test_should_flatten_line_breaks_in_log_header() {
        let value = log_header_value("START\r\nhello wörld\nEND\n");
        assert_eq!(value.as_bytes(), "START  hello wörld END ".as_bytes());
    }

    #[test]
    fn test_should_attach_tail_logs_only_when_given() {
        let ok = InvocationResult::Success(Bytes::from_static(b"{}"));
        let tail = invocation_response(&ok, Some("line"));
        assert_eq!(tail.headers().get(LOG_RESULT_HEADER).unwrap(), "line");
        assert!(invocation_response(&ok, None).headers().get(LOG_RESULT_HEADER).is_none());
    }
}
