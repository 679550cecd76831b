//! Lambda request router.
//!
//! Only the invoke operation is served here:
//!
//! ```text
//! POST /{apiVersion}/functions/{FunctionName}/invocations
//! ```
//!
//! Any API version segment is accepted. Function names arrive percent-encoded
//! and are decoded before lookup.

use percent_encoding::percent_decode_str;

use crate::error::LambdaError;

/// A resolved route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LambdaRoute {
    /// `Invoke` on the named function.
    Invoke {
        /// The decoded function name.
        function_name: String,
    },
}

/// Resolve the route for a request.
///
/// # Errors
///
/// Returns `ResourceNotFoundException` for anything that is not an invoke
/// call.
pub fn resolve_route(method: &http::Method, path: &str) -> Result<LambdaRoute, LambdaError> {
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    match (method, segments.as_slice()) {
        (&http::Method::POST, [version, "functions", name, "invocations"])
            if !version.is_empty() && !name.is_empty() =>
        {
            let function_name = percent_decode_str(name)
                .decode_utf8()
                .map_err(|_| LambdaError::invalid_parameter("function name is not valid UTF-8"))?
                .into_owned();
            Ok(LambdaRoute::Invoke { function_name })
        }
        _ => Err(LambdaError::not_found(format!(
            "no operation for {method} {path}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LambdaErrorCode;

    #[test]
    fn test_should_resolve_invoke() {
        let route = resolve_route(&http::Method::POST, "/2015-03-31/functions/echo/invocations");
        assert_eq!(
            route.unwrap(),
            LambdaRoute::Invoke {
                function_name: "echo".to_owned()
            }
        );
    }

    #[test]
    fn test_should_accept_any_api_version() {
        assert!(resolve_route(&http::Method::POST, "/2019-09-25/functions/f/invocations").is_ok());
    }

    #[test]
    fn test_should_decode_function_name() {
        let route = resolve_route(
            &http::Method::POST,
            "/2015-03-31/functions/my%2Dfunc/invocations",
        )
        .unwrap();
        assert_eq!(
            route,
            LambdaRoute::Invoke {
                function_name: "my-func".to_owned()
            }
        );
    }

    #[test]
    fn test_should_not_find_other_operations() {
        let cases = [
            (http::Method::GET, "/2015-03-31/functions/echo/invocations"),
            (http::Method::GET, "/2015-03-31/functions"),
            (http::Method::POST, "/2015-03-31/functions//invocations"),
            (http::Method::POST, "/2015-03-31/functions/echo/invocations/extra"),
            (http::Method::DELETE, "/2015-03-31/functions/echo"),
        ];
        for (method, path) in cases {
            let err = resolve_route(&method, path).unwrap_err();
            assert_eq!(err.code, LambdaErrorCode::ResourceNotFoundException, "{method} {path}");
        }
    }
}
