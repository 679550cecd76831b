//! Gateway service in front of the Lambda API.
//!
//! Health-check endpoints (`/_lambdagate/health`, `/_health`, `/health`) are
//! answered here without authentication; every other request goes to the
//! [`LambdaHttpService`].

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use http_body_util::Full;
use hyper::service::Service;
use lambdagate_http::{LambdaHttpService, LambdaResponse};

/// Body of a healthy health-check answer.
pub const HEALTH_BODY: &str = r#"{"services":{"lambda":"running"}}"#;

/// Top-level service handed to hyper.
#[derive(Debug, Clone)]
pub struct GatewayService {
    lambda: LambdaHttpService,
}

impl GatewayService {
    /// Wrap the Lambda service.
    pub fn new(lambda: LambdaHttpService) -> Self {
        Self { lambda }
    }
}

impl<B> Service<http::Request<B>> for GatewayService
where
    B: http_body::Body<Data = Bytes> + Send + 'static,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    type Response = LambdaResponse;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: http::Request<B>) -> Self::Future {
        if is_health_check(req.method(), req.uri().path()) {
            return Box::pin(async { Ok(health_check_response()) });
        }
        self.lambda.call(req)
    }
}

/// Check if the request is a health check.
fn is_health_check(method: &http::Method, path: &str) -> bool {
    *method == http::Method::GET
        && (path == "/_lambdagate/health" || path == "/_health" || path == "/health")
}

fn health_check_response() -> LambdaResponse {
    http::Response::builder()
        .status(http::StatusCode::OK)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from_static(HEALTH_BODY.as_bytes())))
        .expect("static health response should be valid")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use http_body_util::BodyExt;
    use lambdagate_auth::authenticator::AuthenticatorConfig;
    use lambdagate_auth::{RequestAuthenticator, StaticSecretResolver};
    use lambdagate_http::GatewayDeps;
    use lambdagate_invoke::{InMemoryBus, InMemoryFunctionRegistry, InvocationCorrelator, SystemClock};
    use tokio::sync::watch;

    use super::*;

    fn gateway(verify_signatures: bool) -> GatewayService {
        let (_tx, shutdown) = watch::channel(false);
        let deps = GatewayDeps {
            authenticator: RequestAuthenticator::new(
                AuthenticatorConfig {
                    namespace: None,
                    verify_signatures,
                },
                Arc::new(StaticSecretResolver::new(Vec::new())),
            ),
            functions: Arc::new(InMemoryFunctionRegistry::new()),
            correlator: InvocationCorrelator::new(
                Arc::new(InMemoryBus::new()),
                Arc::new(SystemClock),
            ),
            shutdown,
        };
        GatewayService::new(LambdaHttpService::new(deps))
    }

    #[test]
    fn test_should_detect_health_check_paths() {
        assert!(is_health_check(&http::Method::GET, "/_lambdagate/health"));
        assert!(is_health_check(&http::Method::GET, "/_health"));
        assert!(is_health_check(&http::Method::GET, "/health"));
        assert!(!is_health_check(&http::Method::POST, "/_health"));
        assert!(!is_health_check(
            &http::Method::GET,
            "/2015-03-31/functions/echo/invocations"
        ));
    }

    #[tokio::test]
    async fn test_should_answer_health_without_credentials() {
        let req = http::Request::builder()
            .method(http::Method::GET)
            .uri("/_health")
            .body(Full::new(Bytes::new()))
            .unwrap();
        let resp = gateway(true).call(req).await.unwrap();
        assert_eq!(resp.status(), http::StatusCode::OK);

        let body = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, HEALTH_BODY);
    }

    #[tokio::test]
    async fn test_should_delegate_other_requests_to_lambda_service() {
        let req = http::Request::builder()
            .method(http::Method::POST)
            .uri("/2015-03-31/functions/echo/invocations")
            .body(Full::new(Bytes::from_static(b"{}")))
            .unwrap();
        let resp = gateway(true).call(req).await.unwrap();
        assert_eq!(resp.status(), http::StatusCode::BAD_REQUEST);
        assert_eq!(
            resp.headers().get("x-amzn-errortype").unwrap(),
            "InvalidAuthorizationException"
        );
    }
}
