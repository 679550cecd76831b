//! Lambda HTTP service implementing the hyper `Service` trait.
//!
//! Pipeline per request:
//!
//! 1. Buffer the body; signature checks need it and the handler reuses it.
//! 2. Authenticate. A rejection answers 400 at once and nothing else runs.
//! 3. Resolve the route within the authenticated partition.
//! 4. Run the operation and render exactly one response.
//!
//! When hyper drops the response future (client gone), every resource held by
//! the request is released with it.

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::BodyExt;
use lambdagate_auth::RequestAuthenticator;
use lambdagate_invoke::{FunctionRegistry, InvocationCorrelator};
use tokio::sync::watch;
use tracing::{debug, error, warn};

use crate::error::LambdaError;
use crate::invoke::{InvocationGateway, InvokeRequest};
use crate::response::{CONTENT_TYPE, LambdaResponse, error_to_response};
use crate::router::{LambdaRoute, resolve_route};

/// Everything the HTTP layer needs, built once at startup.
pub struct GatewayDeps {
    /// Request authenticator.
    pub authenticator: RequestAuthenticator,
    /// Function definitions.
    pub functions: Arc<dyn FunctionRegistry>,
    /// Bus session factory.
    pub correlator: InvocationCorrelator,
    /// Flips to `true` when the process shuts down.
    pub shutdown: watch::Receiver<bool>,
}

impl fmt::Debug for GatewayDeps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayDeps")
            .field("authenticator", &self.authenticator)
            .field("correlator", &self.correlator)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
struct Inner {
    authenticator: RequestAuthenticator,
    invocations: InvocationGateway,
}

/// Hyper `Service` for the Lambda API.
#[derive(Debug, Clone)]
pub struct LambdaHttpService {
    inner: Arc<Inner>,
}

impl LambdaHttpService {
    /// Create the service from its dependencies.
    #[must_use]
    pub fn new(deps: GatewayDeps) -> Self {
        Self {
            inner: Arc::new(Inner {
                authenticator: deps.authenticator,
                invocations: InvocationGateway::new(deps.functions, deps.correlator, deps.shutdown),
            }),
        }
    }
}

impl<B> hyper::service::Service<http::Request<B>> for LambdaHttpService
where
    B: http_body::Body<Data = Bytes> + Send + 'static,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    type Response = LambdaResponse;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: http::Request<B>) -> Self::Future {
        let inner = Arc::clone(&self.inner);
        let request_id = uuid::Uuid::new_v4().to_string();

        Box::pin(async move {
            let response = match process_request(req, &inner).await {
                Ok(response) => response,
                Err(err) => {
                    debug!(%request_id, code = %err.code, status = %err.status_code, "request failed");
                    error_to_response(&err, &request_id)
                }
            };
            Ok(add_common_headers(response, &request_id))
        })
    }
}

async fn process_request<B>(req: http::Request<B>, inner: &Inner) -> Result<LambdaResponse, LambdaError>
where
    B: http_body::Body<Data = Bytes>,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    let (parts, body) = req.into_parts();
    debug!(method = %parts.method, path = %parts.uri.path(), "handling request");

    let body = collect_body(body).await?;

    let ctx = inner
        .authenticator
        .authenticate(&parts, &body)
        .map_err(|rejection| {
            warn!(code = %rejection.code(), stage = %rejection.stage, "authentication rejected");
            LambdaError::from_rejection(rejection)
        })?;

    match resolve_route(&parts.method, parts.uri.path())? {
        LambdaRoute::Invoke { function_name } => {
            let request = InvokeRequest::from_parts(function_name, &parts.headers, body);
            inner.invocations.invoke(&ctx, request).await
        }
    }
}

/// Collect the request body into a single `Bytes` buffer.
async fn collect_body<B>(body: B) -> Result<Bytes, LambdaError>
where
    B: http_body::Body<Data = Bytes>,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    body.collect()
        .await
        .map(http_body_util::Collected::to_bytes)
        .map_err(|e| {
            error!(error = %e, "failed to read request body");
            LambdaError::service("failed to read request body").with_source(e)
        })
}

fn add_common_headers(mut response: LambdaResponse, request_id: &str) -> LambdaResponse {
    let has_body = response.status() != http::StatusCode::NO_CONTENT;
    let headers = response.headers_mut();

    if let Ok(hv) = http::HeaderValue::from_str(request_id) {
        headers.entry("x-amzn-requestid").or_insert(hv);
    }
    if has_body {
        headers
            .entry(http::header::CONTENT_TYPE)
            .or_insert(http::HeaderValue::from_static(CONTENT_TYPE));
    }
    headers.insert("server", http::HeaderValue::from_static("LambdaGate"));

    response
}
