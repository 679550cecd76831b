//! LambdaGate Server - AWS Lambda-compatible invoke gateway.
//!
//! Accepts SigV4-signed `Invoke` calls, authenticates them against the
//! synchronized identity store, and runs them over the execution bus.
//!
//! # Usage
//!
//! ```text
//! GATEWAY_LISTEN=0.0.0.0:9000 IDENTITY_SNAPSHOT=/etc/lambdagate/snapshot.json lambdagate-server
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `GATEWAY_LISTEN` | `0.0.0.0:9000` | Bind address |
//! | `GATEWAY_NAMESPACE` | *(empty = multi-tenant)* | Fixed tenant partition |
//! | `SIGNATURE_VERIFICATION` | `false` | Verify SigV4 signatures |
//! | `IDENTITY_SNAPSHOT` | *(unset)* | Identity/secret/function snapshot file |
//! | `IDENTITY_SYNC_INTERVAL_SECS` | `30` | Snapshot reload period |
//! | `SYNC_TIMEOUT_SECS` | `30` | Boot window for the initial sync |
//! | `NATS_URL` | `nats://127.0.0.1:4222` | Execution bus server |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |

mod gateway;
mod sync;

use std::sync::Arc;

use anyhow::{Context, Result};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use lambdagate_auth::authenticator::AuthenticatorConfig;
use lambdagate_auth::{CredentialStore, IdentityCache, RequestAuthenticator};
use lambdagate_core::GatewayConfig;
use lambdagate_http::{GatewayDeps, LambdaHttpService};
use lambdagate_invoke::{InMemoryFunctionRegistry, InvocationCorrelator, NatsBus, SystemClock};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::gateway::{GatewayService, HEALTH_BODY};
use crate::sync::SnapshotSync;

/// Server version reported at startup.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` config value.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    Ok(())
}

/// Build the authenticator configuration from the gateway configuration.
fn authenticator_config(config: &GatewayConfig) -> AuthenticatorConfig {
    AuthenticatorConfig {
        namespace: config.namespace.clone(),
        verify_signatures: config.signature_verification,
    }
}

/// Run the accept loop until ctrl-c, then drain in-flight connections.
///
/// In-flight invocations are told to stop through `stop` so they answer
/// instead of waiting out their function timeout.
async fn serve(listener: TcpListener, service: GatewayService, stop: watch::Sender<bool>) -> Result<()> {
    let graceful = hyper_util::server::graceful::GracefulShutdown::new();
    let http = HttpConnBuilder::new(TokioExecutor::new());

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal, draining connections");
    };

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };

                let svc = service.clone();
                let conn = http.serve_connection(TokioIo::new(stream), svc);
                let conn = graceful.watch(conn.into_owned());

                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        error!(peer_addr = %peer_addr, error = %e, "connection error");
                    }
                });
            }

            () = &mut shutdown => {
                info!("shutting down gracefully");
                break;
            }
        }
    }

    stop.send_replace(true);
    graceful.shutdown().await;
    info!("all connections drained, exiting");

    Ok(())
}

/// Query a running gateway's health endpoint.
async fn run_health_check(addr: &str) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("cannot connect to {addr}"))?;

    let (mut reader, mut writer) = stream.into_split();

    let request =
        format!("GET /_lambdagate/health HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    writer.write_all(request.as_bytes()).await?;
    writer.shutdown().await?;

    let mut response = String::new();
    reader.read_to_string(&mut response).await?;

    if is_healthy_response(&response) {
        Ok(())
    } else {
        anyhow::bail!("unhealthy response from {addr}")
    }
}

fn is_healthy_response(raw: &str) -> bool {
    raw.starts_with("HTTP/1.1 200") && raw.contains(HEALTH_BODY)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = GatewayConfig::from_env();

    // Handle --health-check flag for Docker HEALTHCHECK.
    if std::env::args().any(|a| a == "--health-check") {
        let addr = config.gateway_listen.replace("0.0.0.0", "127.0.0.1");
        let healthy = run_health_check(&addr).await.is_ok();
        std::process::exit(i32::from(!healthy));
    }

    init_tracing(&config.log_level)?;
    let addr = config.listen_addr()?;

    let identities = Arc::new(IdentityCache::new());
    let functions = Arc::new(InMemoryFunctionRegistry::new());

    let sync = SnapshotSync::new(
        config.identity_snapshot.clone(),
        config.sync_interval,
        Arc::clone(&identities),
        Arc::clone(&functions),
    );
    tokio::spawn(sync.run());

    identities
        .wait_for_sync(config.sync_timeout)
        .await
        .context("identity store did not sync before the boot deadline")?;
    info!("identity store synced");

    let authenticator = RequestAuthenticator::new(
        authenticator_config(&config),
        Arc::new(CredentialStore::new(Arc::clone(&identities))),
    );
    let bus = NatsBus::connect(&config.nats_url)
        .await
        .with_context(|| format!("failed to reach execution bus at {}", config.nats_url))?;
    let correlator = InvocationCorrelator::new(Arc::new(bus), Arc::new(SystemClock));
    let (stop, shutdown) = watch::channel(false);

    let service = GatewayService::new(LambdaHttpService::new(GatewayDeps {
        authenticator,
        functions,
        correlator,
        shutdown,
    }));

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(
        %addr,
        namespace = ?config.namespace,
        nats_url = %config.nats_url,
        signature_verification = config.signature_verification,
        version = VERSION,
        "starting LambdaGate Server",
    );

    serve(listener, service, stop).await
}

#[cfg(test)]
mod tests {
    use lambdagate_core::TenantPartition;

    use super::*;

    #[test]
    fn test_should_build_authenticator_config_from_gateway_config() {
        let config = GatewayConfig {
            namespace: Some(TenantPartition::new("prod")),
            signature_verification: true,
            ..GatewayConfig::default()
        };
        let auth = authenticator_config(&config);
        assert_eq!(auth.namespace, Some(TenantPartition::new("prod")));
        assert!(auth.verify_signatures);
    }

    #[test]
    fn test_should_default_to_multi_tenant_without_verification() {
        let auth = authenticator_config(&GatewayConfig::default());
        assert!(auth.namespace.is_none());
        assert!(!auth.verify_signatures);
    }

    #[test]
    fn test_should_recognize_healthy_response() {
        let ok = format!("HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n\r\n{HEALTH_BODY}");
        assert!(is_healthy_response(&ok));
        assert!(!is_healthy_response("HTTP/1.1 404 Not Found\r\n\r\n"));
    }
}
