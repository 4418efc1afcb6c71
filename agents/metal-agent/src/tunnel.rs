//! RPC transport.
//!
//! The agent does not listen for connections. It dials the provider and
//! serves the RPC router over that outbound connection (HTTP/1 or HTTP/2,
//! detected per connection). When the connection drops or cannot be
//! established the agent redials after a Fibonacci backoff.

use crate::backoff::FibonacciBackoff;
use crate::coalesce::CallContext;
use crate::error::AgentError;
use crate::rpc::*;
use crate::service::PowerManagementService;
use async_trait::async_trait;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue};
use axum::routing::post;
use axum::{Json, Router};
use host_client::MACHINE_ID_HEADER;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Per-call timeout header, in milliseconds
pub const REQUEST_TIMEOUT_HEADER: &str = "x-request-timeout-ms";

/// Serves a router until shutdown
#[async_trait]
pub trait Transport: Send + Sync {
    async fn serve(&self, router: Router, shutdown: CancellationToken) -> Result<(), AgentError>;
}

#[derive(Clone)]
struct AppState {
    service: Arc<PowerManagementService>,
    default_timeout: Option<Duration>,
    shutdown: CancellationToken,
}

impl AppState {
    fn call_context(&self, headers: &HeaderMap) -> Result<CallContext, RpcError> {
        let ctx = CallContext::new(self.shutdown.child_token());

        let timeout = match headers.get(REQUEST_TIMEOUT_HEADER) {
            Some(value) => {
                let millis = value
                    .to_str()
                    .ok()
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .ok_or_else(|| {
                        RpcError::InvalidArgument(format!(
                            "{REQUEST_TIMEOUT_HEADER} must be a number of milliseconds"
                        ))
                    })?;
                Some(Duration::from_millis(millis))
            }
            None => self.default_timeout,
        };

        Ok(match timeout {
            Some(timeout) => ctx.with_timeout(timeout),
            None => ctx,
        })
    }
}

/// Builds the RPC router for `service`
///
/// Every response carries the `machine-id` header. In-flight calls are
/// cancelled when `shutdown` fires.
pub fn router(
    service: Arc<PowerManagementService>,
    machine_id: &str,
    default_timeout: Option<Duration>,
    shutdown: CancellationToken,
) -> Result<Router, AgentError> {
    let machine_id = HeaderValue::from_str(machine_id)
        .map_err(|e| AgentError::InvalidConfig(format!("invalid machine id {machine_id:?}: {e}")))?;

    let state = AppState {
        service,
        default_timeout,
        shutdown,
    };

    Ok(Router::new()
        .route(method::HELLO, post(hello))
        .route(method::GET_POWER_MANAGEMENT, post(get_power_management))
        .route(method::SET_POWER_MANAGEMENT, post(set_power_management))
        .route(method::REBOOT, post(reboot))
        .route(method::WIPE_DISKS, post(wipe_disks))
        .with_state(state)
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static(MACHINE_ID_HEADER),
            machine_id,
        ))
        .layer(TraceLayer::new_for_http()))
}

async fn hello(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<HelloRequest>,
) -> Result<Json<HelloResponse>, RpcError> {
    let ctx = state.call_context(&headers)?;
    state.service.hello(&ctx, request).await.map(Json)
}

async fn get_power_management(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<GetPowerManagementRequest>,
) -> Result<Json<GetPowerManagementResponse>, RpcError> {
    let ctx = state.call_context(&headers)?;
    state
        .service
        .get_power_management(&ctx, request)
        .await
        .map(Json)
}

async fn set_power_management(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SetPowerManagementRequest>,
) -> Result<Json<SetPowerManagementResponse>, RpcError> {
    let ctx = state.call_context(&headers)?;
    state
        .service
        .set_power_management(&ctx, request)
        .await
        .map(Json)
}

async fn reboot(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RebootRequest>,
) -> Result<Json<RebootResponse>, RpcError> {
    let ctx = state.call_context(&headers)?;
    state.service.reboot(&ctx, request).await.map(Json)
}

async fn wipe_disks(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<WipeDisksRequest>,
) -> Result<Json<WipeDisksResponse>, RpcError> {
    let ctx = state.call_context(&headers)?;
    state.service.wipe_disks(&ctx, request).await.map(Json)
}

/// How a tunnel session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    Shutdown,
    Disconnected,
}

/// Dials the provider and serves the router over the outbound connection
#[derive(Debug, Clone)]
pub struct ReverseTunnel {
    provider_address: String,
    backoff: FibonacciBackoff,
}

impl ReverseTunnel {
    /// Tunnel to `provider_address` with the default backoff
    pub fn new(provider_address: impl Into<String>) -> Self {
        Self {
            provider_address: provider_address.into(),
            backoff: FibonacciBackoff::default(),
        }
    }

    async fn session(
        &self,
        router: Router,
        shutdown: &CancellationToken,
        backoff: &mut FibonacciBackoff,
    ) -> Result<SessionEnd, AgentError> {
        let stream = tokio::select! {
            () = shutdown.cancelled() => return Ok(SessionEnd::Shutdown),
            stream = TcpStream::connect(&self.provider_address) => stream.map_err(|e| {
                AgentError::Tunnel(format!("failed to dial {}: {e}", self.provider_address))
            })?,
        };
        // Best effort, the tunnel carries small request/response pairs
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY: {}", e);
        }
        backoff.reset();
        info!(provider_address = %self.provider_address, "tunnel established");

        let builder = auto::Builder::new(TokioExecutor::new());
        let connection = builder.serve_connection(
            TokioIo::new(stream),
            TowerToHyperService::new(router),
        );
        tokio::pin!(connection);

        tokio::select! {
            result = connection.as_mut() => {
                result.map_err(|e| AgentError::Tunnel(format!("tunnel connection failed: {e}")))?;
                Ok(SessionEnd::Disconnected)
            }
            () = shutdown.cancelled() => {
                connection.as_mut().graceful_shutdown();
                if let Err(e) = connection.await {
                    debug!("Tunnel connection ended with error during shutdown: {}", e);
                }
                Ok(SessionEnd::Shutdown)
            }
        }
    }
}

#[async_trait]
impl Transport for ReverseTunnel {
    async fn serve(&self, router: Router, shutdown: CancellationToken) -> Result<(), AgentError> {
        let mut backoff = self.backoff.clone();

        loop {
            match self.session(router.clone(), &shutdown, &mut backoff).await {
                Ok(SessionEnd::Shutdown) => {
                    info!("tunnel closed for shutdown");
                    return Ok(());
                }
                Ok(SessionEnd::Disconnected) => {
                    info!("provider closed the tunnel");
                }
                Err(e) => {
                    warn!("{}", e);
                }
            }

            let delay = backoff.next_backoff();
            debug!(delay_secs = delay.as_secs(), "redialing provider after backoff");
            tokio::select! {
                () = shutdown.cancelled() => return Ok(()),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}
