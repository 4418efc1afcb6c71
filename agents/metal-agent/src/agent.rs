//! Agent bootstrap.
//!
//! Resolves the host identity from the host control plane, wires the
//! power-management service to the BMC and the host, and serves it on the
//! transport until shutdown.

use crate::backoff::FibonacciBackoff;
use crate::config::Config;
use crate::error::AgentError;
use crate::service::PowerManagementService;
use crate::tunnel::{ReverseTunnel, Transport, router};
use host_client::{HostControlClient, HostControlTrait};
use ipmi_client::{BmcConnector, IpmitoolConnector};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Identity of the host the agent runs on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostIdentity {
    /// Stable system UUID, sent as the `machine-id` header
    pub machine_id: String,
    /// Host OS version tag
    pub version: String,
}

/// The metal agent process
#[derive(Debug)]
pub struct Agent {
    config: Config,
}

impl Agent {
    /// Agent running with `config`
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Runs the agent until `shutdown` is cancelled
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), AgentError> {
        info!("Starting Metal Agent");

        let host = HostControlClient::new(self.config.host_api_url.clone())?;
        let Some(identity) =
            read_identity(&host, FibonacciBackoff::default(), &shutdown).await?
        else {
            return Ok(());
        };
        info!(
            machine_id = %identity.machine_id,
            version = %identity.version,
            "resolved host identity"
        );

        let host = host.with_machine_id(&identity.machine_id)?;
        let bmc = IpmitoolConnector::new(self.config.ipmitool_path.clone());
        let transport = ReverseTunnel::new(self.config.provider_address.clone());

        self.serve(
            Arc::new(host),
            Arc::new(bmc),
            &identity.machine_id,
            &transport,
            shutdown,
        )
        .await
    }

    /// Builds the service and router and hands them to `transport`
    pub async fn serve(
        &self,
        host: Arc<dyn HostControlTrait>,
        bmc: Arc<dyn BmcConnector>,
        machine_id: &str,
        transport: &dyn Transport,
        shutdown: CancellationToken,
    ) -> Result<(), AgentError> {
        let service = PowerManagementService::new(host, bmc, self.config.test_mode);
        let router = router(
            Arc::new(service),
            machine_id,
            self.config.request_timeout,
            shutdown.clone(),
        )?;

        info!(provider_address = %self.config.provider_address, "serving agent API");
        transport.serve(router, shutdown).await
    }
}

/// Reads the host identity, waiting for the host control plane to come up
///
/// Returns `None` when `shutdown` fires first.
pub async fn read_identity(
    host: &dyn HostControlTrait,
    mut backoff: FibonacciBackoff,
    shutdown: &CancellationToken,
) -> Result<Option<HostIdentity>, AgentError> {
    loop {
        match fetch_identity(host).await {
            Ok(identity) => return Ok(Some(identity)),
            Err(e) if e.is_unavailable() => {
                let delay = backoff.next_backoff();
                warn!(
                    host = host.base_url(),
                    delay_secs = delay.as_secs(),
                    "host control plane not reachable yet: {}",
                    e
                );
                tokio::select! {
                    () = shutdown.cancelled() => return Ok(None),
                    () = tokio::time::sleep(delay) => {}
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
}

async fn fetch_identity(host: &dyn HostControlTrait) -> Result<HostIdentity, host_client::HostError> {
    let version = host.version().await?;
    let system = host.system_information().await?;

    Ok(HostIdentity {
        machine_id: system.uuid.to_string(),
        version: version.tag,
    })
}
