//! Agent service implementation.
//!
//! Each RPC is coalesced on its method name and request, then served either
//! from the local BMC (power management) or from the host control plane
//! (reboot, disk wipe). A BMC channel is opened for every call and closed
//! before the call returns.

use crate::coalesce::{CallContext, Coalescer};
use crate::rpc::*;
use host_client::{Disk, HostControlTrait, RebootMode, WipeDescriptor, WipeMethod, WipeRequest};
use ipmi_client::{BmcConnector, IpmiClient, account_exists, ensure_account, read_endpoint};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The agent RPC service
#[derive(Clone)]
pub struct PowerManagementService {
    host: Arc<dyn HostControlTrait>,
    bmc: Arc<dyn BmcConnector>,
    coalescer: Coalescer,
    test_mode: bool,
}

impl std::fmt::Debug for PowerManagementService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PowerManagementService")
            .field("host", &self.host.base_url())
            .field("test_mode", &self.test_mode)
            .finish_non_exhaustive()
    }
}

impl PowerManagementService {
    /// Creates the service
    ///
    /// In test mode power management is assumed to be handled by an external
    /// API and the BMC connector is never used.
    pub fn new(
        host: Arc<dyn HostControlTrait>,
        bmc: Arc<dyn BmcConnector>,
        test_mode: bool,
    ) -> Self {
        Self {
            host,
            bmc,
            coalescer: Coalescer::new(),
            test_mode,
        }
    }

    /// Liveness check
    pub async fn hello(
        &self,
        ctx: &CallContext,
        request: HelloRequest,
    ) -> Result<HelloResponse, RpcError> {
        debug!(test_mode = self.test_mode, "hello");

        self.coalescer
            .run(method::HELLO, &request, ctx, || async {
                Ok(HelloResponse {})
            })
            .await
    }

    /// Reports how power is managed on this host
    pub async fn get_power_management(
        &self,
        ctx: &CallContext,
        request: GetPowerManagementRequest,
    ) -> Result<GetPowerManagementResponse, RpcError> {
        debug!(test_mode = self.test_mode, "get power management");

        let test_mode = self.test_mode;
        let bmc = Arc::clone(&self.bmc);
        let check_username = request
            .ipmi
            .as_ref()
            .map(|ipmi| ipmi.check_username.clone())
            .unwrap_or_default();

        self.coalescer
            .run(method::GET_POWER_MANAGEMENT, &request, ctx, move || async move {
                if test_mode {
                    return Ok(GetPowerManagementResponse {
                        api: Some(ApiPowerManagement {}),
                        ipmi: None,
                    });
                }

                let mut client = open_bmc(bmc.as_ref()).await?;
                let result = read_power_management(&mut client, &check_username).await;
                close_bmc(client).await;

                Ok(GetPowerManagementResponse {
                    api: None,
                    ipmi: Some(result?),
                })
            })
            .await
    }

    /// Provisions the requested BMC account
    pub async fn set_power_management(
        &self,
        ctx: &CallContext,
        request: SetPowerManagementRequest,
    ) -> Result<SetPowerManagementResponse, RpcError> {
        let credentials = request.ipmi.clone().unwrap_or_default();
        debug!(
            test_mode = self.test_mode,
            ipmi_username = %credentials.username,
            "set power management"
        );

        let test_mode = self.test_mode;
        let bmc = Arc::clone(&self.bmc);

        self.coalescer
            .run(method::SET_POWER_MANAGEMENT, &request, ctx, move || async move {
                if test_mode {
                    return Ok(SetPowerManagementResponse {});
                }

                let mut client = open_bmc(bmc.as_ref()).await?;
                let result =
                    ensure_account(&mut client, &credentials.username, &credentials.password)
                        .await;
                close_bmc(client).await;

                let account = result.map_err(|e| {
                    RpcError::Internal(format!("failed to set up IPMI user: {e}"))
                })?;
                info!(
                    slot = account.slot,
                    created = account.created,
                    "IPMI user ready"
                );

                Ok(SetPowerManagementResponse {})
            })
            .await
    }

    /// Power-cycles the host
    pub async fn reboot(
        &self,
        ctx: &CallContext,
        request: RebootRequest,
    ) -> Result<RebootResponse, RpcError> {
        info!("reboot");

        let host = Arc::clone(&self.host);

        self.coalescer
            .run(method::REBOOT, &request, ctx, move || async move {
                host.reboot(RebootMode::PowerCycle).await?;
                Ok(RebootResponse {})
            })
            .await
    }

    /// Wipes every writable, non-optical disk in one batch
    pub async fn wipe_disks(
        &self,
        ctx: &CallContext,
        request: WipeDisksRequest,
    ) -> Result<WipeDisksResponse, RpcError> {
        info!(zeroes = request.zeroes, test_mode = self.test_mode, "wipe disks");

        let host = Arc::clone(&self.host);
        let wipe_method = if request.zeroes {
            WipeMethod::Zeroes
        } else {
            WipeMethod::Fast
        };

        self.coalescer
            .run(method::WIPE_DISKS, &request, ctx, move || async move {
                let disks = host
                    .list_disks()
                    .await
                    .map_err(|e| RpcError::from(e).context("failed to list disks"))?;
                let wipe = wipe_request(&disks, wipe_method);

                let devices: Vec<&str> = wipe.devices.iter().map(|d| d.device.as_str()).collect();
                debug!(?devices, "going to wipe disks");

                host.wipe_block_devices(&wipe)
                    .await
                    .map_err(|e| RpcError::from(e).context("failed to wipe disks"))?;
                Ok(WipeDisksResponse {})
            })
            .await
    }
}

/// Builds the wipe batch, skipping read-only and CD-ROM devices
pub fn wipe_request(disks: &[Disk], method: WipeMethod) -> WipeRequest {
    WipeRequest {
        devices: disks
            .iter()
            .filter(|disk| disk.is_wipeable())
            .map(|disk| WipeDescriptor {
                device: disk.id.clone(),
                method,
                skip_volume_check: true,
            })
            .collect(),
    }
}

async fn open_bmc(bmc: &dyn BmcConnector) -> Result<IpmiClient, RpcError> {
    IpmiClient::connect(bmc)
        .await
        .map_err(|e| RpcError::Internal(format!("error creating ipmi client: {e}")))
}

async fn close_bmc(client: IpmiClient) {
    if let Err(e) = client.close().await {
        warn!("Failed to close BMC channel: {}", e);
    }
}

async fn read_power_management(
    client: &mut IpmiClient,
    check_username: &str,
) -> Result<IpmiPowerManagement, RpcError> {
    let endpoint = read_endpoint(client)
        .await
        .map_err(|e| RpcError::Internal(format!("error getting bmc ip port: {e}")))?;

    let user_exists = account_exists(client, check_username)
        .await
        .map_err(|e| {
            RpcError::Internal(format!(
                "error checking if user {check_username:?} exists: {e}"
            ))
        })?;

    Ok(IpmiPowerManagement {
        address: endpoint.ip.to_string(),
        port: u32::from(endpoint.port),
        user_exists,
    })
}
