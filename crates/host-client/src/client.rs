//! Host control plane HTTP client
//!
//! Talks JSON to the machine API of the host OS. Every request carries the
//! `machine-id` header once the host identity is known.

use crate::error::HostError;
use crate::host_trait::HostControlTrait;
use crate::models::*;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use reqwest::{Client, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

/// Header identifying the host to the control plane and the provider
pub const MACHINE_ID_HEADER: &str = "machine-id";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
// Zeroing a large disk runs for hours
const WIPE_TIMEOUT: Duration = Duration::from_secs(12 * 60 * 60);

/// Host control plane client
#[derive(Debug, Clone)]
pub struct HostControlClient {
    client: Client,
    base_url: String,
}

impl HostControlClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `base_url` - Control plane base URL (e.g., "http://127.0.0.1:50001")
    pub fn new(base_url: impl Into<String>) -> Result<Self, HostError> {
        Self::build(base_url.into(), HeaderMap::new())
    }

    /// Returns a client that sends `machine_id` in the `machine-id` header of every request
    pub fn with_machine_id(&self, machine_id: &str) -> Result<Self, HostError> {
        let mut headers = HeaderMap::new();
        let value = HeaderValue::from_str(machine_id)
            .map_err(|e| HostError::InvalidConfig(format!("invalid machine id {machine_id:?}: {e}")))?;
        headers.insert(MACHINE_ID_HEADER, value);
        Self::build(self.base_url.clone(), headers)
    }

    fn build(base_url: String, mut headers: HeaderMap) -> Result<Self, HostError> {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(HostError::InvalidConfig(format!(
                "base URL must be http(s): {base_url}"
            )));
        }
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, HostError> {
        let url = self.build_url(path);
        debug!("GET {}", url);

        let response = self.client.get(&url).send().await.map_err(send_error)?;
        let response = check_status("GET", path, response).await?;

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(HostError::Serialization)
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<(), HostError> {
        let url = self.build_url(path);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(send_error)?;
        check_status("POST", path, response).await.map(drop)
    }
}

fn send_error(e: reqwest::Error) -> HostError {
    if e.is_connect() {
        HostError::Unavailable(e.to_string())
    } else {
        HostError::Http(e)
    }
}

async fn check_status(
    method: &'static str,
    path: &str,
    response: Response,
) -> Result<Response, HostError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(HostError::Api {
        method,
        path: path.to_string(),
        status: status.as_u16(),
        message: message.trim().to_string(),
    })
}

#[async_trait::async_trait]
impl HostControlTrait for HostControlClient {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn version(&self) -> Result<VersionInfo, HostError> {
        self.get("/v1/version").await
    }

    async fn system_information(&self) -> Result<SystemInformation, HostError> {
        self.get("/v1/system/information").await
    }

    async fn reboot(&self, mode: RebootMode) -> Result<(), HostError> {
        self.post("/v1/reboot", &RebootRequest { mode }, REQUEST_TIMEOUT)
            .await
    }

    async fn list_disks(&self) -> Result<Vec<Disk>, HostError> {
        let list: DiskList = self.get("/v1/block/disks").await?;
        Ok(list.disks)
    }

    async fn wipe_block_devices(&self, request: &WipeRequest) -> Result<(), HostError> {
        self.post("/v1/block/wipe", request, WIPE_TIMEOUT).await
    }
}
