//! HostControlTrait for mocking
//!
//! This trait abstracts the host control plane client to enable mocking in unit tests.
//! The concrete HostControlClient implements this trait, and tests can use mock implementations.

use crate::error::HostError;
use crate::models::*;

/// Trait for host control plane operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait HostControlTrait: Send + Sync {
    /// Get the base URL
    fn base_url(&self) -> &str;

    /// Read the control plane version
    async fn version(&self) -> Result<VersionInfo, HostError>;

    /// Read the hardware identity of the host
    async fn system_information(&self) -> Result<SystemInformation, HostError>;

    /// Reboot the host
    async fn reboot(&self, mode: RebootMode) -> Result<(), HostError>;

    /// List the block devices of the host
    async fn list_disks(&self) -> Result<Vec<Disk>, HostError>;

    /// Wipe every device in `request` in one batch
    async fn wipe_block_devices(&self, request: &WipeRequest) -> Result<(), HostError>;
}
