//! Host control plane API models

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Hardware identity of the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInformation {
    /// SMBIOS system UUID, stable across reinstalls
    pub uuid: Uuid,
    /// System manufacturer
    #[serde(default)]
    pub manufacturer: String,
    /// Product name
    #[serde(default)]
    pub product_name: String,
    /// Chassis serial number
    #[serde(default)]
    pub serial_number: String,
}

/// Control plane version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    /// Release tag
    pub tag: String,
    /// Git commit
    #[serde(default)]
    pub sha: String,
}

/// A block device as reported by the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disk {
    /// Device name, e.g. `sda` or `nvme0n1`
    pub id: String,
    /// Size in bytes
    #[serde(default)]
    pub size: u64,
    /// Device model
    #[serde(default)]
    pub model: Option<String>,
    /// Bus, e.g. `sata` or `nvme`
    #[serde(default)]
    pub transport: Option<String>,
    /// Device is read-only
    #[serde(default)]
    pub readonly: bool,
    /// Device is an optical drive
    #[serde(default)]
    pub cdrom: bool,
}

impl Disk {
    /// Whether the device can be wiped at all
    #[must_use]
    pub fn is_wipeable(&self) -> bool {
        !self.readonly && !self.cdrom
    }
}

/// How a block device is wiped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WipeMethod {
    /// Discard partition tables and signatures
    Fast,
    /// Overwrite the whole device with zeroes
    Zeroes,
}

/// One device in a wipe request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WipeDescriptor {
    /// Device name
    pub device: String,
    /// Wipe method
    pub method: WipeMethod,
    /// Wipe even if the device holds a mounted volume
    pub skip_volume_check: bool,
}

/// Batched wipe request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WipeRequest {
    /// Devices wiped in this batch
    pub devices: Vec<WipeDescriptor>,
}

/// Reboot flavor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RebootMode {
    /// Warm reboot
    #[default]
    Default,
    /// Full power cycle instead of a warm reboot
    PowerCycle,
}

/// Reboot request body
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebootRequest {
    /// Reboot flavor
    pub mode: RebootMode,
}

/// Disk inventory response body
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskList {
    /// Every block device on the host
    pub disks: Vec<Disk>,
}
