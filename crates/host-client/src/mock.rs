//! Mock HostControlClient for unit testing
//!
//! This module provides a mock implementation of HostControlTrait that can be used
//! in unit tests without a running host control plane.

use crate::error::HostError;
use crate::host_trait::HostControlTrait;
use crate::models::*;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Mock host control plane for testing
///
/// Stores disks in memory and records every reboot and wipe request.
/// Clones share the same state.
#[derive(Debug, Clone)]
pub struct MockHostControl {
    base_url: String,
    system: SystemInformation,
    disks: Arc<Mutex<Vec<Disk>>>,
    reboots: Arc<Mutex<Vec<RebootMode>>>,
    wipes: Arc<Mutex<Vec<WipeRequest>>>,
    failure: Arc<Mutex<Option<(u16, String)>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockHostControl {
    /// Create a new mock for the host identified by `uuid`
    pub fn new(uuid: Uuid) -> Self {
        Self {
            base_url: "http://mock-host".to_string(),
            system: SystemInformation {
                uuid,
                manufacturer: "Mock".to_string(),
                product_name: "Mock Server".to_string(),
                serial_number: "MOCK-0001".to_string(),
            },
            disks: Arc::new(Mutex::new(Vec::new())),
            reboots: Arc::new(Mutex::new(Vec::new())),
            wipes: Arc::new(Mutex::new(Vec::new())),
            failure: Arc::new(Mutex::new(None)),
        }
    }

    /// Add a disk to the inventory (for test setup)
    pub fn add_disk(&self, disk: Disk) {
        lock(&self.disks).push(disk);
    }

    /// Make every call fail with `status` and `message`
    pub fn fail_with(&self, status: u16, message: impl Into<String>) {
        *lock(&self.failure) = Some((status, message.into()));
    }

    /// Reboot requests received so far
    pub fn reboots(&self) -> Vec<RebootMode> {
        lock(&self.reboots).clone()
    }

    /// Wipe requests received so far
    pub fn wipes(&self) -> Vec<WipeRequest> {
        lock(&self.wipes).clone()
    }

    fn check(&self, method: &'static str, path: &str) -> Result<(), HostError> {
        match lock(&self.failure).as_ref() {
            Some((status, message)) => Err(HostError::Api {
                method,
                path: path.to_string(),
                status: *status,
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl HostControlTrait for MockHostControl {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn version(&self) -> Result<VersionInfo, HostError> {
        self.check("GET", "/v1/version")?;
        Ok(VersionInfo {
            tag: "v0.0.0-mock".to_string(),
            sha: String::new(),
        })
    }

    async fn system_information(&self) -> Result<SystemInformation, HostError> {
        self.check("GET", "/v1/system/information")?;
        Ok(self.system.clone())
    }

    async fn reboot(&self, mode: RebootMode) -> Result<(), HostError> {
        self.check("POST", "/v1/reboot")?;
        lock(&self.reboots).push(mode);
        Ok(())
    }

    async fn list_disks(&self) -> Result<Vec<Disk>, HostError> {
        self.check("GET", "/v1/block/disks")?;
        Ok(lock(&self.disks).clone())
    }

    async fn wipe_block_devices(&self, request: &WipeRequest) -> Result<(), HostError> {
        self.check("POST", "/v1/block/wipe")?;
        lock(&self.wipes).push(request.clone());
        Ok(())
    }
}
