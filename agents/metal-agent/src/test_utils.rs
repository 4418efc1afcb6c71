//! Test utilities for unit testing the agent service
//!
//! This module provides helpers for creating test data and wiring the
//! service to in-memory BMC and host control plane mocks.

#[cfg(test)]
use crate::service::PowerManagementService;
#[cfg(test)]
use host_client::{Disk, MockHostControl};
#[cfg(test)]
use ipmi_client::MockBmc;
#[cfg(test)]
use std::net::Ipv4Addr;
#[cfg(test)]
use std::sync::Arc;

/// System UUID reported by the mock host
#[cfg(test)]
pub const MACHINE_UUID: &str = "4c4c4544-0039-4410-8030-b4c04f4d4e31";

/// Helper to create a mock host control plane
#[cfg(test)]
pub fn create_test_host() -> MockHostControl {
    MockHostControl::new(MACHINE_UUID.parse().unwrap())
}

/// Helper to create a mock BMC with a reachable LAN endpoint and an 8-slot user table
#[cfg(test)]
pub fn create_test_bmc() -> MockBmc {
    MockBmc::new(8)
        .with_lan(Ipv4Addr::new(192, 168, 1, 50), 623)
        .with_user(2, "admin")
}

/// Helper to wire a service to the given mocks
#[cfg(test)]
pub fn create_test_service(
    host: &MockHostControl,
    bmc: &MockBmc,
    test_mode: bool,
) -> PowerManagementService {
    PowerManagementService::new(Arc::new(host.clone()), Arc::new(bmc.clone()), test_mode)
}

/// Helper to create a test disk
#[cfg(test)]
pub fn create_test_disk(id: &str, readonly: bool, cdrom: bool) -> Disk {
    Disk {
        id: id.to_string(),
        size: 512 * 1024 * 1024 * 1024,
        model: None,
        transport: None,
        readonly,
        cdrom,
    }
}
