//! Integration tests against the local BMC
//!
//! These tests require root and a host with a kernel IPMI device.
//! Set IPMI_TEST_USER and IPMI_TEST_PASSWORD to run the provisioning test.

use ipmi_client::{IpmiClient, IpmitoolConnector, account_exists, ensure_account, read_endpoint};

fn connector() -> IpmitoolConnector {
    let program = std::env::var("IPMITOOL").unwrap_or_else(|_| "ipmitool".to_string());
    IpmitoolConnector::new(program)
}

#[tokio::test]
#[ignore] // Requires a local BMC
async fn test_read_summary() {
    let mut client = IpmiClient::connect(&connector())
        .await
        .expect("Failed to open BMC channel");

    let summary = client.user_summary().await.expect("Failed to read user summary");
    println!("BMC supports {} users", summary.max_users);
    assert!(summary.max_users >= 2);

    client.close().await.expect("Failed to close channel");
}

#[tokio::test]
#[ignore]
async fn test_read_endpoint() {
    let mut client = IpmiClient::connect(&connector())
        .await
        .expect("Failed to open BMC channel");

    let endpoint = read_endpoint(&mut client).await.expect("Failed to read LAN endpoint");
    println!("BMC listens on {endpoint}");

    client.close().await.expect("Failed to close channel");
}

#[tokio::test]
#[ignore]
async fn test_ensure_account() {
    let username = std::env::var("IPMI_TEST_USER")
        .expect("IPMI_TEST_USER environment variable must be set");
    let password = std::env::var("IPMI_TEST_PASSWORD")
        .expect("IPMI_TEST_PASSWORD environment variable must be set");

    let mut client = IpmiClient::connect(&connector())
        .await
        .expect("Failed to open BMC channel");

    let account = ensure_account(&mut client, &username, &password)
        .await
        .expect("Failed to provision account");
    println!("Provisioned {} in slot {}", account.username, account.slot);

    assert!(account_exists(&mut client, &username).await.unwrap());

    client.close().await.expect("Failed to close channel");
}
