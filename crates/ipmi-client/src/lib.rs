//! Local BMC access over IPMI
//!
//! A small IPMI client for the in-host baseboard management controller.
//! It covers the two jobs a provisioning agent needs from the BMC:
//! claiming a dedicated administrator account in the user table, and
//! reporting the address the BMC answers on.
//!
//! # Example
//!
//! ```no_run
//! use ipmi_client::{IpmiClient, IpmitoolConnector, ensure_account, read_endpoint};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let connector = IpmitoolConnector::new("ipmitool");
//! let mut client = IpmiClient::connect(&connector).await?;
//!
//! let endpoint = read_endpoint(&mut client).await?;
//! let account = ensure_account(&mut client, "metal", "s3cret").await?;
//! println!("user {} in slot {} on {endpoint}", account.username, account.slot);
//!
//! client.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **User provisioning**: idempotent claim of a user slot with administrator access
//! - **LAN readout**: BMC IP address and RMCP port
//! - **Pluggable channels**: `ipmitool` on the host, [`MockBmc`] in tests (`test-util`)

pub mod channel;
pub mod client;
pub mod command;
pub mod error;
pub mod lan;
pub mod users;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use channel::{BmcChannel, BmcConnector, IpmitoolConnector};
pub use client::IpmiClient;
pub use command::{Privilege, UserAccess, UserSummary};
pub use error::IpmiError;
pub use lan::{LanEndpoint, read_endpoint};
pub use users::{ManagedAccount, SlotState, UserSlot, account_exists, ensure_account};
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockBmc, MockUser};
