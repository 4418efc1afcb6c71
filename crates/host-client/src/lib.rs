//! Host control plane client
//!
//! A small client for the machine API of the host OS, covering what the
//! agent needs: host identity, reboot, block device inventory and wipe.
//!
//! # Example
//!
//! ```no_run
//! use host_client::{HostControlClient, HostControlTrait, RebootMode};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HostControlClient::new("http://127.0.0.1:50001")?;
//!
//! let info = client.system_information().await?;
//! let client = client.with_machine_id(&info.uuid.to_string())?;
//!
//! for disk in client.list_disks().await? {
//!     println!("{} ({} bytes)", disk.id, disk.size);
//! }
//! client.reboot(RebootMode::PowerCycle).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod host_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::{HostControlClient, MACHINE_ID_HEADER};
pub use error::HostError;
pub use host_trait::HostControlTrait;
pub use models::*;
#[cfg(feature = "test-util")]
pub use mock::MockHostControl;
