//! Agent-specific error types.
//!
//! Bootstrap and transport failures of the agent process. Errors returned to
//! RPC callers live in [`crate::rpc::RpcError`].

use host_client::HostError;
use thiserror::Error;

/// Errors that can stop the metal agent.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Host control plane error
    #[error("Host control plane error: {0}")]
    Host(#[from] HostError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The RPC surface could not be served over the tunnel
    #[error("Tunnel error: {0}")]
    Tunnel(String),

    /// I/O error (signal handlers, kernel command line)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
