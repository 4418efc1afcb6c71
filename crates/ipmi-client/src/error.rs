//! IPMI client errors

use crate::command::NetFn;
use thiserror::Error;

/// Errors that can occur when talking to the local BMC
#[derive(Debug, Error)]
pub enum IpmiError {
    /// The BMC channel could not be opened or the transport is gone
    #[error("BMC unavailable: {0}")]
    Unavailable(String),

    /// The BMC answered with a non-zero completion code
    #[error("BMC rejected {net_fn} command 0x{cmd:02x} with completion code 0x{code:02x}")]
    Completion {
        /// Network function of the rejected request
        net_fn: NetFn,
        /// Command code of the rejected request
        cmd: u8,
        /// IPMI completion code
        code: u8,
    },

    /// The transport failed without reporting a completion code
    #[error("BMC command failed: {0}")]
    CommandFailed(String),

    /// The response payload could not be decoded
    #[error("Malformed BMC response: {0}")]
    Malformed(String),

    /// A request argument does not fit the IPMI encoding
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Every non-reserved user slot is taken by another account
    #[error("no slot available for user {0:?}")]
    NoAvailableSlot(String),

    /// A write step of account provisioning failed
    #[error("{step} failed for user slot {slot}: {source}")]
    Provisioning {
        /// Provisioning step that failed
        step: &'static str,
        /// Target user slot
        slot: u8,
        /// Underlying failure
        #[source]
        source: Box<IpmiError>,
    },

    /// A LAN configuration parameter could not be read
    #[error("reading LAN parameter {param} failed: {source}")]
    LanParameter {
        /// Human-readable parameter name
        param: &'static str,
        /// Underlying failure
        #[source]
        source: Box<IpmiError>,
    },

    /// The channel was used after being closed
    #[error("BMC channel is closed")]
    Closed,
}

impl IpmiError {
    /// Wraps `self` as the failure of a provisioning step on `slot`.
    #[must_use]
    pub fn in_step(self, step: &'static str, slot: u8) -> Self {
        Self::Provisioning {
            step,
            slot,
            source: Box::new(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_error_display() {
        let err = IpmiError::Completion {
            net_fn: NetFn::App,
            cmd: 0x46,
            code: 0xcc,
        };
        assert_eq!(
            err.to_string(),
            "BMC rejected app command 0x46 with completion code 0xcc"
        );
    }

    #[test]
    fn test_provisioning_error_names_step() {
        let err = IpmiError::Closed.in_step("set user access", 3);
        assert_eq!(
            err.to_string(),
            "set user access failed for user slot 3: BMC channel is closed"
        );
    }
}
