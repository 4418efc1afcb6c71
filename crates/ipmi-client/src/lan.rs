//! BMC management network endpoint readout

use crate::client::IpmiClient;
use crate::command::LanParam;
use crate::error::IpmiError;
use std::fmt;
use std::net::Ipv4Addr;
use tracing::debug;

/// Address and RMCP port the BMC listens on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanEndpoint {
    /// Station IP address
    pub ip: Ipv4Addr,
    /// Primary RMCP port
    pub port: u16,
}

impl fmt::Display for LanEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Reads the BMC IP address and primary RMCP port from the primary channel
pub async fn read_endpoint(client: &mut IpmiClient) -> Result<LanEndpoint, IpmiError> {
    let ip = client
        .lan_config(LanParam::IpAddress)
        .await
        .and_then(|data| decode_address(&data))
        .map_err(|e| param_error(LanParam::IpAddress, e))?;

    let port = client
        .lan_config(LanParam::PrimaryRmcpPort)
        .await
        .and_then(|data| decode_port(&data))
        .map_err(|e| param_error(LanParam::PrimaryRmcpPort, e))?;

    let endpoint = LanEndpoint { ip, port };
    debug!(%endpoint, "read BMC LAN endpoint");
    Ok(endpoint)
}

fn param_error(param: LanParam, source: IpmiError) -> IpmiError {
    IpmiError::LanParameter {
        param: param.name(),
        source: Box::new(source),
    }
}

/// Decodes parameter 3, four bytes in network order
pub fn decode_address(data: &[u8]) -> Result<Ipv4Addr, IpmiError> {
    match data {
        [a, b, c, d, ..] => Ok(Ipv4Addr::new(*a, *b, *c, *d)),
        _ => Err(IpmiError::Malformed(format!(
            "IP address needs 4 bytes, got {}",
            data.len()
        ))),
    }
}

/// Decodes parameter 8, least significant byte first
pub fn decode_port(data: &[u8]) -> Result<u16, IpmiError> {
    match data {
        [lo, hi, ..] => Ok(u16::from_le_bytes([*lo, *hi])),
        _ => Err(IpmiError::Malformed(format!(
            "RMCP port needs 2 bytes, got {}",
            data.len()
        ))),
    }
}
