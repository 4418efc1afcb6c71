//! IPMI command codec
//!
//! Encodes request payloads and decodes response payloads for the subset of
//! the IPMI v2.0 command set the agent needs: user-table management
//! (section 22) and LAN configuration readout (section 23).
//!
//! Response payloads handed to the decoders never include the completion
//! code; a non-zero completion code is reported by the channel as
//! [`IpmiError::Completion`].

use crate::error::IpmiError;
use std::fmt;

/// Channel used for local management (LAN channel 1)
pub const PRIMARY_CHANNEL: u8 = 0x01;

/// Length of user name and IPMI 1.5 password fields
pub const USER_FIELD_LEN: usize = 16;

/// Get User Access (22.27), also the source of the user summary
pub const CMD_GET_USER_ACCESS: u8 = 0x44;
/// Set User Access (22.26)
pub const CMD_SET_USER_ACCESS: u8 = 0x43;
/// Set User Name (22.28)
pub const CMD_SET_USER_NAME: u8 = 0x45;
/// Get User Name (22.29)
pub const CMD_GET_USER_NAME: u8 = 0x46;
/// Set User Password (22.30), also used to enable and disable users
pub const CMD_SET_USER_PASSWORD: u8 = 0x47;
/// Get LAN Configuration Parameters (23.2)
pub const CMD_GET_LAN_CONFIG: u8 = 0x02;

/// Set User Password operation codes
pub const PASSWORD_OP_DISABLE: u8 = 0x00;
/// Enable the user
pub const PASSWORD_OP_ENABLE: u8 = 0x01;
/// Set the password
pub const PASSWORD_OP_SET: u8 = 0x02;

/// IPMI network function codes used by the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetFn {
    /// Application requests
    App = 0x06,
    /// Transport requests
    Transport = 0x0C,
}

impl NetFn {
    /// Wire value of the network function
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for NetFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetFn::App => write!(f, "app"),
            NetFn::Transport => write!(f, "transport"),
        }
    }
}

/// User privilege limits (22.26, byte 3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    /// Callback level
    Callback = 0x1,
    /// User level
    User = 0x2,
    /// Operator level
    Operator = 0x3,
    /// Administrator level
    Administrator = 0x4,
    /// OEM proprietary level
    OemProprietary = 0x5,
    /// No access
    NoAccess = 0xF,
}

impl Privilege {
    /// Decodes the low nibble of a privilege byte
    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x0F {
            0x1 => Privilege::Callback,
            0x2 => Privilege::User,
            0x3 => Privilege::Operator,
            0x4 => Privilege::Administrator,
            0x5 => Privilege::OemProprietary,
            _ => Privilege::NoAccess,
        }
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Privilege::Callback => "callback",
            Privilege::User => "user",
            Privilege::Operator => "operator",
            Privilege::Administrator => "administrator",
            Privilege::OemProprietary => "oem",
            Privilege::NoAccess => "noaccess",
        };
        write!(f, "{name}")
    }
}

/// Per-channel access settings written by Set User Access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserAccess {
    /// Channel the settings apply to
    pub channel: u8,
    /// Restrict the user to callback connections
    pub callback_only: bool,
    /// Enable link authentication
    pub link_auth: bool,
    /// Enable IPMI messaging (required for LAN sessions)
    pub ipmi_messaging: bool,
    /// Privilege limit on the channel
    pub privilege: Privilege,
    /// 0 means no session limit
    pub session_limit: u8,
}

impl UserAccess {
    /// Administrator on the primary channel, IPMI messaging on, no session limit
    #[must_use]
    pub fn administrator() -> Self {
        Self {
            channel: PRIMARY_CHANNEL,
            callback_only: false,
            link_auth: false,
            ipmi_messaging: true,
            privilege: Privilege::Administrator,
            session_limit: 0,
        }
    }

    fn options_byte(&self) -> u8 {
        // bit 7 enables changing bits 6:4
        let mut byte = 0x80 | (self.channel & 0x0F);
        if self.callback_only {
            byte |= 0x40;
        }
        if self.link_auth {
            byte |= 0x20;
        }
        if self.ipmi_messaging {
            byte |= 0x10;
        }
        byte
    }
}

/// LAN configuration parameters read by the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanParam {
    /// Station IPv4 address
    IpAddress = 0x03,
    /// Primary RMCP port, little-endian
    PrimaryRmcpPort = 0x08,
}

impl LanParam {
    /// Human-readable parameter name
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            LanParam::IpAddress => "IP address",
            LanParam::PrimaryRmcpPort => "primary RMCP port",
        }
    }
}

/// A raw IPMI request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Network function
    pub net_fn: NetFn,
    /// Command code
    pub cmd: u8,
    /// Request payload
    pub data: Vec<u8>,
}

impl Request {
    /// Creates a raw request
    #[must_use]
    pub fn new(net_fn: NetFn, cmd: u8, data: Vec<u8>) -> Self {
        Self { net_fn, cmd, data }
    }

    /// Get User Access for user 1, used to read the user table summary
    #[must_use]
    pub fn user_summary(channel: u8) -> Self {
        Self::new(NetFn::App, CMD_GET_USER_ACCESS, vec![channel & 0x0F, 0x01])
    }

    /// Get User Name
    #[must_use]
    pub fn get_user_name(slot: u8) -> Self {
        Self::new(NetFn::App, CMD_GET_USER_NAME, vec![slot & 0x3F])
    }

    /// Set User Name with a NUL-padded 16-byte name
    pub fn set_user_name(slot: u8, name: &str) -> Result<Self, IpmiError> {
        let mut data = vec![slot & 0x3F];
        data.extend_from_slice(&pad_field("user name", name.as_bytes())?);
        Ok(Self::new(NetFn::App, CMD_SET_USER_NAME, data))
    }

    /// Set User Password with the 16-byte password form
    pub fn set_user_password(slot: u8, password: &str) -> Result<Self, IpmiError> {
        let mut data = vec![slot & 0x3F, PASSWORD_OP_SET];
        data.extend_from_slice(&pad_field("password", password.as_bytes())?);
        Ok(Self::new(NetFn::App, CMD_SET_USER_PASSWORD, data))
    }

    /// Set User Password, enable operation
    #[must_use]
    pub fn enable_user(slot: u8) -> Self {
        Self::new(
            NetFn::App,
            CMD_SET_USER_PASSWORD,
            vec![slot & 0x3F, PASSWORD_OP_ENABLE],
        )
    }

    /// Set User Access with the "change bits" flag set
    #[must_use]
    pub fn set_user_access(slot: u8, access: &UserAccess) -> Self {
        Self::new(
            NetFn::App,
            CMD_SET_USER_ACCESS,
            vec![
                access.options_byte(),
                slot & 0x3F,
                access.privilege as u8,
                access.session_limit & 0x0F,
            ],
        )
    }

    /// Get LAN Configuration Parameters, no set or block selector
    #[must_use]
    pub fn lan_config(channel: u8, param: LanParam) -> Self {
        Self::new(
            NetFn::Transport,
            CMD_GET_LAN_CONFIG,
            vec![channel & 0x0F, param as u8, 0x00, 0x00],
        )
    }
}

/// Validates a user field and pads it with NULs to [`USER_FIELD_LEN`]
pub fn pad_field(field: &str, value: &[u8]) -> Result<[u8; USER_FIELD_LEN], IpmiError> {
    if value.len() > USER_FIELD_LEN {
        return Err(IpmiError::InvalidArgument(format!(
            "{field} is {} bytes, at most {USER_FIELD_LEN} are supported",
            value.len()
        )));
    }
    let mut padded = [0u8; USER_FIELD_LEN];
    padded[..value.len()].copy_from_slice(value);
    Ok(padded)
}

/// User table summary decoded from a Get User Access response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserSummary {
    /// Number of user slots on the channel
    pub max_users: u8,
    /// Number of enabled users
    pub enabled_users: u8,
    /// Number of slots with fixed names
    pub fixed_names: u8,
}

impl UserSummary {
    /// Decodes the first three bytes of the response
    pub fn decode(data: &[u8]) -> Result<Self, IpmiError> {
        if data.len() < 3 {
            return Err(IpmiError::Malformed(format!(
                "user summary needs 3 bytes, got {}",
                data.len()
            )));
        }
        // Only bits [4:0] carry the user count
        Ok(Self {
            max_users: data[0] & 0x1F,
            enabled_users: data[1] & 0x3F,
            fixed_names: data[2] & 0x3F,
        })
    }
}

/// Decodes a Get User Name response into the stored name
pub fn decode_user_name(data: &[u8]) -> Result<String, IpmiError> {
    if data.len() > USER_FIELD_LEN {
        return Err(IpmiError::Malformed(format!(
            "user name field is {} bytes",
            data.len()
        )));
    }
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    Ok(String::from_utf8_lossy(&data[..end]).into_owned())
}

/// Strips the parameter revision byte from a LAN configuration response
pub fn decode_lan_param(param: LanParam, data: &[u8]) -> Result<&[u8], IpmiError> {
    match data.split_first() {
        Some((_revision, value)) => Ok(value),
        None => Err(IpmiError::Malformed(format!(
            "empty response for LAN parameter {}",
            param.name()
        ))),
    }
}
