//! Mock BMC for unit testing
//!
//! This module provides an in-memory BMC that answers the raw IPMI requests
//! the client issues, so provisioning and LAN readout can be tested without
//! hardware.

use crate::channel::{BmcChannel, BmcConnector};
use crate::command::{
    CMD_GET_LAN_CONFIG, CMD_GET_USER_ACCESS, CMD_GET_USER_NAME, CMD_SET_USER_ACCESS,
    CMD_SET_USER_NAME, CMD_SET_USER_PASSWORD, LanParam, NetFn, PASSWORD_OP_DISABLE,
    PASSWORD_OP_ENABLE, PASSWORD_OP_SET, Privilege, Request, USER_FIELD_LEN,
};
use crate::error::IpmiError;
use crate::users::EMPTY_USER_PLACEHOLDER;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Completion code answered for slots the mock knows nothing about
pub const CC_INVALID_DATA_FIELD: u8 = 0xCC;
/// Completion code answered for commands configured to fail
pub const CC_UNSPECIFIED: u8 = 0xFF;
/// Completion code answered for LAN parameters that are not configured
pub const CC_PARAM_NOT_SUPPORTED: u8 = 0x80;

/// One user table entry of the mock BMC
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockUser {
    /// User name, empty for an unused slot
    pub name: String,
    /// Last password written
    pub password: String,
    /// Whether the user was enabled
    pub enabled: bool,
    /// Privilege from the last Set User Access
    pub privilege: Option<Privilege>,
    /// IPMI messaging bit from the last Set User Access
    pub ipmi_messaging: bool,
    /// Session limit from the last Set User Access
    pub session_limit: u8,
}

#[derive(Debug, Default)]
struct State {
    max_users: u8,
    users: HashMap<u8, MockUser>,
    lan: Option<(Ipv4Addr, u16)>,
    failing: HashSet<u8>,
    fail_open: bool,
    latency: Duration,
    opens: usize,
    closes: usize,
    writes: usize,
    name_writes: usize,
}

/// Mock BMC for testing
///
/// Slots that were never configured answer Get User Name with a completion
/// code, like firmwares that reject queries for unused slots. Clones share
/// the same state.
#[derive(Debug, Clone)]
pub struct MockBmc {
    state: Arc<Mutex<State>>,
}

impl MockBmc {
    /// Create a BMC with a user table of `max_users` slots
    pub fn new(max_users: u8) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                max_users,
                ..State::default()
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_name(self, slot: u8, name: &str) -> Self {
        self.state().users.insert(
            slot,
            MockUser {
                name: name.to_string(),
                ..MockUser::default()
            },
        );
        self
    }

    /// Store a named user in `slot`
    #[must_use]
    pub fn with_user(self, slot: u8, name: &str) -> Self {
        self.with_name(slot, name)
    }

    /// Make `slot` answer with an all-NUL name
    #[must_use]
    pub fn with_empty_name(self, slot: u8) -> Self {
        self.with_name(slot, "")
    }

    /// Make `slot` answer with the `(Empty User)` placeholder
    #[must_use]
    pub fn with_placeholder_name(self, slot: u8) -> Self {
        self.with_name(slot, EMPTY_USER_PLACEHOLDER)
    }

    /// Configure the LAN parameters
    #[must_use]
    pub fn with_lan(self, ip: Ipv4Addr, port: u16) -> Self {
        self.state().lan = Some((ip, port));
        self
    }

    /// Delay every response by `latency`
    #[must_use]
    pub fn with_latency(self, latency: Duration) -> Self {
        self.state().latency = latency;
        self
    }

    /// Make every request with command code `cmd` fail
    #[must_use]
    pub fn fail_command(self, cmd: u8) -> Self {
        self.state().failing.insert(cmd);
        self
    }

    /// Make opening a channel fail
    #[must_use]
    pub fn fail_open(self) -> Self {
        self.state().fail_open = true;
        self
    }

    /// Snapshot of the user stored in `slot`
    pub fn user(&self, slot: u8) -> Option<MockUser> {
        self.state().users.get(&slot).cloned()
    }

    /// Number of channels opened so far
    pub fn opens(&self) -> usize {
        self.state().opens
    }

    /// Number of channels closed so far
    pub fn closes(&self) -> usize {
        self.state().closes
    }

    /// Number of user table writes so far
    pub fn writes(&self) -> usize {
        self.state().writes
    }

    /// Number of Set User Name requests so far
    pub fn name_writes(&self) -> usize {
        self.state().name_writes
    }

    fn handle(&self, request: &Request) -> Result<Vec<u8>, IpmiError> {
        let mut state = self.state();
        let reject = |code| IpmiError::Completion {
            net_fn: request.net_fn,
            cmd: request.cmd,
            code,
        };

        if state.failing.contains(&request.cmd) {
            return Err(reject(CC_UNSPECIFIED));
        }
        let data = request.data.as_slice();

        match (request.net_fn, request.cmd) {
            (NetFn::App, CMD_GET_USER_ACCESS) => {
                let enabled = state.users.values().filter(|u| u.enabled).count();
                let enabled = u8::try_from(enabled).unwrap_or(u8::MAX) & 0x3F;
                Ok(vec![0xC0 | state.max_users, enabled, 0x01, 0x34])
            }
            (NetFn::App, CMD_GET_USER_NAME) => {
                let slot = *data.first().ok_or_else(|| reject(CC_INVALID_DATA_FIELD))?;
                let user = state
                    .users
                    .get(&slot)
                    .ok_or_else(|| reject(CC_INVALID_DATA_FIELD))?;
                let mut raw = vec![0u8; USER_FIELD_LEN];
                let name = user.name.as_bytes();
                raw[..name.len()].copy_from_slice(name);
                Ok(raw)
            }
            (NetFn::App, CMD_SET_USER_NAME) => {
                let slot = *data.first().ok_or_else(|| reject(CC_INVALID_DATA_FIELD))?;
                let name = field(&data[1..]);
                state.writes += 1;
                state.name_writes += 1;
                state.users.entry(slot).or_default().name = name;
                Ok(Vec::new())
            }
            (NetFn::App, CMD_SET_USER_PASSWORD) => {
                let (&slot, rest) = data
                    .split_first()
                    .ok_or_else(|| reject(CC_INVALID_DATA_FIELD))?;
                let (&op, rest) = rest
                    .split_first()
                    .ok_or_else(|| reject(CC_INVALID_DATA_FIELD))?;
                state.writes += 1;
                let user = state.users.entry(slot).or_default();
                match op & 0x03 {
                    PASSWORD_OP_SET => user.password = field(rest),
                    PASSWORD_OP_ENABLE => user.enabled = true,
                    PASSWORD_OP_DISABLE => user.enabled = false,
                    _ => return Err(reject(CC_INVALID_DATA_FIELD)),
                }
                Ok(Vec::new())
            }
            (NetFn::App, CMD_SET_USER_ACCESS) => {
                let [options, slot, privilege, session_limit] = data else {
                    return Err(reject(CC_INVALID_DATA_FIELD));
                };
                state.writes += 1;
                let user = state.users.entry(*slot).or_default();
                user.ipmi_messaging = options & 0x10 != 0;
                user.privilege = Some(Privilege::from_bits(*privilege));
                user.session_limit = *session_limit;
                Ok(Vec::new())
            }
            (NetFn::Transport, CMD_GET_LAN_CONFIG) => {
                let (ip, port) = state.lan.ok_or_else(|| reject(CC_PARAM_NOT_SUPPORTED))?;
                let param = data.get(1).copied();
                if param == Some(LanParam::IpAddress as u8) {
                    let mut out = vec![0x11];
                    out.extend_from_slice(&ip.octets());
                    Ok(out)
                } else if param == Some(LanParam::PrimaryRmcpPort as u8) {
                    let mut out = vec![0x11];
                    out.extend_from_slice(&port.to_le_bytes());
                    Ok(out)
                } else {
                    Err(reject(CC_PARAM_NOT_SUPPORTED))
                }
            }
            _ => Err(reject(0xC1)),
        }
    }
}

fn field(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}

#[async_trait]
impl BmcConnector for MockBmc {
    async fn open(&self) -> Result<Box<dyn BmcChannel>, IpmiError> {
        let mut state = self.state();
        if state.fail_open {
            return Err(IpmiError::Unavailable("mock BMC refused to open".to_string()));
        }
        state.opens += 1;
        Ok(Box::new(MockChannel {
            bmc: self.clone(),
            closed: false,
        }))
    }
}

/// Channel handed out by [`MockBmc`]
#[derive(Debug)]
pub struct MockChannel {
    bmc: MockBmc,
    closed: bool,
}

#[async_trait]
impl BmcChannel for MockChannel {
    async fn send(&mut self, request: &Request) -> Result<Vec<u8>, IpmiError> {
        if self.closed {
            return Err(IpmiError::Closed);
        }
        let latency = self.bmc.state().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        self.bmc.handle(request)
    }

    async fn close(&mut self) -> Result<(), IpmiError> {
        if !self.closed {
            self.closed = true;
            self.bmc.state().closes += 1;
        }
        Ok(())
    }
}
