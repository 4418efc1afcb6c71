//! Typed IPMI client
//!
//! Wraps an open [`BmcChannel`] with one method per supported command.

use crate::channel::{BmcChannel, BmcConnector};
use crate::command::{
    LanParam, PRIMARY_CHANNEL, Request, UserAccess, UserSummary, decode_lan_param,
    decode_user_name,
};
use crate::error::IpmiError;

/// IPMI client over a single open channel
pub struct IpmiClient {
    channel: Box<dyn BmcChannel>,
}

impl std::fmt::Debug for IpmiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpmiClient").finish_non_exhaustive()
    }
}

impl IpmiClient {
    /// Wrap an already open channel
    pub fn new(channel: Box<dyn BmcChannel>) -> Self {
        Self { channel }
    }

    /// Open a fresh channel through `connector`
    pub async fn connect(connector: &dyn BmcConnector) -> Result<Self, IpmiError> {
        Ok(Self::new(connector.open().await?))
    }

    /// Close the underlying channel
    pub async fn close(mut self) -> Result<(), IpmiError> {
        self.channel.close().await
    }

    /// Read the user table summary of the primary channel
    pub async fn user_summary(&mut self) -> Result<UserSummary, IpmiError> {
        let data = self
            .channel
            .send(&Request::user_summary(PRIMARY_CHANNEL))
            .await?;
        UserSummary::decode(&data)
    }

    /// Read the name stored in `slot`
    ///
    /// A failure here does not necessarily mean the BMC is broken: several
    /// firmwares answer unused slots with an error instead of an empty name.
    pub async fn user_name(&mut self, slot: u8) -> Result<String, IpmiError> {
        let data = self.channel.send(&Request::get_user_name(slot)).await?;
        decode_user_name(&data)
    }

    /// Writes the name of `slot`
    pub async fn set_user_name(&mut self, slot: u8, name: &str) -> Result<(), IpmiError> {
        self.channel
            .send(&Request::set_user_name(slot, name)?)
            .await
            .map(drop)
    }

    /// Writes the password of `slot`
    pub async fn set_user_password(&mut self, slot: u8, password: &str) -> Result<(), IpmiError> {
        self.channel
            .send(&Request::set_user_password(slot, password)?)
            .await
            .map(drop)
    }

    /// Writes the channel access settings of `slot`
    pub async fn set_user_access(&mut self, slot: u8, access: &UserAccess) -> Result<(), IpmiError> {
        self.channel
            .send(&Request::set_user_access(slot, access))
            .await
            .map(drop)
    }

    /// Enables the user in `slot`
    pub async fn enable_user(&mut self, slot: u8) -> Result<(), IpmiError> {
        self.channel
            .send(&Request::enable_user(slot))
            .await
            .map(drop)
    }

    /// Read a LAN configuration parameter of the primary channel, revision byte stripped
    pub async fn lan_config(&mut self, param: LanParam) -> Result<Vec<u8>, IpmiError> {
        let data = self
            .channel
            .send(&Request::lan_config(PRIMARY_CHANNEL, param))
            .await?;
        decode_lan_param(param, &data).map(<[u8]>::to_vec)
    }
}
