//! BMC user directory provisioning
//!
//! Claims and configures a dedicated administrator account in the BMC user
//! table. The table is a fixed array of slots; slot 1 holds the default,
//! unnamed administrator and is never claimed.
//!
//! BMC firmwares disagree on how an unused slot is reported: some answer
//! Get User Name with an empty name (or the literal `(Empty User)`), others
//! fail the command. A failed query is therefore kept as a third state and
//! treated as the weakest availability hint: an exact name match anywhere in
//! the table always wins over an earlier empty or unresolvable slot.

use crate::client::IpmiClient;
use crate::command::{Privilege, USER_FIELD_LEN, UserAccess};
use crate::error::IpmiError;
use std::ops::ControlFlow;
use tracing::{debug, info};

/// Slot of the default administrator, never claimed
pub const RESERVED_SLOT: u8 = 1;

/// Placeholder name some firmwares report for unused slots
pub const EMPTY_USER_PLACEHOLDER: &str = "(Empty User)";

/// What a Get User Name query revealed about a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// The slot holds a named user
    Occupied,
    /// The slot answered with an empty name
    Empty,
    /// The query failed; the slot may be unused
    Unresolvable,
}

/// One entry of the BMC user table as observed during a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSlot {
    /// Slot number, 1-based
    pub id: u8,
    /// Reported name, empty unless the slot is occupied
    pub username: String,
    /// How the slot answered
    pub state: SlotState,
}

impl UserSlot {
    /// Classifies the outcome of a Get User Name query
    pub fn from_query(id: u8, result: Result<String, IpmiError>) -> Self {
        match result {
            Ok(name) if is_empty_name(&name) => Self {
                id,
                username: String::new(),
                state: SlotState::Empty,
            },
            Ok(name) => Self {
                id,
                username: name,
                state: SlotState::Occupied,
            },
            Err(err) => {
                debug!(slot = id, error = %err, "user name query failed, slot may be unused");
                Self {
                    id,
                    username: String::new(),
                    state: SlotState::Unresolvable,
                }
            }
        }
    }

    fn is_named(&self, username: &str) -> bool {
        self.state == SlotState::Occupied && self.username == username
    }
}

fn is_empty_name(name: &str) -> bool {
    let trimmed = name.trim();
    trimmed.is_empty() || trimmed == EMPTY_USER_PLACEHOLDER
}

/// Slot chosen for the managed account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// The account already lives in this slot
    Existing(u8),
    /// The account will be created in this slot
    Fresh(u8),
}

impl Target {
    /// Slot number of the target
    #[must_use]
    pub fn slot(self) -> u8 {
        match self {
            Target::Existing(slot) | Target::Fresh(slot) => slot,
        }
    }
}

/// Accumulates scan observations and applies the slot precedence rules
#[derive(Debug, Default)]
pub struct SlotScan {
    existing: Option<u8>,
    candidate: Option<u8>,
}

impl SlotScan {
    /// Records one slot; breaks once the account itself has been found
    pub fn observe(&mut self, slot: &UserSlot, username: &str) -> ControlFlow<()> {
        if slot.id == RESERVED_SLOT {
            return ControlFlow::Continue(());
        }
        if slot.is_named(username) {
            self.existing = Some(slot.id);
            return ControlFlow::Break(());
        }
        if slot.state != SlotState::Occupied && self.candidate.is_none() {
            self.candidate = Some(slot.id);
        }
        ControlFlow::Continue(())
    }

    /// The target slot, if any
    #[must_use]
    pub fn target(&self) -> Option<Target> {
        self.existing
            .map(Target::Existing)
            .or(self.candidate.map(Target::Fresh))
    }
}

/// The account owned by the agent on the BMC
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedAccount {
    /// Slot holding the account
    pub slot: u8,
    /// Account name
    pub username: String,
    /// Privilege limit granted on the channel
    pub privilege: Privilege,
    /// 0 means unlimited
    pub session_limit: u8,
    /// Always true once provisioned
    pub enabled: bool,
    /// Whether the account was created by this call
    pub created: bool,
}

/// Makes sure `username` exists, has `password`, is enabled and is an administrator
///
/// Every write is idempotent for a given target slot, so a failed call can
/// simply be retried. Partial writes are not rolled back.
pub async fn ensure_account(
    client: &mut IpmiClient,
    username: &str,
    password: &str,
) -> Result<ManagedAccount, IpmiError> {
    validate_field("user name", username)?;
    validate_field("password", password)?;
    if username.is_empty() {
        return Err(IpmiError::InvalidArgument("user name is empty".to_string()));
    }

    let summary = client.user_summary().await?;

    let mut scan = SlotScan::default();
    for id in (RESERVED_SLOT + 1)..=summary.max_users {
        let slot = UserSlot::from_query(id, client.user_name(id).await);
        if slot.state == SlotState::Empty {
            debug!(slot = id, "found empty user slot");
        }
        if scan.observe(&slot, username).is_break() {
            info!(slot = id, "user already present in slot, claiming it");
            break;
        }
    }

    let target = scan
        .target()
        .ok_or_else(|| IpmiError::NoAvailableSlot(username.to_string()))?;
    let slot = target.slot();

    if let Target::Fresh(slot) = target {
        info!(slot, "adding user to slot");
        client
            .set_user_name(slot, username)
            .await
            .map_err(|e| e.in_step("set user name", slot))?;
    }

    client
        .set_user_password(slot, password)
        .await
        .map_err(|e| e.in_step("set user password", slot))?;

    let access = UserAccess::administrator();
    client
        .set_user_access(slot, &access)
        .await
        .map_err(|e| e.in_step("set user access", slot))?;

    client
        .enable_user(slot)
        .await
        .map_err(|e| e.in_step("enable user", slot))?;

    info!(slot, privilege = %access.privilege, "BMC user provisioned");

    Ok(ManagedAccount {
        slot,
        username: username.to_string(),
        privilege: access.privilege,
        session_limit: access.session_limit,
        enabled: true,
        created: matches!(target, Target::Fresh(_)),
    })
}

/// Checks whether any slot, including the reserved one, holds `username`
///
/// Per-slot query failures are read as "not here"; only the summary read is fatal.
pub async fn account_exists(client: &mut IpmiClient, username: &str) -> Result<bool, IpmiError> {
    // Unused slots report an empty name, so an empty name is never matched
    if username.is_empty() {
        return Ok(false);
    }

    let summary = client.user_summary().await?;

    for id in RESERVED_SLOT..=summary.max_users {
        let slot = UserSlot::from_query(id, client.user_name(id).await);
        if slot.is_named(username) {
            return Ok(true);
        }
    }

    Ok(false)
}

fn validate_field(field: &str, value: &str) -> Result<(), IpmiError> {
    if value.len() > USER_FIELD_LEN {
        return Err(IpmiError::InvalidArgument(format!(
            "{field} must be at most {USER_FIELD_LEN} bytes"
        )));
    }
    Ok(())
}
