//! Agent RPC messages and errors.
//!
//! Every method is a `POST` of a JSON request body to
//! `/agent.AgentService/<Method>`; the response is a JSON body or an error
//! object `{code, message}`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use host_client::HostError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Fully qualified method names, also the route paths
pub mod method {
    /// Liveness check
    pub const HELLO: &str = "/agent.AgentService/Hello";
    /// Power management readout
    pub const GET_POWER_MANAGEMENT: &str = "/agent.AgentService/GetPowerManagement";
    /// BMC account provisioning
    pub const SET_POWER_MANAGEMENT: &str = "/agent.AgentService/SetPowerManagement";
    /// Host power cycle
    pub const REBOOT: &str = "/agent.AgentService/Reboot";
    /// Batched disk wipe
    pub const WIPE_DISKS: &str = "/agent.AgentService/WipeDisks";
}

/// Hello request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloRequest {}

/// Hello response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloResponse {}

/// IPMI part of a power management query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpmiQuery {
    /// User whose presence in the BMC user table is reported back
    #[serde(default)]
    pub check_username: String,
}

/// GetPowerManagement request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPowerManagementRequest {
    /// BMC query, absent in test mode
    #[serde(default)]
    pub ipmi: Option<IpmiQuery>,
}

/// Power is managed through an external API (test mode)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiPowerManagement {}

/// Power is managed through the BMC
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpmiPowerManagement {
    /// BMC LAN IPv4 address
    pub address: String,
    /// BMC LAN port
    pub port: u32,
    /// Whether the queried user is present in the BMC user table
    pub user_exists: bool,
}

/// GetPowerManagement response; exactly one of `api` and `ipmi` is set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPowerManagementResponse {
    /// Set in test mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<ApiPowerManagement>,
    /// Set when the BMC manages power
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ipmi: Option<IpmiPowerManagement>,
}

/// BMC credentials to provision
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpmiCredentials {
    /// BMC user name, at most 16 bytes
    #[serde(default)]
    pub username: String,
    /// BMC password, at most 16 bytes
    #[serde(default)]
    pub password: String,
}

impl fmt::Debug for IpmiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IpmiCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// SetPowerManagement request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetPowerManagementRequest {
    /// Account to provision, ignored in test mode
    #[serde(default)]
    pub ipmi: Option<IpmiCredentials>,
}

/// SetPowerManagement response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetPowerManagementResponse {}

/// Reboot request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebootRequest {}

/// Reboot response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebootResponse {}

/// WipeDisks request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WipeDisksRequest {
    /// Overwrite with zeroes instead of a fast wipe
    #[serde(default)]
    pub zeroes: bool,
}

/// WipeDisks response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WipeDisksResponse {}

/// Error returned to an RPC caller
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    /// The operation failed
    #[error("{0}")]
    Internal(String),

    /// A downstream dependency could not be reached
    #[error("{0}")]
    Unavailable(String),

    /// The request was rejected as malformed
    #[error("{0}")]
    InvalidArgument(String),

    /// A downstream resource does not exist
    #[error("{0}")]
    NotFound(String),

    /// The caller's deadline passed before the operation finished
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// The caller went away before the operation finished
    #[error("call cancelled")]
    Cancelled,
}

impl RpcError {
    /// Wire code of the error
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            RpcError::Internal(_) => "internal",
            RpcError::Unavailable(_) => "unavailable",
            RpcError::InvalidArgument(_) => "invalid_argument",
            RpcError::NotFound(_) => "not_found",
            RpcError::DeadlineExceeded => "deadline_exceeded",
            RpcError::Cancelled => "cancelled",
        }
    }

    /// Prefixes the message with the step that failed, keeping the code
    #[must_use]
    pub fn context(self, step: &str) -> Self {
        match self {
            RpcError::Internal(message) => RpcError::Internal(format!("{step}: {message}")),
            RpcError::Unavailable(message) => RpcError::Unavailable(format!("{step}: {message}")),
            RpcError::InvalidArgument(message) => {
                RpcError::InvalidArgument(format!("{step}: {message}"))
            }
            RpcError::NotFound(message) => RpcError::NotFound(format!("{step}: {message}")),
            RpcError::DeadlineExceeded => RpcError::DeadlineExceeded,
            RpcError::Cancelled => RpcError::Cancelled,
        }
    }

    /// HTTP status the error is served with
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            RpcError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RpcError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            RpcError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            RpcError::NotFound(_) => StatusCode::NOT_FOUND,
            RpcError::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
            // Client Closed Request
            RpcError::Cancelled => {
                StatusCode::from_u16(499).unwrap_or(StatusCode::SERVICE_UNAVAILABLE)
            }
        }
    }
}

impl From<HostError> for RpcError {
    fn from(err: HostError) -> Self {
        if err.is_unavailable() {
            return RpcError::Unavailable(err.to_string());
        }
        match err {
            HostError::Api {
                status: 400, message, ..
            } => RpcError::InvalidArgument(message),
            HostError::Api {
                status: 404, message, ..
            } => RpcError::NotFound(message),
            HostError::Api { message, .. } => RpcError::Internal(message),
            other => RpcError::Internal(other.to_string()),
        }
    }
}

/// Error body sent to the caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Wire code, see [`RpcError::code`]
    pub code: String,
    /// Human-readable message
    pub message: String,
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_is_redacted_in_debug() {
        let request = SetPowerManagementRequest {
            ipmi: Some(IpmiCredentials {
                username: "metal".to_string(),
                password: "hunter2".to_string(),
            }),
        };
        let debug = format!("{request:?}");
        assert!(debug.contains("metal"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_get_power_management_response_wire_format() {
        let response = GetPowerManagementResponse {
            api: None,
            ipmi: Some(IpmiPowerManagement {
                address: "192.168.1.50".to_string(),
                port: 623,
                user_exists: true,
            }),
        };
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            serde_json::json!({"ipmi": {"address": "192.168.1.50", "port": 623, "userExists": true}})
        );

        let test_mode = GetPowerManagementResponse {
            api: Some(ApiPowerManagement {}),
            ipmi: None,
        };
        assert_eq!(
            serde_json::to_value(&test_mode).unwrap(),
            serde_json::json!({"api": {}})
        );
    }

    #[test]
    fn test_request_accepts_missing_fields() {
        let request: GetPowerManagementRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(request.ipmi, None);
        let request: WipeDisksRequest = serde_json::from_str("{}").unwrap();
        assert!(!request.zeroes);
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(RpcError::Internal(String::new()).status(), 500);
        assert_eq!(RpcError::Unavailable(String::new()).status(), 503);
        assert_eq!(RpcError::DeadlineExceeded.status(), 504);
        assert_eq!(RpcError::Cancelled.status().as_u16(), 499);
        assert_eq!(RpcError::Cancelled.code(), "cancelled");
    }

    #[test]
    fn test_host_error_keeps_downstream_message() {
        let err = RpcError::from(HostError::Api {
            method: "POST",
            path: "/v1/reboot".to_string(),
            status: 409,
            message: "reboot already in progress".to_string(),
        });
        assert_eq!(err, RpcError::Internal("reboot already in progress".to_string()));

        let err = RpcError::from(HostError::Unavailable("connection refused".to_string()));
        assert_eq!(err.code(), "unavailable");
    }

    #[test]
    fn test_context_keeps_code() {
        let err = RpcError::NotFound("no such disk".to_string()).context("failed to wipe disks");
        assert_eq!(err, RpcError::NotFound("failed to wipe disks: no such disk".to_string()));
        assert_eq!(RpcError::Cancelled.context("failed to wipe disks"), RpcError::Cancelled);
    }
}
