//! BMC command channel
//!
//! A channel carries one raw IPMI request to the BMC and returns the raw
//! response payload. Channels are opened per operation through a
//! [`BmcConnector`] and must be closed by the caller when done.
//!
//! The concrete channel drives the in-host BMC through the kernel IPMI
//! device using `ipmitool -I open raw`.

use crate::command::Request;
use crate::error::IpmiError;
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

/// Device nodes exposed by the kernel IPMI driver
pub const DEVICE_PATHS: &[&str] = &["/dev/ipmi0", "/dev/ipmi/0", "/dev/ipmidev/0"];

/// One open request/response channel to the BMC
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait]
pub trait BmcChannel: Send {
    /// Sends a request and returns the response payload without the completion code
    async fn send(&mut self, request: &Request) -> Result<Vec<u8>, IpmiError>;

    /// Releases the channel; further sends fail with [`IpmiError::Closed`]
    async fn close(&mut self) -> Result<(), IpmiError>;
}

/// Opens fresh channels to the local BMC
#[async_trait]
pub trait BmcConnector: Send + Sync {
    async fn open(&self) -> Result<Box<dyn BmcChannel>, IpmiError>;
}

/// Connector for the local BMC driven through `ipmitool`
#[derive(Debug, Clone)]
pub struct IpmitoolConnector {
    program: PathBuf,
    device_paths: Vec<PathBuf>,
}

impl IpmitoolConnector {
    /// Create a connector that runs `program` against the local IPMI device
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            device_paths: DEVICE_PATHS.iter().map(PathBuf::from).collect(),
        }
    }

    async fn device_present(&self) -> bool {
        for path in &self.device_paths {
            if tokio::fs::try_exists(path).await.unwrap_or(false) {
                return true;
            }
        }
        false
    }
}

#[async_trait]
impl BmcConnector for IpmitoolConnector {
    async fn open(&self) -> Result<Box<dyn BmcChannel>, IpmiError> {
        if !self.device_present().await {
            return Err(IpmiError::Unavailable(format!(
                "no local IPMI device found (looked for {})",
                DEVICE_PATHS.join(", ")
            )));
        }
        Ok(Box::new(IpmitoolChannel {
            program: self.program.clone(),
            closed: false,
        }))
    }
}

/// Channel that issues each request as one `ipmitool raw` invocation
#[derive(Debug)]
pub struct IpmitoolChannel {
    program: PathBuf,
    closed: bool,
}

impl IpmitoolChannel {
    fn raw_args(request: &Request) -> Vec<String> {
        let mut args = vec![
            "-I".to_string(),
            "open".to_string(),
            "raw".to_string(),
            format!("0x{:02x}", request.net_fn.code()),
            format!("0x{:02x}", request.cmd),
        ];
        args.extend(request.data.iter().map(|b| format!("0x{b:02x}")));
        args
    }
}

#[async_trait]
impl BmcChannel for IpmitoolChannel {
    async fn send(&mut self, request: &Request) -> Result<Vec<u8>, IpmiError> {
        if self.closed {
            return Err(IpmiError::Closed);
        }

        // Payload bytes may carry a password, only log the header
        debug!(
            net_fn = %request.net_fn,
            cmd = request.cmd,
            "sending raw IPMI request"
        );

        let output = Command::new(&self.program)
            .args(Self::raw_args(request))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                IpmiError::Unavailable(format!(
                    "failed to run {}: {e}",
                    self.program.display()
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(match parse_completion_code(&stderr) {
                Some(code) => IpmiError::Completion {
                    net_fn: request.net_fn,
                    cmd: request.cmd,
                    code,
                },
                None => IpmiError::CommandFailed(stderr.trim().to_string()),
            });
        }

        parse_raw_output(&String::from_utf8_lossy(&output.stdout))
    }

    async fn close(&mut self) -> Result<(), IpmiError> {
        self.closed = true;
        Ok(())
    }
}

/// Parses the hex byte dump printed by `ipmitool raw`
pub fn parse_raw_output(stdout: &str) -> Result<Vec<u8>, IpmiError> {
    stdout
        .split_whitespace()
        .map(|token| {
            let digits = token.trim_start_matches("0x");
            u8::from_str_radix(digits, 16)
                .map_err(|e| IpmiError::Malformed(format!("unexpected byte {token:?}: {e}")))
        })
        .collect()
}

/// Extracts the completion code from an `ipmitool` failure message
///
/// `Unable to send RAW command (channel=0x0 netfn=0x6 lun=0x0 cmd=0x46 rsp=0xcc): ...`
pub fn parse_completion_code(stderr: &str) -> Option<u8> {
    let start = stderr.find("rsp=0x")? + "rsp=0x".len();
    let digits: String = stderr[start..]
        .chars()
        .take_while(char::is_ascii_hexdigit)
        .collect();
    u8::from_str_radix(&digits, 16).ok()
}
