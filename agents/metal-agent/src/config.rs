//! Agent configuration.
//!
//! Settings come from the kernel command line of the booted host and can be
//! overridden by command-line flags (which also read `METAL_AGENT_*`
//! environment variables).

use crate::error::AgentError;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

/// Kernel argument carrying the provider address
pub const PROVIDER_ADDRESS_KERNEL_ARG: &str = "metal.provider.address";

/// Kernel argument carrying the test mode flag
pub const TEST_MODE_KERNEL_ARG: &str = "metal.provider.test.mode";

const KERNEL_CMDLINE_PATH: &str = "/proc/cmdline";

/// Command-line flags
#[derive(Debug, Parser)]
#[command(name = "metal-agent")]
#[command(about = "Bare-metal host agent for power management, reboot and disk wipe")]
#[command(version)]
pub struct Args {
    /// Provider address to connect to. Defaults to the `metal.provider.address` kernel argument
    #[arg(long, env = "METAL_AGENT_PROVIDER_ADDRESS")]
    pub provider_address: Option<String>,

    /// Enable test mode: power management is done through an external API, the BMC is never touched
    #[arg(
        long,
        env = "METAL_AGENT_TEST_MODE",
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    pub test_mode: Option<bool>,

    /// Enable debug logs
    #[arg(long, env = "METAL_AGENT_DEBUG")]
    pub debug: bool,

    /// Base URL of the host control plane
    #[arg(long, env = "METAL_AGENT_HOST_API_URL", default_value = "http://127.0.0.1:50001")]
    pub host_api_url: String,

    /// Path to the ipmitool binary
    #[arg(long = "ipmitool", env = "METAL_AGENT_IPMITOOL", default_value = "ipmitool")]
    pub ipmitool_path: PathBuf,

    /// Default per-call timeout in seconds when the caller sends none
    #[arg(long, env = "METAL_AGENT_REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: Option<u64>,
}

/// Settings read from the kernel command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KernelArgs {
    /// `metal.provider.address`
    pub provider_address: Option<String>,
    /// `metal.provider.test.mode`
    pub test_mode: Option<bool>,
}

impl KernelArgs {
    /// Parses `key=value` pairs; the first occurrence of a key wins
    pub fn parse(cmdline: &str) -> Self {
        let mut args = Self::default();

        for (key, value) in cmdline
            .split_whitespace()
            .filter_map(|param| param.split_once('='))
        {
            let value = value.trim_matches('"');
            match key {
                PROVIDER_ADDRESS_KERNEL_ARG if args.provider_address.is_none() => {
                    args.provider_address = Some(value.to_string());
                }
                TEST_MODE_KERNEL_ARG if args.test_mode.is_none() => match parse_bool(value) {
                    Some(test_mode) => args.test_mode = Some(test_mode),
                    None => {
                        error!(key = TEST_MODE_KERNEL_ARG, value, "failed to parse test mode");
                        args.test_mode = Some(false);
                    }
                },
                _ => {}
            }
        }

        args
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

/// Effective agent configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Address the reverse tunnel dials
    pub provider_address: String,
    /// Power management through an external API, BMC untouched
    pub test_mode: bool,
    /// Debug logging requested
    pub debug: bool,
    /// Host control plane base URL
    pub host_api_url: String,
    /// ipmitool binary
    pub ipmitool_path: PathBuf,
    /// Deadline for calls that carry none
    pub request_timeout: Option<Duration>,
}

impl Config {
    /// Loads the kernel command line and merges the flags over it
    pub async fn load(args: Args) -> Result<Self, AgentError> {
        let cmdline = match tokio::fs::read_to_string(KERNEL_CMDLINE_PATH).await {
            Ok(cmdline) => cmdline,
            Err(e) => {
                warn!("Failed to read {}: {}", KERNEL_CMDLINE_PATH, e);
                String::new()
            }
        };
        Self::merge(args, KernelArgs::parse(&cmdline))
    }

    /// Flags take precedence over kernel arguments
    pub fn merge(args: Args, kernel: KernelArgs) -> Result<Self, AgentError> {
        let provider_address = args
            .provider_address
            .filter(|address| !address.is_empty())
            .or(kernel.provider_address)
            .filter(|address| !address.is_empty())
            .ok_or_else(|| {
                AgentError::InvalidConfig(format!(
                    "provider address is required: pass --provider-address or set the {PROVIDER_ADDRESS_KERNEL_ARG} kernel argument"
                ))
            })?;

        let config = Self {
            provider_address,
            test_mode: args.test_mode.or(kernel.test_mode).unwrap_or(false),
            debug: args.debug,
            host_api_url: args.host_api_url,
            ipmitool_path: args.ipmitool_path,
            request_timeout: args
                .request_timeout_secs
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        };

        info!("Configuration:");
        info!("  Provider address: {}", config.provider_address);
        info!("  Test mode: {}", config.test_mode);
        info!("  Debug: {}", config.debug);
        info!("  Host API URL: {}", config.host_api_url);

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["metal-agent"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_kernel_args_parse() {
        let kernel = KernelArgs::parse(
            "BOOT_IMAGE=/vmlinuz console=ttyS0 metal.provider.address=10.5.0.1:50042 metal.provider.test.mode=1\n",
        );
        assert_eq!(kernel.provider_address.as_deref(), Some("10.5.0.1:50042"));
        assert_eq!(kernel.test_mode, Some(true));
    }

    #[test]
    fn test_kernel_args_first_value_wins() {
        let kernel = KernelArgs::parse(
            "metal.provider.address=a:1 metal.provider.address=b:2",
        );
        assert_eq!(kernel.provider_address.as_deref(), Some("a:1"));
    }

    #[test]
    fn test_kernel_args_bad_bool_defaults_to_false() {
        let kernel = KernelArgs::parse("metal.provider.test.mode=maybe");
        assert_eq!(kernel.test_mode, Some(false));
    }

    #[test]
    fn test_flags_override_kernel_args() {
        let kernel = KernelArgs {
            provider_address: Some("kernel:1".to_string()),
            test_mode: Some(true),
        };
        let config = Config::merge(
            args(&["--provider-address", "flag:2", "--test-mode=false"]),
            kernel,
        )
        .unwrap();
        assert_eq!(config.provider_address, "flag:2");
        assert!(!config.test_mode);
    }

    #[test]
    fn test_kernel_args_used_when_flags_absent() {
        let kernel = KernelArgs {
            provider_address: Some("kernel:1".to_string()),
            test_mode: Some(true),
        };
        let config = Config::merge(args(&[]), kernel).unwrap();
        assert_eq!(config.provider_address, "kernel:1");
        assert!(config.test_mode);
        assert_eq!(config.ipmitool_path, PathBuf::from("ipmitool"));
        assert_eq!(config.request_timeout, None);
    }

    #[test]
    fn test_bare_test_mode_flag_enables() {
        let config = Config::merge(
            args(&["--provider-address", "p:1", "--test-mode"]),
            KernelArgs::default(),
        )
        .unwrap();
        assert!(config.test_mode);
    }

    #[test]
    fn test_missing_provider_address_is_an_error() {
        let err = Config::merge(args(&[]), KernelArgs::default()).unwrap_err();
        assert!(matches!(err, AgentError::InvalidConfig(_)));
    }

    #[test]
    fn test_request_timeout() {
        let config = Config::merge(
            args(&["--provider-address", "p:1", "--request-timeout-secs", "90"]),
            KernelArgs::default(),
        )
        .unwrap();
        assert_eq!(config.request_timeout, Some(Duration::from_secs(90)));
    }
}
