//! Host discovery.
//!
//! The engine talks to discovery through two seams:
//! - [`ScanExecutor`] enumerates live hosts on a subnet (nmap, or a ping
//!   sweep combined with the ARP table)
//! - [`HostnameResolver`] turns an address into a display name
//!
//! Both shell out to system tools and may block for as long as those take.

mod arp;
pub mod interfaces;
mod nmap;
pub mod oui;
mod ping;
pub mod privileges;
mod resolve;

pub use interfaces::{derive_subnet, local_subnets, InterfaceAddr};
pub use nmap::NmapExecutor;
pub use ping::SweepExecutor;
pub use resolve::{HostnameResolver, SystemResolver};

use crate::error::ScanError;
use async_trait::async_trait;
use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};
use std::process::Command;
use std::sync::Arc;

/// Display name used until a hostname lookup succeeds.
pub const UNRESOLVED_NAME: &str = "unknown";

#[cfg(target_os = "windows")]
const CREATE_NO_WINDOW: u32 = 0x08000000;

/// Create a Command that hides the console window on Windows.
pub(crate) fn hidden_command(program: &str) -> Command {
    let mut cmd = Command::new(program);
    #[cfg(target_os = "windows")]
    {
        use std::os::windows::process::CommandExt;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    cmd
}

/// Async counterpart of [`hidden_command`]. The child is killed when the
/// returned command's future is dropped, so a timed-out caller leaves no
/// process behind.
pub(crate) fn async_command(program: &str) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.kill_on_drop(true);
    #[cfg(target_os = "windows")]
    cmd.creation_flags(CREATE_NO_WINDOW);
    cmd
}

/// Run a system tool and return its stdout.
pub(crate) async fn run_tool(tool: &'static str, args: Vec<String>) -> Result<String, ScanError> {
    let output = async_command(tool)
        .args(&args)
        .output()
        .await
        .map_err(|source| ScanError::Spawn { tool, source })?;

    if !output.status.success() {
        return Err(ScanError::ToolFailed {
            tool,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Reachability reported by a scan backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostState {
    Up,
    Down,
}

/// A host reported by a [`ScanExecutor`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredHost {
    pub address: String,
    pub state: HostState,
    /// Best effort; usually only present for hosts on the local segment
    pub mac: Option<String>,
}

impl DiscoveredHost {
    pub fn up(address: impl Into<String>, mac: Option<String>) -> Self {
        Self {
            address: address.into(),
            state: HostState::Up,
            mac,
        }
    }
}

/// Enumerates live hosts on a subnet.
#[async_trait]
pub trait ScanExecutor: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn scan(&self, subnet: &Ipv4Network) -> Result<Vec<DiscoveredHost>, ScanError>;
}

/// Which discovery backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanBackend {
    /// `nmap -sn` host discovery
    #[default]
    Nmap,
    /// System `ping` sweep plus the ARP cache
    #[serde(alias = "ping")]
    Sweep,
}

impl std::fmt::Display for ScanBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanBackend::Nmap => write!(f, "nmap"),
            ScanBackend::Sweep => write!(f, "sweep"),
        }
    }
}

impl std::str::FromStr for ScanBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nmap" => Ok(ScanBackend::Nmap),
            "sweep" | "ping" => Ok(ScanBackend::Sweep),
            other => Err(format!("unknown scan backend '{}'", other)),
        }
    }
}

impl ScanBackend {
    pub fn executor(self) -> Arc<dyn ScanExecutor> {
        match self {
            ScanBackend::Nmap => Arc::new(NmapExecutor::new()),
            ScanBackend::Sweep => Arc::new(SweepExecutor::new()),
        }
    }
}
