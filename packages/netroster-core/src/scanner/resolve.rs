//! Reverse hostname resolution

use super::async_command;
use async_trait::async_trait;
use std::time::Duration;

/// Turns an address into a display name.
///
/// Failure is not an error here: `None` means "keep whatever name the
/// device already has".
#[async_trait]
pub trait HostnameResolver: Send + Sync {
    async fn resolve(&self, address: &str) -> Option<String>;
}

/// Resolver backed by the system's own lookup tools.
///
/// Tries `getent hosts`, then `host`, then `avahi-resolve` on Linux; uses
/// `Resolve-DnsName` on Windows. Each lookup is cut off after `timeout`.
#[derive(Debug, Clone)]
pub struct SystemResolver {
    timeout: Duration,
}

impl SystemResolver {
    pub fn new() -> Self {
        #[cfg(target_os = "windows")]
        let timeout = Duration::from_millis(5000);
        #[cfg(not(target_os = "windows"))]
        let timeout = Duration::from_millis(2000);

        Self { timeout }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for SystemResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostnameResolver for SystemResolver {
    async fn resolve(&self, address: &str) -> Option<String> {
        // Dropping the lookup on timeout kills whichever tool is running.
        tokio::time::timeout(self.timeout, lookup_hostname(address))
            .await
            .ok()
            .flatten()
    }
}

async fn lookup_hostname(address: &str) -> Option<String> {
    #[cfg(any(target_os = "linux", target_os = "macos"))]
    {
        if let Some(name) = first_output_line("getent", &["hosts", address])
            .await
            .and_then(|out| out.split_whitespace().nth(1).map(str::to_string))
        {
            return Some(name);
        }

        if let Some(name) = first_output_line("host", &[address])
            .await
            .and_then(|out| parse_host_output(&out))
        {
            return Some(name);
        }

        #[cfg(target_os = "linux")]
        if let Some(name) = first_output_line("avahi-resolve", &["-a", address])
            .await
            .and_then(|out| out.split_whitespace().nth(1).map(str::to_string))
        {
            return Some(name);
        }
    }

    #[cfg(target_os = "windows")]
    {
        let script = format!(
            "try {{ (Resolve-DnsName -Name '{}' -Type PTR -ErrorAction Stop).NameHost }} catch {{ }}",
            address
        );
        if let Some(name) = first_output_line(
            "powershell",
            &["-NoProfile", "-ExecutionPolicy", "Bypass", "-Command", &script],
        )
        .await
        {
            let name = name.trim();
            if !name.is_empty() && !name.contains("error") && !name.contains(address) {
                return Some(name.to_string());
            }
        }
    }

    None
}

/// stdout of a successful command, if it printed anything.
async fn first_output_line(program: &str, args: &[&str]) -> Option<String> {
    let output = async_command(program).args(args).output().await.ok()?;
    if !output.status.success() {
        return None;
    }
    let out = String::from_utf8_lossy(&output.stdout);
    out.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

/// `5.0.0.10.in-addr.arpa domain name pointer nas.lan.` → `nas.lan`
#[cfg_attr(target_os = "windows", allow(dead_code))]
fn parse_host_output(out: &str) -> Option<String> {
    let name = out.split("pointer").nth(1)?.trim().trim_end_matches('.');
    (!name.is_empty()).then(|| name.to_string())
}
