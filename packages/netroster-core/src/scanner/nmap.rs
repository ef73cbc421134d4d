//! Host discovery through `nmap -sn`

use super::{run_tool, DiscoveredHost, HostState, ScanExecutor};
use crate::error::ScanError;
use async_trait::async_trait;
use ipnetwork::Ipv4Network;

/// Runs `nmap -sn -n <subnet>` and parses its normal output.
///
/// nmap only reports MAC addresses when it runs with raw socket access, so
/// unprivileged scans come back with addresses only.
#[derive(Debug, Clone)]
pub struct NmapExecutor {
    program: &'static str,
}

impl NmapExecutor {
    pub fn new() -> Self {
        Self { program: "nmap" }
    }
}

impl Default for NmapExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScanExecutor for NmapExecutor {
    fn name(&self) -> &'static str {
        "nmap"
    }

    async fn scan(&self, subnet: &Ipv4Network) -> Result<Vec<DiscoveredHost>, ScanError> {
        let args = vec!["-sn".to_string(), "-n".to_string(), subnet.to_string()];
        let output = run_tool(self.program, args).await?;
        let hosts = parse_nmap_output(&output);

        tracing::debug!(
            "nmap reported {} hosts on {} ({} up)",
            hosts.len(),
            subnet,
            hosts.iter().filter(|h| h.state == HostState::Up).count()
        );

        Ok(hosts)
    }
}

/// Parse nmap's normal (human readable) ping-scan output.
///
/// Each host block starts with `Nmap scan report for <host>` where `<host>`
/// is either a bare address or `name (address)`, optionally followed by
/// `[host down]`.
fn parse_nmap_output(output: &str) -> Vec<DiscoveredHost> {
    let mut hosts: Vec<DiscoveredHost> = Vec::new();

    for line in output.lines() {
        let line = line.trim();

        if let Some(rest) = line.strip_prefix("Nmap scan report for ") {
            let down = rest.ends_with("[host down]");
            let target = rest.trim_end_matches("[host down]").trim();
            let address = match (target.rfind('('), target.rfind(')')) {
                (Some(start), Some(end)) if start < end => &target[start + 1..end],
                _ => target,
            };

            if address.parse::<std::net::IpAddr>().is_err() {
                tracing::debug!("Skipping unparseable nmap target: {}", rest);
                continue;
            }

            hosts.push(DiscoveredHost {
                address: address.to_string(),
                state: if down { HostState::Down } else { HostState::Up },
                mac: None,
            });
            continue;
        }

        let Some(current) = hosts.last_mut() else {
            continue;
        };

        if line.starts_with("Host is up") {
            current.state = HostState::Up;
        } else if line.starts_with("Host is down") {
            current.state = HostState::Down;
        } else if let Some(rest) = line.strip_prefix("MAC Address: ") {
            if let Some(mac) = rest.split_whitespace().next() {
                current.mac = Some(mac.to_lowercase());
            }
        }
    }

    hosts
}
