//! Ping sweep using the system ping command

use super::{arp, hidden_command, DiscoveredHost, ScanExecutor};
use crate::error::ScanError;
use async_trait::async_trait;
use ipnetwork::Ipv4Network;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;

/// Hosts pinged concurrently per batch
const BATCH_SIZE: usize = 50;

/// Discovery without nmap: ping every address in the subnet, then merge in
/// the ARP cache for MAC addresses and for hosts that ignore ICMP.
#[derive(Debug, Clone, Default)]
pub struct SweepExecutor;

impl SweepExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ScanExecutor for SweepExecutor {
    fn name(&self) -> &'static str {
        "sweep"
    }

    async fn scan(&self, subnet: &Ipv4Network) -> Result<Vec<DiscoveredHost>, ScanError> {
        let responders = ping_sweep(subnet).await;
        let arp_entries = match arp::read_arp_table().await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Could not read ARP table: {}", e);
                Vec::new()
            }
        };

        Ok(merge_with_arp(subnet, responders, arp_entries))
    }
}

/// Combine ping responders with ARP entries that fall inside `subnet`.
fn merge_with_arp(
    subnet: &Ipv4Network,
    responders: Vec<Ipv4Addr>,
    arp_entries: Vec<(Ipv4Addr, String)>,
) -> Vec<DiscoveredHost> {
    let mut hosts: BTreeMap<Ipv4Addr, Option<String>> =
        responders.into_iter().map(|ip| (ip, None)).collect();

    for (ip, mac) in arp_entries {
        if subnet.contains(ip) {
            hosts.insert(ip, Some(mac));
        }
    }

    hosts
        .into_iter()
        .map(|(ip, mac)| DiscoveredHost::up(ip.to_string(), mac))
        .collect()
}

/// Ping every host address in the subnet and return the responders.
async fn ping_sweep(subnet: &Ipv4Network) -> Vec<Ipv4Addr> {
    let ips: Vec<Ipv4Addr> = subnet
        .iter()
        .filter(|ip| *ip != subnet.network() && *ip != subnet.broadcast())
        .collect();

    tracing::info!("Pinging {} hosts in subnet {}", ips.len(), subnet);

    let mut responders = Vec::new();
    let mut completed = 0;

    for batch in ips.chunks(BATCH_SIZE) {
        let handles: Vec<_> = batch
            .iter()
            .map(|ip| {
                let ip = *ip;
                tokio::task::spawn_blocking(move || ping_host(ip).then_some(ip))
            })
            .collect();

        for handle in handles {
            if let Ok(Some(ip)) = handle.await {
                responders.push(ip);
            }
        }

        completed += batch.len();
        tracing::debug!(
            "Ping progress: {}/{} hosts checked, {} responding",
            completed,
            ips.len(),
            responders.len()
        );
    }

    responders
}

/// Single echo request; true if the host answered.
fn ping_host(ip: Ipv4Addr) -> bool {
    let ip = ip.to_string();

    #[cfg(target_os = "windows")]
    let output = hidden_command("ping")
        .args(["-n", "1", "-w", "1000", &ip])
        .output();

    #[cfg(not(target_os = "windows"))]
    let output = hidden_command("ping").args(["-c", "1", "-W", "1", &ip]).output();

    match output {
        Ok(output) => {
            #[cfg(target_os = "windows")]
            {
                // Windows ping exits 0 on "destination host unreachable"
                let stdout = String::from_utf8_lossy(&output.stdout).to_lowercase();
                output.status.success() && stdout.contains("reply from") && stdout.contains("ttl=")
            }

            #[cfg(not(target_os = "windows"))]
            {
                output.status.success()
            }
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arp_entries_fill_in_macs_and_stay_in_subnet() {
        let subnet: Ipv4Network = "192.168.1.0/24".parse().unwrap();
        let responders = vec![
            Ipv4Addr::new(192, 168, 1, 10),
            Ipv4Addr::new(192, 168, 1, 1),
        ];
        let arp_entries = vec![
            (Ipv4Addr::new(192, 168, 1, 1), "aa:bb:cc:00:00:01".to_string()),
            (Ipv4Addr::new(192, 168, 1, 30), "aa:bb:cc:00:00:30".to_string()),
            (Ipv4Addr::new(10, 0, 0, 1), "aa:bb:cc:00:00:99".to_string()),
        ];

        let hosts = merge_with_arp(&subnet, responders, arp_entries);

        assert_eq!(
            hosts,
            vec![
                DiscoveredHost::up("192.168.1.1", Some("aa:bb:cc:00:00:01".to_string())),
                DiscoveredHost::up("192.168.1.10", None),
                DiscoveredHost::up("192.168.1.30", Some("aa:bb:cc:00:00:30".to_string())),
            ]
        );
    }
}
