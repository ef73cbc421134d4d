//! Local interface enumeration and subnet derivation

use super::run_tool;
use crate::error::ScanError;
use ipnetwork::Ipv4Network;
use serde::Serialize;
use std::net::Ipv4Addr;

/// An IPv4 address bound to a local interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceAddr {
    pub interface: String,
    pub address: Ipv4Addr,
}

/// The `/24` containing `address`, trailing octet zeroed.
///
/// This ignores the interface's real netmask on purpose: one /24 per
/// interface keeps a ping scan bounded.
pub fn derive_subnet(address: Ipv4Addr) -> Option<Ipv4Network> {
    let [a, b, c, _] = address.octets();
    Ipv4Network::new(Ipv4Addr::new(a, b, c, 0), 24).ok()
}

/// Subnets to scan: one /24 per non-loopback IPv4 interface address,
/// deduplicated, in interface order.
pub async fn local_subnets() -> Result<Vec<Ipv4Network>, ScanError> {
    let mut subnets: Vec<Ipv4Network> = Vec::new();

    for addr in local_ipv4_interfaces().await? {
        if let Some(subnet) = derive_subnet(addr.address) {
            if !subnets.contains(&subnet) {
                tracing::debug!("Interface {} ({}) -> {}", addr.interface, addr.address, subnet);
                subnets.push(subnet);
            }
        }
    }

    Ok(subnets)
}

/// Every non-loopback IPv4 address on this machine.
pub async fn local_ipv4_interfaces() -> Result<Vec<InterfaceAddr>, ScanError> {
    #[cfg(target_os = "linux")]
    let addrs = {
        let output = run_tool("ip", vec!["-o".into(), "-4".into(), "addr".into(), "show".into()])
            .await
            .map_err(|e| ScanError::Interfaces(e.to_string()))?;
        parse_ip_addr(&output)
    };

    #[cfg(target_os = "macos")]
    let addrs = {
        let output = run_tool("ifconfig", Vec::new())
            .await
            .map_err(|e| ScanError::Interfaces(e.to_string()))?;
        parse_ifconfig(&output)
    };

    #[cfg(target_os = "windows")]
    let addrs = {
        let output = run_tool("ipconfig", Vec::new())
            .await
            .map_err(|e| ScanError::Interfaces(e.to_string()))?;
        parse_ipconfig(&output)
    };

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    let addrs: Vec<InterfaceAddr> = {
        let _ = run_tool;
        return Err(ScanError::Interfaces("unsupported platform".to_string()));
    };

    Ok(addrs
        .into_iter()
        .filter(|a| !a.address.is_loopback())
        .collect())
}

/// `ip -o -4 addr show`:
/// `2: eth0    inet 192.168.1.23/24 brd 192.168.1.255 scope global eth0 ...`
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_ip_addr(output: &str) -> Vec<InterfaceAddr> {
    output
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            let inet = parts.iter().position(|p| *p == "inet")?;
            let interface = parts.get(1)?.trim_end_matches(':').to_string();
            let cidr = parts.get(inet + 1)?;
            let address = cidr.split('/').next()?.parse().ok()?;
            Some(InterfaceAddr { interface, address })
        })
        .collect()
}

/// `ifconfig` blocks: an unindented `en0: flags=...` header followed by
/// indented `inet 192.168.1.5 netmask 0xffffff00 ...` lines.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn parse_ifconfig(output: &str) -> Vec<InterfaceAddr> {
    let mut addrs = Vec::new();
    let mut interface = String::new();

    for line in output.lines() {
        if !line.starts_with(char::is_whitespace) {
            if let Some((name, _)) = line.split_once(':') {
                interface = name.to_string();
            }
            continue;
        }

        let mut parts = line.split_whitespace();
        if parts.next() == Some("inet") {
            if let Some(address) = parts.next().and_then(|a| a.parse().ok()) {
                addrs.push(InterfaceAddr {
                    interface: interface.clone(),
                    address,
                });
            }
        }
    }

    addrs
}

/// `ipconfig`: adapter headers end in `:`, addresses on
/// `IPv4 Address. . . . . . . . . . . : 192.168.1.23(Preferred)` lines.
#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn parse_ipconfig(output: &str) -> Vec<InterfaceAddr> {
    let mut addrs = Vec::new();
    let mut interface = String::new();

    for line in output.lines() {
        if !line.starts_with(char::is_whitespace) && line.trim_end().ends_with(':') {
            interface = line.trim_end().trim_end_matches(':').to_string();
            continue;
        }

        let trimmed = line.trim();
        if trimmed.starts_with("IPv4 Address") || trimmed.starts_with("IP Address") {
            let address = trimmed
                .split_once(':')
                .map(|(_, value)| value.trim().trim_end_matches("(Preferred)"))
                .and_then(|value| value.parse().ok());
            if let Some(address) = address {
                addrs.push(InterfaceAddr {
                    interface: interface.clone(),
                    address,
                });
            }
        }
    }

    addrs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subnet_zeroes_trailing_octet() {
        let subnet = derive_subnet(Ipv4Addr::new(192, 168, 1, 23)).unwrap();
        assert_eq!(subnet.to_string(), "192.168.1.0/24");
        assert!(subnet.contains(Ipv4Addr::new(192, 168, 1, 254)));
    }

    #[test]
    fn parses_ip_addr_output() {
        let output = "\
1: lo    inet 127.0.0.1/8 scope host lo\\       valid_lft forever preferred_lft forever
2: eth0    inet 192.168.1.23/24 brd 192.168.1.255 scope global dynamic eth0\\       valid_lft 84512sec
3: wg0    inet 10.8.0.2/32 scope global wg0\\       valid_lft forever preferred_lft forever
";
        let addrs = parse_ip_addr(output);
        assert_eq!(addrs.len(), 3);
        assert_eq!(
            addrs[1],
            InterfaceAddr {
                interface: "eth0".to_string(),
                address: Ipv4Addr::new(192, 168, 1, 23),
            }
        );
    }

    #[test]
    fn parses_ifconfig_output() {
        let output = "\
lo0: flags=8049<UP,LOOPBACK,RUNNING,MULTICAST> mtu 16384
\tinet 127.0.0.1 netmask 0xff000000
en0: flags=8863<UP,BROADCAST,SMART,RUNNING,SIMPLEX,MULTICAST> mtu 1500
\tether 3c:22:fb:00:00:01
\tinet6 fe80::1c%en0 prefixlen 64 secured scopeid 0x6
\tinet 192.168.1.5 netmask 0xffffff00 broadcast 192.168.1.255
";
        let addrs = parse_ifconfig(output);
        assert_eq!(addrs.len(), 2);
        assert_eq!(addrs[1].interface, "en0");
        assert_eq!(addrs[1].address, Ipv4Addr::new(192, 168, 1, 5));
    }

    #[test]
    fn parses_ipconfig_output() {
        let output = "\
Windows IP Configuration

Ethernet adapter Ethernet:

   Connection-specific DNS Suffix  . : lan
   IPv4 Address. . . . . . . . . . . : 192.168.1.23
   Subnet Mask . . . . . . . . . . . : 255.255.255.0
";
        let addrs = parse_ipconfig(output);
        assert_eq!(
            addrs,
            vec![InterfaceAddr {
                interface: "Ethernet adapter Ethernet".to_string(),
                address: Ipv4Addr::new(192, 168, 1, 23),
            }]
        );
    }
}
