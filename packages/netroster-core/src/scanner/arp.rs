//! ARP table reading using system commands

use super::run_tool;
use crate::error::ScanError;
use std::net::Ipv4Addr;

/// Read `(address, mac)` pairs from the system ARP cache.
pub async fn read_arp_table() -> Result<Vec<(Ipv4Addr, String)>, ScanError> {
    #[cfg(target_os = "windows")]
    {
        let output = run_tool("arp", vec!["-a".to_string()]).await?;
        Ok(parse_windows(&output))
    }

    #[cfg(target_os = "linux")]
    {
        let output = run_tool("arp", vec!["-n".to_string()]).await?;
        Ok(parse_linux(&output))
    }

    #[cfg(target_os = "macos")]
    {
        let output = run_tool("arp", vec!["-a".to_string(), "-n".to_string()]).await?;
        Ok(parse_macos(&output))
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        let _ = run_tool;
        Ok(Vec::new())
    }
}

fn usable(ip: Ipv4Addr, mac: &str) -> bool {
    !ip.is_multicast()
        && !ip.is_broadcast()
        && ip.octets()[3] != 255
        && mac != "00:00:00:00:00:00"
        && mac != "ff:ff:ff:ff:ff:ff"
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_linux(output: &str) -> Vec<(Ipv4Addr, String)> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            let ip = parts.first()?.parse::<Ipv4Addr>().ok()?;
            let mac = parts.get(2)?.to_lowercase();
            (mac.len() == 17 && mac.contains(':') && usable(ip, &mac)).then_some((ip, mac))
        })
        .collect()
}

#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn parse_macos(output: &str) -> Vec<(Ipv4Addr, String)> {
    output
        .lines()
        .filter_map(|line| {
            let ip_start = line.find('(')?;
            let ip_end = line.find(')')?;
            let ip = line.get(ip_start + 1..ip_end)?.parse::<Ipv4Addr>().ok()?;
            let at = line.find(" at ")?;
            let mac = line[at + 4..].split_whitespace().next()?;
            if !mac.contains(':') {
                // "(incomplete)"
                return None;
            }
            let mac = pad_mac(mac);
            usable(ip, &mac).then_some((ip, mac))
        })
        .collect()
}

#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn parse_windows(output: &str) -> Vec<(Ipv4Addr, String)> {
    output
        .lines()
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            let ip = parts.first()?.parse::<Ipv4Addr>().ok()?;
            let mac = parts.get(1)?;
            if !(mac.contains('-') && mac.len() == 17) {
                return None;
            }
            let mac = mac.replace('-', ":").to_lowercase();
            usable(ip, &mac).then_some((ip, mac))
        })
        .collect()
}

/// macOS drops leading zeros (`0:1b:2c:...`); pad each octet to two digits.
fn pad_mac(mac: &str) -> String {
    mac.split(':')
        .map(|octet| format!("{:0>2}", octet.to_lowercase()))
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_linux_arp_output() {
        let output = "\
Address                  HWtype  HWaddress           Flags Mask            Iface
192.168.1.1              ether   74:AC:B9:12:34:56   C                     eth0
192.168.1.44                     (incomplete)                              eth0
192.168.1.255            ether   ff:ff:ff:ff:ff:ff   C                     eth0
";
        assert_eq!(
            parse_linux(output),
            vec![(Ipv4Addr::new(192, 168, 1, 1), "74:ac:b9:12:34:56".to_string())]
        );
    }

    #[test]
    fn parses_macos_arp_output() {
        let output = "\
? (192.168.1.1) at 74:ac:b9:12:34:56 on en0 ifscope [ethernet]
? (192.168.1.7) at 0:1b:2c:3:4:5 on en0 ifscope [ethernet]
? (192.168.1.9) at (incomplete) on en0 ifscope [ethernet]
";
        assert_eq!(
            parse_macos(output),
            vec![
                (Ipv4Addr::new(192, 168, 1, 1), "74:ac:b9:12:34:56".to_string()),
                (Ipv4Addr::new(192, 168, 1, 7), "00:1b:2c:03:04:05".to_string()),
            ]
        );
    }

    #[test]
    fn parses_windows_arp_output() {
        let output = "\
Interface: 192.168.1.23 --- 0x7
  Internet Address      Physical Address      Type
  192.168.1.1           74-ac-b9-12-34-56     dynamic
  224.0.0.22            01-00-5e-00-00-16     static
";
        assert_eq!(
            parse_windows(output),
            vec![(Ipv4Addr::new(192, 168, 1, 1), "74:ac:b9:12:34:56".to_string())]
        );
    }
}
