//! MAC OUI (Organizationally Unique Identifier) vendor lookup
//!
//! Uses the IEEE OUI database to identify device manufacturers from MAC addresses.

/// Vendor label for a MAC address, falling back to "Virtual Machine" for
/// well-known hypervisor and container prefixes.
pub fn vendor_for_mac(mac: &str) -> Option<String> {
    lookup_vendor(mac).or_else(|| is_virtual_mac(mac).then(|| "Virtual Machine".to_string()))
}

/// Lookup the vendor/manufacturer name for a MAC address.
///
/// Accepts any common notation ("00:1A:2B:3C:4D:5E", "00-1a-2b-3c-4d-5e",
/// "001a.2b3c.4d5e"). Returns `None` for malformed input or unknown prefixes.
pub fn lookup_vendor(mac: &str) -> Option<String> {
    let normalized = normalize_mac(mac)?;

    match oui_data::lookup(&normalized) {
        Some(record) => {
            let vendor_name = record.organization().to_string();
            tracing::debug!("OUI lookup for {}: {}", mac, vendor_name);
            Some(vendor_name)
        }
        None => {
            tracing::debug!("OUI lookup for {}: not found in database", mac);
            None
        }
    }
}

/// Normalize a MAC address to the format XX:XX:XX:XX:XX:XX
fn normalize_mac(mac: &str) -> Option<String> {
    let cleaned: String = mac.replace([':', '-', '.'], "").to_uppercase();

    if cleaned.len() < 6 || !cleaned.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }

    let padded = if cleaned.len() < 12 {
        format!("{:0<12}", cleaned)
    } else {
        cleaned[..12].to_string()
    };

    Some(
        padded
            .as_bytes()
            .chunks(2)
            .map(|pair| String::from_utf8_lossy(pair).into_owned())
            .collect::<Vec<_>>()
            .join(":"),
    )
}

/// Prefixes handed out by hypervisors and container runtimes.
fn is_virtual_mac(mac: &str) -> bool {
    let mac_normalized = mac.replace([':', '-', '.'], "").to_lowercase();

    if mac_normalized.len() < 6 {
        return false;
    }

    matches!(
        &mac_normalized[..6],
        // Docker
        "0242ac"
        // VMware
        | "005056" | "000c29" | "000569"
        // Xen
        | "00163e"
        // Hyper-V
        | "00155d"
        // Parallels
        | "001c42"
        // QEMU/KVM
        | "525400"
        // VirtualBox
        | "080027"
        // Proxmox VE
        | "bc2411"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_mac() {
        assert_eq!(
            normalize_mac("00-1a-2b-3c-4d-5e"),
            Some("00:1A:2B:3C:4D:5E".to_string())
        );
        assert_eq!(
            normalize_mac("001a.2b3c.4d5e"),
            Some("00:1A:2B:3C:4D:5E".to_string())
        );
        assert_eq!(normalize_mac("00:1A:2B"), Some("00:1A:2B:00:00:00".to_string()));
        assert_eq!(normalize_mac("zz:zz:zz:zz:zz:zz"), None);
        assert_eq!(normalize_mac(""), None);
    }

    #[test]
    fn test_virtual_prefixes() {
        assert!(is_virtual_mac("52:54:00:12:34:56"));
        assert!(is_virtual_mac("02:42:AC:11:00:02"));
        assert!(!is_virtual_mac("00:17:F2:12:34:56"));
        assert!(!is_virtual_mac("52:54"));
    }

    #[test]
    fn test_vendor_for_malformed_mac() {
        assert_eq!(vendor_for_mac("not-a-mac"), None);
    }
}
