//! Privilege detection for host discovery
//!
//! nmap only sends ARP probes (and therefore only reports MAC addresses)
//! when it can open raw sockets. The ping sweep works either way because
//! the system ping binary carries its own capabilities.

use super::ScanBackend;

/// Check if the current process is running with elevated privileges
pub fn is_elevated() -> bool {
    #[cfg(unix)]
    {
        unsafe { libc::geteuid() == 0 }
    }

    #[cfg(target_os = "windows")]
    {
        match super::hidden_command("whoami").args(["/groups"]).output() {
            Ok(output) => {
                let output_str = String::from_utf8_lossy(&output.stdout);
                output_str.contains("S-1-16-12288") || output_str.contains("High Mandatory Level")
            }
            Err(_) => false,
        }
    }

    #[cfg(not(any(unix, target_os = "windows")))]
    {
        false
    }
}

/// Warning to show the user when `backend` will run with reduced results.
pub fn capability_warning(backend: ScanBackend, elevated: bool) -> Option<String> {
    match (backend, elevated) {
        (ScanBackend::Nmap, false) => Some(
            "nmap is running without root privileges; MAC addresses and vendors will be missing. \
             Run as root or grant nmap CAP_NET_RAW to collect them."
                .to_string(),
        ),
        _ => None,
    }
}
