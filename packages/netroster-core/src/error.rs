//! Error types shared across the core library.

use std::path::PathBuf;
use std::time::Duration;

use ipnetwork::Ipv4Network;

/// Failure to persist the annotation mapping.
///
/// A `put` that returns one of these has already rolled its in-memory change
/// back, so callers can report the write as failed without further cleanup.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to serialize annotations: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write annotations to {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures inside a scan cycle. None of these are fatal to the scheduler.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed {
        tool: &'static str,
        status: String,
        stderr: String,
    },

    #[error("interface enumeration failed: {0}")]
    Interfaces(String),

    #[error("no IPv4 subnet available to scan")]
    NoSubnets,

    #[error("scan of {subnet} timed out after {}s", after.as_secs())]
    Timeout { subnet: Ipv4Network, after: Duration },
}
