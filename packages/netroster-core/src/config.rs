//! Runtime configuration.
//!
//! Values are layered, highest priority first:
//! 1. Command line flags (applied by the binary)
//! 2. Environment variables (`NETROSTER_*`)
//! 3. Config file (`~/.config/netroster/config.toml`)
//! 4. Defaults

use crate::scanner::ScanBackend;
use anyhow::{Context, Result};
use ipnetwork::Ipv4Network;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_SCAN_INTERVAL_SECS: u64 = 300;
const DEFAULT_ERROR_INTERVAL_SECS: u64 = 60;
const DATA_FILE: &str = "device_data.json";

const ENV_BIND: &str = "NETROSTER_BIND";
const ENV_PORT: &str = "NETROSTER_PORT";
const ENV_SCAN_INTERVAL: &str = "NETROSTER_SCAN_INTERVAL";
const ENV_ERROR_INTERVAL: &str = "NETROSTER_ERROR_INTERVAL";
const ENV_SCAN_BACKEND: &str = "NETROSTER_SCAN_BACKEND";
const ENV_DATA_FILE: &str = "NETROSTER_DATA_FILE";

/// Configuration file structure
#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    server: Option<ServerSection>,
    scan: Option<ScanSection>,
    storage: Option<StorageSection>,
}

#[derive(Debug, Deserialize, Default)]
struct ServerSection {
    bind: Option<IpAddr>,
    port: Option<u16>,
}

#[derive(Debug, Deserialize, Default)]
struct ScanSection {
    interval_secs: Option<u64>,
    error_interval_secs: Option<u64>,
    timeout_secs: Option<u64>,
    backend: Option<ScanBackend>,
    subnets: Option<Vec<Ipv4Network>>,
}

#[derive(Debug, Deserialize, Default)]
struct StorageSection {
    annotations_path: Option<PathBuf>,
}

/// HTTP listener settings
#[derive(Debug, Clone, Serialize)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

/// Scheduler and discovery settings
#[derive(Debug, Clone, Serialize)]
pub struct ScanConfig {
    /// Sleep after a successful cycle
    pub interval: Duration,
    /// Sleep after a failed cycle
    pub error_interval: Duration,
    /// Upper bound on a single executor call; `None` trusts the tool
    pub timeout: Option<Duration>,
    pub backend: ScanBackend,
    /// Fixed subnets to scan; empty means derive from local interfaces
    pub subnets: Vec<Ipv4Network>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StorageConfig {
    pub annotations_path: PathBuf,
}

/// Where the configuration came from
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    /// Using default hardcoded values
    Default,
    /// At least one value came from the config file
    ConfigFile,
    /// At least one value came from the environment
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::ConfigFile => write!(f, "config file"),
            ConfigSource::Environment => write!(f, "environment variable"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub scan: ScanConfig,
    pub storage: StorageConfig,
    /// Highest-priority layer that contributed a value
    pub source: ConfigSource,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                port: DEFAULT_PORT,
            },
            scan: ScanConfig {
                interval: Duration::from_secs(DEFAULT_SCAN_INTERVAL_SECS),
                error_interval: Duration::from_secs(DEFAULT_ERROR_INTERVAL_SECS),
                timeout: None,
                backend: ScanBackend::default(),
                subnets: Vec::new(),
            },
            storage: StorageConfig {
                annotations_path: default_annotations_path(),
            },
            source: ConfigSource::Default,
        }
    }
}

impl Config {
    /// Load configuration from defaults, the config file and the environment.
    ///
    /// `explicit_path` replaces the default config file location. A file that
    /// cannot be read or parsed is logged and skipped.
    pub fn load(explicit_path: Option<&Path>) -> Self {
        let mut config = Config::default();

        let path = explicit_path.map(Path::to_path_buf).or_else(get_config_file_path);
        if let Some(path) = path {
            if let Some(file) = load_config_file(&path) {
                config.apply_file(file);
            }
        }

        config.apply_env(|name| std::env::var(name).ok());
        config
    }

    fn apply_file(&mut self, file: ConfigFile) {
        let mut changed = false;

        if let Some(server) = file.server {
            if let Some(bind) = server.bind {
                self.server.bind = bind;
                changed = true;
            }
            if let Some(port) = server.port {
                self.server.port = port;
                changed = true;
            }
        }

        if let Some(scan) = file.scan {
            if let Some(secs) = scan.interval_secs {
                self.scan.interval = Duration::from_secs(secs.max(1));
                changed = true;
            }
            if let Some(secs) = scan.error_interval_secs {
                self.scan.error_interval = Duration::from_secs(secs.max(1));
                changed = true;
            }
            if let Some(secs) = scan.timeout_secs {
                self.scan.timeout = (secs > 0).then(|| Duration::from_secs(secs));
                changed = true;
            }
            if let Some(backend) = scan.backend {
                self.scan.backend = backend;
                changed = true;
            }
            if let Some(subnets) = scan.subnets {
                self.scan.subnets = subnets;
                changed = true;
            }
        }

        if let Some(path) = file.storage.and_then(|s| s.annotations_path) {
            self.storage.annotations_path = path;
            changed = true;
        }

        if changed {
            self.source = ConfigSource::ConfigFile;
        }
    }

    /// Apply `NETROSTER_*` overrides read through `lookup`. Invalid values
    /// are logged and ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let mut changed = false;

        if let Some(bind) = parse_env::<IpAddr>(&lookup, ENV_BIND) {
            self.server.bind = bind;
            changed = true;
        }
        if let Some(port) = parse_env::<u16>(&lookup, ENV_PORT) {
            self.server.port = port;
            changed = true;
        }
        if let Some(secs) = parse_env::<u64>(&lookup, ENV_SCAN_INTERVAL) {
            self.scan.interval = Duration::from_secs(secs.max(1));
            changed = true;
        }
        if let Some(secs) = parse_env::<u64>(&lookup, ENV_ERROR_INTERVAL) {
            self.scan.error_interval = Duration::from_secs(secs.max(1));
            changed = true;
        }
        if let Some(backend) = parse_env::<ScanBackend>(&lookup, ENV_SCAN_BACKEND) {
            self.scan.backend = backend;
            changed = true;
        }
        if let Some(path) = lookup(ENV_DATA_FILE).filter(|p| !p.trim().is_empty()) {
            self.storage.annotations_path = PathBuf::from(path.trim());
            changed = true;
        }

        if changed {
            tracing::info!("Applied configuration overrides from environment");
            self.source = ConfigSource::Environment;
        }
    }

    /// Make sure the annotation file's directory exists.
    pub fn prepare_storage_dir(&self) -> Result<()> {
        if let Some(parent) = self.storage.annotations_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create data directory {}", parent.display())
                })?;
            }
        }
        Ok(())
    }
}

fn parse_env<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = lookup(name)?;
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse() {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("Ignoring invalid {}={:?}: {}", name, raw, e);
            None
        }
    }
}

fn default_annotations_path() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::data_dir)
        .map(|dir| dir.join("netroster").join(DATA_FILE))
        .unwrap_or_else(|| PathBuf::from(DATA_FILE))
}

/// Get the path to the configuration file
fn get_config_file_path() -> Option<PathBuf> {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .map(|p| p.join("netroster").join("config.toml"))
}

/// Load configuration from the config file
fn load_config_file(path: &Path) -> Option<ConfigFile> {
    if !path.exists() {
        return None;
    }

    match fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::debug!("Loaded config from {:?}", path);
                Some(config)
            }
            Err(e) => {
                tracing::warn!("Failed to parse config file {:?}: {}", path, e);
                None
            }
        },
        Err(e) => {
            tracing::warn!("Failed to read config file {:?}: {}", path, e);
            None
        }
    }
}

/// Get the path to the config file for documentation purposes
pub fn get_config_file_path_string() -> String {
    get_config_file_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "~/.config/netroster/config.toml".to_string())
}

/// Generate example config file content
pub fn generate_example_config() -> String {
    r#"# netroster configuration
# Place this file at: ~/.config/netroster/config.toml

[server]
# bind = "0.0.0.0"
# port = 8080

[scan]
# Seconds to wait after a successful / failed scan cycle
# interval_secs = 300
# error_interval_secs = 60
# Abort a single subnet scan after this many seconds (0 = no limit)
# timeout_secs = 0
# "nmap" (needs nmap installed) or "sweep" (system ping + ARP cache)
# backend = "nmap"
# Scan these instead of the /24 of every local interface
# subnets = ["192.168.1.0/24"]

[storage]
# annotations_path = "/var/lib/netroster/device_data.json"
"#
    .to_string()
}
