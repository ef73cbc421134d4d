//! Netroster CLI - keeps an annotated roster of the devices on your LAN
//!
//! This binary can:
//! - Run the scan scheduler and HTTP API as a long-lived server
//! - Run a single scan cycle and print what it found
//! - Query and annotate devices on a running server

mod client;
mod serve;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use client::RosterClient;
use ipnetwork::Ipv4Network;
use netroster_core::scanner::SystemResolver;
use netroster_core::{
    config, AnnotationPayload, AnnotationStore, Config, DeviceRegistry, DeviceService,
    DeviceView, Scheduler, SchedulerSettings,
};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "netroster")]
#[command(version)]
#[command(about = "Keeps an annotated roster of the devices on your LAN")]
#[command(long_about = "
Netroster periodically discovers the hosts on the local network, tracks
which ones are online, and lets you record who owns each device and where
it lives. The roster is served as JSON and as a simple web page.

Quick start:
  1. Start the server:   netroster serve
  2. Open the roster:    http://localhost:8080/
  3. Label a device:     netroster annotate 192.168.1.20 --owner alice --known true
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Config file to use instead of the default location
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the scan scheduler and HTTP server
    #[command(alias = "daemon")]
    Serve {
        /// HTTP port
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to listen on
        #[arg(short, long)]
        bind: Option<IpAddr>,

        /// Seconds between successful scans
        #[arg(short, long)]
        interval: Option<u64>,

        /// Seconds to wait after a failed scan
        #[arg(long)]
        error_interval: Option<u64>,
    },

    /// Run one scan cycle and print the discovered devices
    Scan {
        /// Subnet to scan (repeatable); defaults to local interfaces
        #[arg(short, long)]
        subnet: Vec<Ipv4Network>,
    },

    /// List devices known to a running server
    #[command(alias = "ls")]
    Devices {
        /// Server base URL
        #[arg(long)]
        server: Option<String>,
    },

    /// Show the annotation for one address
    Show {
        address: String,

        /// Server base URL
        #[arg(long)]
        server: Option<String>,
    },

    /// Update the annotation for one address
    ///
    /// Only the given fields change; the rest keep their current values.
    Annotate {
        address: String,

        #[arg(long)]
        device_type: Option<String>,

        #[arg(long)]
        owner: Option<String>,

        #[arg(long)]
        location: Option<String>,

        #[arg(long)]
        notes: Option<String>,

        /// Mark the device as known (true) or unknown (false)
        #[arg(long)]
        known: Option<bool>,

        /// Server base URL
        #[arg(long)]
        server: Option<String>,
    },

    /// Show configuration paths and settings
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("netroster={},netroster_core={}", log_level, log_level).into()
            }),
        )
        .with_target(false)
        .init();

    let config = Config::load(cli.config.as_deref());

    match &cli.command {
        Commands::Serve {
            port,
            bind,
            interval,
            error_interval,
        } => {
            let mut config = config;
            if let Some(port) = port {
                config.server.port = *port;
            }
            if let Some(bind) = bind {
                config.server.bind = *bind;
            }
            if let Some(secs) = interval {
                config.scan.interval = Duration::from_secs((*secs).max(1));
            }
            if let Some(secs) = error_interval {
                config.scan.error_interval = Duration::from_secs((*secs).max(1));
            }
            serve::run_server(config).await
        }
        Commands::Scan { subnet } => cmd_scan(&cli, config, subnet.clone()).await,
        Commands::Devices { server } => cmd_devices(&cli, &server_url(&config, server)).await,
        Commands::Show { address, server } => {
            cmd_show(&cli, &server_url(&config, server), address).await
        }
        Commands::Annotate {
            address,
            device_type,
            owner,
            location,
            notes,
            known,
            server,
        } => {
            let changes = AnnotationPayload {
                device_type: device_type.clone(),
                owner: owner.clone(),
                location: location.clone(),
                notes: notes.clone(),
                is_known: *known,
            };
            cmd_annotate(&cli, &server_url(&config, server), address, changes).await
        }
        Commands::Config => cmd_config(&cli, &config),
    }
}

/// `--server`, or the local server from the resolved configuration
fn server_url(config: &Config, explicit: &Option<String>) -> String {
    if let Some(url) = explicit {
        return url.clone();
    }
    let host = if config.server.bind.is_unspecified() {
        IpAddr::from([127, 0, 0, 1])
    } else {
        config.server.bind
    };
    match host {
        IpAddr::V6(v6) => format!("http://[{}]:{}", v6, config.server.port),
        IpAddr::V4(v4) => format!("http://{}:{}", v4, config.server.port),
    }
}

async fn cmd_scan(cli: &Cli, config: Config, subnets: Vec<Ipv4Network>) -> Result<()> {
    // Annotations are read for display only; nothing is written back.
    let store = Arc::new(AnnotationStore::load(&config.storage.annotations_path).await);
    let registry = Arc::new(DeviceRegistry::new());

    let mut settings = SchedulerSettings::from(&config.scan);
    if !subnets.is_empty() {
        settings.subnets = subnets;
    }

    let scheduler = Scheduler::new(
        registry.clone(),
        store.clone(),
        config.scan.backend.executor(),
        Arc::new(SystemResolver::new()),
        settings,
    );

    if matches!(cli.format, OutputFormat::Text) {
        println!("Scanning network ({} backend)...", config.scan.backend);
    }

    let outcome = scheduler.run_cycle().await;
    let devices = DeviceService::new(registry, store).list_devices().await;

    match cli.format {
        OutputFormat::Text => {
            if let Ok(report) = &outcome {
                println!(
                    "Scanned {} subnet(s) in {:.1}s",
                    report.subnets.len(),
                    report.elapsed_secs
                );
            }
            print_devices(&devices);
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "devices": devices,
                    "report": outcome.as_ref().ok(),
                    "error": outcome.as_ref().err().map(|e| e.to_string()),
                })
            );
        }
    }

    outcome.map(|_| ()).context("Scan failed")
}

async fn cmd_devices(cli: &Cli, server: &str) -> Result<()> {
    let devices = RosterClient::new(server)?.devices().await?;

    match cli.format {
        OutputFormat::Text => print_devices(&devices),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&devices)?),
    }

    Ok(())
}

async fn cmd_show(cli: &Cli, server: &str, address: &str) -> Result<()> {
    let record = RosterClient::new(server)?.annotation(address).await?;

    match cli.format {
        OutputFormat::Text => {
            println!("Address:  {}", address);
            println!("Type:     {}", record.device_type);
            println!("Owner:    {}", record.owner);
            println!("Location: {}", record.location);
            println!("Known:    {}", if record.is_known { "yes" } else { "no" });
            if !record.notes.is_empty() {
                println!("Notes:    {}", record.notes);
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&record)?),
    }

    Ok(())
}

async fn cmd_annotate(
    cli: &Cli,
    server: &str,
    address: &str,
    changes: AnnotationPayload,
) -> Result<()> {
    let client = RosterClient::new(server)?;

    // The server overwrites whole records, so merge onto the current one here.
    let mut payload = AnnotationPayload::from(client.annotation(address).await?);
    if changes.device_type.is_some() {
        payload.device_type = changes.device_type;
    }
    if changes.owner.is_some() {
        payload.owner = changes.owner;
    }
    if changes.location.is_some() {
        payload.location = changes.location;
    }
    if changes.notes.is_some() {
        payload.notes = changes.notes;
    }
    if changes.is_known.is_some() {
        payload.is_known = changes.is_known;
    }

    client.annotate(address, &payload).await?;

    match cli.format {
        OutputFormat::Text => println!("Annotation saved for {}", address),
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "status": "success",
                    "address": address,
                    "annotation": payload,
                })
            );
        }
    }

    Ok(())
}

fn cmd_config(cli: &Cli, config: &Config) -> Result<()> {
    let config_path = cli
        .config
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(config::get_config_file_path_string);
    let subnets = if config.scan.subnets.is_empty() {
        "auto (local interfaces)".to_string()
    } else {
        config
            .scan
            .subnets
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    };

    match cli.format {
        OutputFormat::Text => {
            println!("Configuration");
            println!("=============");
            println!();
            println!("Config file:      {}", config_path);
            println!("Resolved from:    {}", config.source);
            println!("Listen address:   {}", config.server.socket_addr());
            println!("Scan backend:     {}", config.scan.backend);
            println!("Scan interval:    {}s", config.scan.interval.as_secs());
            println!("Error interval:   {}s", config.scan.error_interval.as_secs());
            match config.scan.timeout {
                Some(timeout) => println!("Scan timeout:     {}s", timeout.as_secs()),
                None => println!("Scan timeout:     none"),
            }
            println!("Subnets:          {}", subnets);
            println!("Annotations file: {}", config.storage.annotations_path.display());
            println!();
            println!("Environment variables:");
            println!("  NETROSTER_BIND           - Listen address");
            println!("  NETROSTER_PORT           - HTTP port");
            println!("  NETROSTER_SCAN_INTERVAL  - Seconds between scans");
            println!("  NETROSTER_ERROR_INTERVAL - Seconds to wait after a failed scan");
            println!("  NETROSTER_SCAN_BACKEND   - nmap or sweep");
            println!("  NETROSTER_DATA_FILE      - Annotations file path");
            println!();
            println!("Example config.toml:");
            println!();
            println!("{}", config::generate_example_config());
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "config_file": config_path,
                    "source": config.source,
                    "server": config.server,
                    "scan": config.scan,
                    "storage": config.storage,
                })
            );
        }
    }

    Ok(())
}

fn print_devices(devices: &[DeviceView]) {
    println!();
    println!("{} devices:", devices.len());
    println!();
    for view in devices {
        let device = &view.device;
        let marker = if device.is_new_this_session && !device.is_known {
            "*"
        } else {
            " "
        };
        let vendor = device.vendor.as_deref().unwrap_or("");
        let owner = if view.annotation.owner == netroster_core::store::UNSPECIFIED {
            "-"
        } else {
            view.annotation.owner.as_str()
        };

        println!(
            "{} {:15} {:7} {:17} {:24} {:16} {}",
            marker,
            device.address,
            device.online_status,
            device.hardware_address,
            device.display_name,
            owner,
            vendor
        );
    }
}
