//! Netroster Core Library
//!
//! Continuous inventory of the devices on a local network:
//! - Periodic discovery (nmap host discovery or ping sweep + ARP cache)
//! - A live registry of every device seen during this run
//! - User annotations persisted to a JSON file
//! - An HTTP API and HTML page over the merged view
//!
//! # Example
//!
//! ```no_run
//! use netroster_core::{
//!     AnnotationStore, DeviceRegistry, DeviceService, Scheduler, SchedulerSettings,
//!     scanner::{ScanBackend, SystemResolver},
//! };
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(AnnotationStore::load("device_data.json").await);
//!     let registry = Arc::new(DeviceRegistry::new());
//!
//!     let scheduler = Scheduler::new(
//!         registry.clone(),
//!         store.clone(),
//!         ScanBackend::Nmap.executor(),
//!         Arc::new(SystemResolver::new()),
//!         SchedulerSettings::default(),
//!     );
//!     tokio::spawn(scheduler.run(CancellationToken::new()));
//!
//!     let app = netroster_core::api::router(DeviceService::new(registry, store));
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod registry;
pub mod scanner;
pub mod scheduler;
pub mod service;
pub mod store;

// Re-export commonly used types
pub use config::{Config, ConfigSource};
pub use error::{ScanError, StoreError};
pub use registry::{DeviceRecord, DeviceRegistry, Observation, OnlineStatus, ReconcileSummary};
pub use scheduler::{CycleReport, Scheduler, SchedulerSettings, SchedulerState};
pub use service::{AnnotationPayload, DeviceService, DeviceView};
pub use store::{AnnotationRecord, AnnotationStore, LoadOutcome};
