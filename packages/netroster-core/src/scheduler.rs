//! Background scan scheduling.
//!
//! One task loops forever: scan every subnet, reconcile, sleep, repeat. A
//! failed cycle is logged and followed by the shorter error interval. The
//! loop ends only when its cancellation token fires.

use crate::error::ScanError;
use crate::registry::{DeviceRegistry, Observation, OnlineStatus, ReconcileSummary};
use crate::scanner::{self, DiscoveredHost, HostState, HostnameResolver, ScanExecutor};
use crate::store::AnnotationStore;
use ipnetwork::Ipv4Network;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Hostname lookups run concurrently per batch
const RESOLVE_BATCH_SIZE: usize = 32;

/// Where the scan loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Scanning,
    Sleeping { after_error: bool },
    Stopped,
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub interval: Duration,
    pub error_interval: Duration,
    /// Applied to each executor call when set
    pub scan_timeout: Option<Duration>,
    /// Scan exactly these; empty means derive from local interfaces
    pub subnets: Vec<Ipv4Network>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            error_interval: Duration::from_secs(60),
            scan_timeout: None,
            subnets: Vec::new(),
        }
    }
}

impl From<&crate::config::ScanConfig> for SchedulerSettings {
    fn from(config: &crate::config::ScanConfig) -> Self {
        Self {
            interval: config.interval,
            error_interval: config.error_interval,
            scan_timeout: config.timeout,
            subnets: config.subnets.clone(),
        }
    }
}

/// Result of one successful scan cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub subnets: Vec<Ipv4Network>,
    pub hosts_up: usize,
    pub reconcile: ReconcileSummary,
    pub elapsed_secs: f64,
}

pub struct Scheduler {
    registry: Arc<DeviceRegistry>,
    store: Arc<AnnotationStore>,
    executor: Arc<dyn ScanExecutor>,
    resolver: Arc<dyn HostnameResolver>,
    settings: SchedulerSettings,
    state: watch::Sender<SchedulerState>,
}

impl Scheduler {
    pub fn new(
        registry: Arc<DeviceRegistry>,
        store: Arc<AnnotationStore>,
        executor: Arc<dyn ScanExecutor>,
        resolver: Arc<dyn HostnameResolver>,
        settings: SchedulerSettings,
    ) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            registry,
            store,
            executor,
            resolver,
            settings,
            state,
        }
    }

    /// Follow state transitions of [`run`](Self::run).
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Scan until `cancel` fires. Never returns early on scan errors.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            "Scheduler started: {} backend, every {}s ({}s after errors)",
            self.executor.name(),
            self.settings.interval.as_secs(),
            self.settings.error_interval.as_secs()
        );

        loop {
            self.state.send_replace(SchedulerState::Scanning);

            let outcome = tokio::select! {
                _ = cancel.cancelled() => break,
                outcome = self.run_cycle() => outcome,
            };

            let (delay, after_error) = match outcome {
                Ok(report) => {
                    tracing::info!(
                        "Scan complete: {} hosts up on {} subnet(s), {} new, {} updated in {:.1}s",
                        report.hosts_up,
                        report.subnets.len(),
                        report.reconcile.created,
                        report.reconcile.updated,
                        report.elapsed_secs
                    );
                    (self.settings.interval, false)
                }
                Err(e) => {
                    tracing::error!(
                        "Error during scan: {}; retrying in {}s",
                        e,
                        self.settings.error_interval.as_secs()
                    );
                    (self.settings.error_interval, true)
                }
            };

            self.state
                .send_replace(SchedulerState::Sleeping { after_error });

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.state.send_replace(SchedulerState::Stopped);
        tracing::info!("Scheduler stopped");
    }

    /// Run a single scan cycle and reconcile its results.
    ///
    /// Every subnet is attempted. Hosts from the subnets that succeeded are
    /// reconciled even if another subnet failed; the first failure is then
    /// returned so the caller backs off.
    pub async fn run_cycle(&self) -> Result<CycleReport, ScanError> {
        let start = Instant::now();
        let subnets = self.subnets().await?;
        if subnets.is_empty() {
            return Err(ScanError::NoSubnets);
        }

        let mut hosts = Vec::new();
        let mut first_error = None;

        for subnet in &subnets {
            tracing::info!("Scanning network: {}", subnet);
            match self.scan_subnet(subnet).await {
                Ok(found) => hosts.extend(found),
                Err(e) => {
                    tracing::warn!("Scan of {} failed: {}", subnet, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        let hosts_up = hosts.iter().filter(|h| h.state == HostState::Up).count();
        let observations = resolve_observations(self.resolver.as_ref(), hosts).await;
        let reconcile = self.registry.reconcile(observations, &self.store).await;

        if let Some(e) = first_error {
            return Err(e);
        }

        Ok(CycleReport {
            subnets,
            hosts_up,
            reconcile,
            elapsed_secs: start.elapsed().as_secs_f64(),
        })
    }

    async fn subnets(&self) -> Result<Vec<Ipv4Network>, ScanError> {
        if self.settings.subnets.is_empty() {
            scanner::local_subnets().await
        } else {
            Ok(self.settings.subnets.clone())
        }
    }

    async fn scan_subnet(&self, subnet: &Ipv4Network) -> Result<Vec<DiscoveredHost>, ScanError> {
        match self.settings.scan_timeout {
            Some(after) => tokio::time::timeout(after, self.executor.scan(subnet))
                .await
                .map_err(|_| ScanError::Timeout {
                    subnet: *subnet,
                    after,
                })?,
            None => self.executor.scan(subnet).await,
        }
    }
}

/// Resolve names for live hosts and turn hosts into observations.
///
/// Lookups run in parallel batches. A failed lookup leaves the name unset
/// rather than failing the cycle.
async fn resolve_observations(
    resolver: &dyn HostnameResolver,
    hosts: Vec<DiscoveredHost>,
) -> Vec<Observation> {
    let mut observations = Vec::with_capacity(hosts.len());

    for chunk in hosts.chunks(RESOLVE_BATCH_SIZE) {
        let lookups = chunk.iter().map(|host| async move {
            match host.state {
                HostState::Up => resolver.resolve(&host.address).await,
                HostState::Down => None,
            }
        });
        let names = futures::future::join_all(lookups).await;

        for (host, display_name) in chunk.iter().zip(names) {
            observations.push(Observation {
                address: host.address.clone(),
                status: match host.state {
                    HostState::Up => OnlineStatus::Online,
                    HostState::Down => OnlineStatus::Offline,
                },
                hardware_address: host.mac.clone().unwrap_or_default(),
                display_name,
            });
        }
    }

    observations
}
