//! Live device registry and scan reconciliation.

use crate::scanner::{oui, UNRESOLVED_NAME};
use crate::store::AnnotationStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnlineStatus {
    Online,
    Offline,
}

impl std::fmt::Display for OnlineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            OnlineStatus::Online => "online",
            OnlineStatus::Offline => "offline",
        })
    }
}

/// A device seen by at least one scan during this process lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub address: String,
    /// Resolved hostname, or `"unknown"` until a lookup succeeds
    pub display_name: String,
    /// Empty until a scan reports a MAC address
    pub hardware_address: String,
    /// Manufacturer from the MAC OUI prefix
    pub vendor: Option<String>,
    pub online_status: OnlineStatus,
    pub last_seen_at: DateTime<Utc>,
    pub is_new_this_session: bool,
    pub is_known: bool,
}

/// One address as reported by a single scan cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub address: String,
    pub status: OnlineStatus,
    pub hardware_address: String,
    /// `None` when hostname resolution failed this cycle. A known device
    /// then keeps its previously resolved name instead of reverting to
    /// `"unknown"`.
    pub display_name: Option<String>,
}

/// Counts from a single [`DeviceRegistry::reconcile`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub observed: usize,
    pub created: usize,
    pub updated: usize,
}

/// Address-keyed map of live devices.
///
/// Every read copies out under the lock and every write updates in place
/// under the same lock; callers only ever see snapshots.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: Mutex<HashMap<String, DeviceRecord>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a scan cycle's observations into the registry.
    ///
    /// Addresses missing from `observations` are left untouched: a device is
    /// only marked offline when a scan reports it down. `last_seen_at` only
    /// advances on an online report.
    ///
    /// `is_known` is read from the store before the registry lock is taken,
    /// so an annotation written in between is overwritten by the stale flag
    /// until the next cycle (last write wins).
    pub async fn reconcile(
        &self,
        observations: Vec<Observation>,
        store: &AnnotationStore,
    ) -> ReconcileSummary {
        // Annotation lookups happen before the registry lock is taken so the
        // two locks are never held together.
        let mut known = HashMap::with_capacity(observations.len());
        for observation in &observations {
            if !known.contains_key(&observation.address) {
                let annotation = store.ensure(&observation.address).await;
                known.insert(observation.address.clone(), annotation.is_known);
            }
        }

        let vendors: HashMap<&str, String> = observations
            .iter()
            .filter(|o| !o.hardware_address.is_empty())
            .filter_map(|o| {
                oui::vendor_for_mac(&o.hardware_address).map(|v| (o.address.as_str(), v))
            })
            .collect();

        let now = Utc::now();
        let mut summary = ReconcileSummary {
            observed: observations.len(),
            ..Default::default()
        };

        let mut devices = self.devices.lock().await;
        for observation in &observations {
            let is_known = known.get(&observation.address).copied().unwrap_or(false);
            let vendor = vendors.get(observation.address.as_str()).cloned();

            match devices.get_mut(&observation.address) {
                Some(device) => {
                    device.online_status = observation.status;
                    if !observation.hardware_address.is_empty() {
                        device.hardware_address = observation.hardware_address.clone();
                        device.vendor = vendor;
                    }
                    if let Some(name) = &observation.display_name {
                        device.display_name = name.clone();
                    }
                    if observation.status == OnlineStatus::Online {
                        device.last_seen_at = now;
                    }
                    device.is_known = is_known;
                    summary.updated += 1;
                }
                None => {
                    tracing::info!(
                        "New device: {} ({}) - {}",
                        observation.address,
                        observation.display_name.as_deref().unwrap_or(UNRESOLVED_NAME),
                        observation.status
                    );
                    devices.insert(
                        observation.address.clone(),
                        DeviceRecord {
                            address: observation.address.clone(),
                            display_name: observation
                                .display_name
                                .clone()
                                .unwrap_or_else(|| UNRESOLVED_NAME.to_string()),
                            hardware_address: observation.hardware_address.clone(),
                            vendor,
                            online_status: observation.status,
                            last_seen_at: now,
                            is_new_this_session: true,
                            is_known,
                        },
                    );
                    summary.created += 1;
                }
            }
        }

        summary
    }

    /// Copy of the full address → record mapping.
    pub async fn snapshot(&self) -> BTreeMap<String, DeviceRecord> {
        self.devices
            .lock()
            .await
            .iter()
            .map(|(address, device)| (address.clone(), device.clone()))
            .collect()
    }

    pub async fn get(&self, address: &str) -> Option<DeviceRecord> {
        self.devices.lock().await.get(address).cloned()
    }

    /// Sync the classification flag after an annotation write.
    ///
    /// Marking a device known also clears its new-this-session flag. Returns
    /// `false` if the address has never been observed.
    pub async fn set_known(&self, address: &str, is_known: bool) -> bool {
        let mut devices = self.devices.lock().await;
        match devices.get_mut(address) {
            Some(device) => {
                device.is_known = is_known;
                if is_known {
                    device.is_new_this_session = false;
                }
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.devices.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.devices.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::AnnotationRecord;

    fn seen(address: &str, mac: &str) -> Observation {
        Observation {
            address: address.to_string(),
            status: OnlineStatus::Online,
            hardware_address: mac.to_string(),
            display_name: Some(format!("host-{}", address)),
        }
    }

    async fn scratch_store() -> (tempfile::TempDir, AnnotationStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = AnnotationStore::load(dir.path().join("device_data.json")).await;
        (dir, store)
    }

    #[tokio::test]
    async fn first_observation_creates_new_device() {
        let (_dir, store) = scratch_store().await;
        let registry = DeviceRegistry::new();

        let summary = registry
            .reconcile(vec![seen("10.0.0.5", "52:54:00:12:34:56")], &store)
            .await;

        assert_eq!(summary.created, 1);
        let device = registry.get("10.0.0.5").await.unwrap();
        assert!(device.is_new_this_session);
        assert!(!device.is_known);
        assert_eq!(device.display_name, "host-10.0.0.5");
        assert_eq!(device.online_status, OnlineStatus::Online);
        // lazily created annotation
        assert!(store.entries().await.contains_key("10.0.0.5"));
    }

    #[tokio::test]
    async fn identical_observations_only_move_last_seen() {
        let (_dir, store) = scratch_store().await;
        let registry = DeviceRegistry::new();
        let observations = vec![seen("10.0.0.5", "aa:bb:cc:dd:ee:ff")];

        registry.reconcile(observations.clone(), &store).await;
        let first = registry.get("10.0.0.5").await.unwrap();
        let summary = registry.reconcile(observations, &store).await;
        let second = registry.get("10.0.0.5").await.unwrap();

        assert_eq!(summary.updated, 1);
        assert!(second.last_seen_at >= first.last_seen_at);
        assert_eq!(
            DeviceRecord {
                last_seen_at: first.last_seen_at,
                ..second
            },
            first
        );
    }

    #[tokio::test]
    async fn unobserved_devices_keep_their_status() {
        let (_dir, store) = scratch_store().await;
        let registry = DeviceRegistry::new();

        registry
            .reconcile(vec![seen("10.0.0.5", ""), seen("10.0.0.9", "")], &store)
            .await;
        registry.reconcile(vec![seen("10.0.0.5", "")], &store).await;

        let absent = registry.get("10.0.0.9").await.unwrap();
        assert_eq!(absent.online_status, OnlineStatus::Online);
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn explicit_down_report_marks_offline() {
        let (_dir, store) = scratch_store().await;
        let registry = DeviceRegistry::new();
        registry.reconcile(vec![seen("10.0.0.9", "")], &store).await;

        let down = Observation {
            status: OnlineStatus::Offline,
            display_name: None,
            ..seen("10.0.0.9", "")
        };
        registry.reconcile(vec![down], &store).await;

        let device = registry.get("10.0.0.9").await.unwrap();
        assert_eq!(device.online_status, OnlineStatus::Offline);
        // unresolved this cycle, keeps the earlier name
        assert_eq!(device.display_name, "host-10.0.0.9");
    }

    #[tokio::test]
    async fn down_report_keeps_last_seen() {
        let (_dir, store) = scratch_store().await;
        let registry = DeviceRegistry::new();
        registry.reconcile(vec![seen("10.0.0.9", "")], &store).await;
        let before = registry.get("10.0.0.9").await.unwrap().last_seen_at;

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let down = Observation {
            status: OnlineStatus::Offline,
            ..seen("10.0.0.9", "")
        };
        registry.reconcile(vec![down], &store).await;

        let after = registry.get("10.0.0.9").await.unwrap();
        assert_eq!(after.online_status, OnlineStatus::Offline);
        assert_eq!(after.last_seen_at, before);

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        registry.reconcile(vec![seen("10.0.0.9", "")], &store).await;
        assert!(registry.get("10.0.0.9").await.unwrap().last_seen_at > before);
    }

    #[tokio::test]
    async fn empty_hardware_address_does_not_erase_known_mac() {
        let (_dir, store) = scratch_store().await;
        let registry = DeviceRegistry::new();

        registry
            .reconcile(vec![seen("10.0.0.5", "aa:bb:cc:dd:ee:ff")], &store)
            .await;
        registry.reconcile(vec![seen("10.0.0.5", "")], &store).await;

        let device = registry.get("10.0.0.5").await.unwrap();
        assert_eq!(device.hardware_address, "aa:bb:cc:dd:ee:ff");
    }

    #[tokio::test]
    async fn unresolved_new_device_uses_sentinel_name() {
        let (_dir, store) = scratch_store().await;
        let registry = DeviceRegistry::new();
        let observation = Observation {
            display_name: None,
            ..seen("10.0.0.12", "")
        };

        registry.reconcile(vec![observation], &store).await;

        let device = registry.get("10.0.0.12").await.unwrap();
        assert_eq!(device.display_name, UNRESOLVED_NAME);
    }

    #[tokio::test]
    async fn new_flag_survives_until_marked_known() {
        let (_dir, store) = scratch_store().await;
        let registry = DeviceRegistry::new();
        registry.reconcile(vec![seen("10.0.0.5", "")], &store).await;
        registry.reconcile(vec![seen("10.0.0.5", "")], &store).await;
        assert!(registry.get("10.0.0.5").await.unwrap().is_new_this_session);

        registry.set_known("10.0.0.5", false).await;
        assert!(registry.get("10.0.0.5").await.unwrap().is_new_this_session);

        assert!(registry.set_known("10.0.0.5", true).await);
        let device = registry.get("10.0.0.5").await.unwrap();
        assert!(device.is_known);
        assert!(!device.is_new_this_session);

        assert!(!registry.set_known("10.0.0.99", true).await);
    }

    #[tokio::test]
    async fn known_flag_follows_annotation() {
        let (_dir, store) = scratch_store().await;
        store
            .put(
                "10.0.0.5",
                AnnotationRecord {
                    is_known: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let registry = DeviceRegistry::new();

        registry.reconcile(vec![seen("10.0.0.5", "")], &store).await;

        let device = registry.get("10.0.0.5").await.unwrap();
        assert!(device.is_known);
        // still first seen in this process
        assert!(device.is_new_this_session);
    }

    #[tokio::test]
    async fn snapshot_is_detached_from_registry() {
        let (_dir, store) = scratch_store().await;
        let registry = DeviceRegistry::new();
        registry.reconcile(vec![seen("10.0.0.5", "")], &store).await;

        let snapshot = registry.snapshot().await;
        registry.reconcile(vec![seen("10.0.0.6", "")], &store).await;

        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.snapshot().await.len(), 2);
    }
}
