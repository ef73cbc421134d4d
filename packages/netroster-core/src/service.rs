//! Read/write access to the merged device view.

use crate::error::StoreError;
use crate::registry::{DeviceRecord, DeviceRegistry};
use crate::store::{AnnotationRecord, AnnotationStore};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;

/// A live device together with its annotation, for presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceView {
    #[serde(flatten)]
    pub device: DeviceRecord,
    pub annotation: AnnotationRecord,
}

/// Annotation write as received from a client. Absent or `null` fields
/// take their defaults; nothing is merged with the stored record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationPayload {
    #[serde(default, alias = "device_type")]
    pub device_type: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, alias = "is_known")]
    pub is_known: Option<bool>,
}

impl From<AnnotationPayload> for AnnotationRecord {
    fn from(payload: AnnotationPayload) -> Self {
        let defaults = AnnotationRecord::default();
        Self {
            device_type: payload.device_type.unwrap_or(defaults.device_type),
            owner: payload.owner.unwrap_or(defaults.owner),
            location: payload.location.unwrap_or(defaults.location),
            notes: payload.notes.unwrap_or(defaults.notes),
            is_known: payload.is_known.unwrap_or(defaults.is_known),
        }
    }
}

impl From<AnnotationRecord> for AnnotationPayload {
    fn from(record: AnnotationRecord) -> Self {
        Self {
            device_type: Some(record.device_type),
            owner: Some(record.owner),
            location: Some(record.location),
            notes: Some(record.notes),
            is_known: Some(record.is_known),
        }
    }
}

/// Query surface shared by the HTTP handlers.
#[derive(Clone)]
pub struct DeviceService {
    registry: Arc<DeviceRegistry>,
    store: Arc<AnnotationStore>,
}

impl DeviceService {
    pub fn new(registry: Arc<DeviceRegistry>, store: Arc<AnnotationStore>) -> Self {
        Self { registry, store }
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<AnnotationStore> {
        &self.store
    }

    /// Stored annotation, or defaults for an address nobody has annotated.
    pub async fn get_annotation(&self, address: &str) -> AnnotationRecord {
        self.store.get(address).await
    }

    /// Persist an annotation, then bring the registry's known flag in line.
    ///
    /// The registry is only touched after the write is durable, so a failed
    /// write leaves both sides as they were.
    pub async fn set_annotation(
        &self,
        address: &str,
        record: AnnotationRecord,
    ) -> Result<(), StoreError> {
        let is_known = record.is_known;
        self.store.put(address, record).await?;

        if self.registry.set_known(address, is_known).await {
            tracing::debug!("Device {} classification updated (known: {})", address, is_known);
        }
        tracing::info!("Annotation saved for {}", address);
        Ok(())
    }

    /// Every live device with its annotation, ordered by address.
    pub async fn list_devices(&self) -> Vec<DeviceView> {
        let devices = self.registry.snapshot().await;
        let annotations = self.store.entries().await;

        let mut views: Vec<DeviceView> = devices
            .into_values()
            .map(|device| {
                let annotation = annotations.get(&device.address).cloned().unwrap_or_default();
                DeviceView { device, annotation }
            })
            .collect();

        views.sort_by(|a, b| address_order(&a.device.address, &b.device.address));
        views
    }
}

/// Numeric order for IP addresses, lexical for anything else.
fn address_order(a: &str, b: &str) -> std::cmp::Ordering {
    let key = |s: &str| (s.parse::<IpAddr>().ok(), s.to_string());
    key(a).cmp(&key(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Observation, OnlineStatus};

    async fn service() -> (tempfile::TempDir, DeviceService) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(AnnotationStore::load(dir.path().join("device_data.json")).await);
        (dir, DeviceService::new(Arc::new(DeviceRegistry::new()), store))
    }

    fn online(address: &str) -> Observation {
        Observation {
            address: address.to_string(),
            status: OnlineStatus::Online,
            hardware_address: String::new(),
            display_name: None,
        }
    }

    #[test]
    fn payload_defaults_missing_fields() {
        let payload: AnnotationPayload =
            serde_json::from_str(r#"{"owner":"Alice","isKnown":true,"notes":null}"#).unwrap();
        let record = AnnotationRecord::from(payload);

        assert_eq!(record.owner, "Alice");
        assert!(record.is_known);
        assert_eq!(record.notes, "");
        assert_eq!(record.device_type, crate::store::UNSPECIFIED);
    }

    #[test]
    fn payload_accepts_snake_case() {
        let payload: AnnotationPayload =
            serde_json::from_str(r#"{"device_type":"Server","is_known":true}"#).unwrap();
        let record = AnnotationRecord::from(payload);

        assert_eq!(record.device_type, "Server");
        assert!(record.is_known);
    }

    #[tokio::test]
    async fn write_then_read_returns_same_record() {
        let (_dir, service) = service().await;
        let record = AnnotationRecord {
            device_type: "Server".to_string(),
            owner: "Alice".to_string(),
            location: "Rack 2".to_string(),
            notes: "backup target".to_string(),
            is_known: true,
        };

        service.set_annotation("10.0.0.5", record.clone()).await.unwrap();

        assert_eq!(service.get_annotation("10.0.0.5").await, record);
    }

    #[tokio::test]
    async fn marking_known_clears_new_flag() {
        let (_dir, service) = service().await;
        service
            .registry()
            .reconcile(vec![online("10.0.0.5")], service.store())
            .await;

        let record = AnnotationRecord {
            is_known: true,
            ..Default::default()
        };
        service.set_annotation("10.0.0.5", record).await.unwrap();

        let device = service.registry().get("10.0.0.5").await.unwrap();
        assert!(device.is_known);
        assert!(!device.is_new_this_session);
    }

    #[tokio::test]
    async fn annotating_unseen_address_does_not_create_device() {
        let (_dir, service) = service().await;

        service
            .set_annotation("10.0.0.77", AnnotationRecord::default())
            .await
            .unwrap();

        assert!(service.registry().is_empty().await);
        assert!(service.list_devices().await.is_empty());
    }

    #[tokio::test]
    async fn listing_merges_annotations_in_address_order() {
        let (_dir, service) = service().await;
        service
            .registry()
            .reconcile(
                vec![online("10.0.0.10"), online("10.0.0.9"), online("10.0.0.100")],
                service.store(),
            )
            .await;
        service
            .set_annotation(
                "10.0.0.9",
                AnnotationRecord {
                    owner: "Bob".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let views = service.list_devices().await;

        let order: Vec<&str> = views.iter().map(|v| v.device.address.as_str()).collect();
        assert_eq!(order, vec!["10.0.0.9", "10.0.0.10", "10.0.0.100"]);
        assert_eq!(views[0].annotation.owner, "Bob");
        assert_eq!(views[1].annotation, AnnotationRecord::default());
    }

    #[tokio::test]
    async fn failed_write_leaves_registry_alone() {
        let dir = tempfile::tempdir().unwrap();
        // parent directory does not exist, so every write fails
        let store = Arc::new(AnnotationStore::load(dir.path().join("missing/device_data.json")).await);
        let service = DeviceService::new(Arc::new(DeviceRegistry::new()), store);
        service
            .registry()
            .reconcile(vec![online("10.0.0.5")], service.store())
            .await;

        let record = AnnotationRecord {
            is_known: true,
            ..Default::default()
        };
        assert!(service.set_annotation("10.0.0.5", record).await.is_err());

        let device = service.registry().get("10.0.0.5").await.unwrap();
        assert!(!device.is_known);
        assert!(device.is_new_this_session);
        assert_eq!(service.get_annotation("10.0.0.5").await, AnnotationRecord::default());
    }
}
