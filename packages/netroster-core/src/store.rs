//! Durable annotation storage.
//!
//! Annotations are the user-entered side of the roster: what a device is,
//! who owns it, where it lives. They are kept in memory behind a single lock
//! and written through to one JSON document on every change.

use crate::error::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Value used for the free-form fields the user has not filled in yet.
pub const UNSPECIFIED: &str = "unspecified";

/// User-editable metadata attached to a device address.
///
/// On the wire this is camelCase; the snake_case names used by the data
/// file are accepted as aliases so older clients keep working.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnnotationRecord {
    #[serde(alias = "device_type")]
    pub device_type: String,
    pub owner: String,
    pub location: String,
    pub notes: String,
    #[serde(alias = "is_known")]
    pub is_known: bool,
}

impl Default for AnnotationRecord {
    fn default() -> Self {
        Self {
            device_type: UNSPECIFIED.to_string(),
            owner: UNSPECIFIED.to_string(),
            location: UNSPECIFIED.to_string(),
            notes: String::new(),
            is_known: false,
        }
    }
}

/// On-disk shape of a single annotation.
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
struct StoredAnnotation {
    device_type: String,
    owner: String,
    location: String,
    notes: String,
    is_known: bool,
}

impl Default for StoredAnnotation {
    fn default() -> Self {
        AnnotationRecord::default().into()
    }
}

impl From<AnnotationRecord> for StoredAnnotation {
    fn from(record: AnnotationRecord) -> Self {
        Self {
            device_type: record.device_type,
            owner: record.owner,
            location: record.location,
            notes: record.notes,
            is_known: record.is_known,
        }
    }
}

impl From<StoredAnnotation> for AnnotationRecord {
    fn from(stored: StoredAnnotation) -> Self {
        Self {
            device_type: stored.device_type,
            owner: stored.owner,
            location: stored.location,
            notes: stored.notes,
            is_known: stored.is_known,
        }
    }
}

/// What happened when the data file was read at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// File parsed; holds the number of annotations read.
    Loaded(usize),
    /// No file yet.
    Missing,
    /// File present but unreadable or unparseable. The store started empty.
    Corrupt(String),
}

/// Address-keyed annotation store with synchronous write-through.
pub struct AnnotationStore {
    path: PathBuf,
    records: Mutex<BTreeMap<String, AnnotationRecord>>,
    load_outcome: LoadOutcome,
}

impl AnnotationStore {
    /// Load the store from `path`.
    ///
    /// Never fails: a missing or damaged file yields an empty store and a
    /// warning. A damaged file is left on disk until the next successful
    /// write replaces it.
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (records, load_outcome) = read_annotations(&path).await;

        Self {
            path,
            records: Mutex::new(records),
            load_outcome,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load_outcome(&self) -> &LoadOutcome {
        &self.load_outcome
    }

    /// Annotation for `address`, or defaults if none exists. Never persists.
    pub async fn get(&self, address: &str) -> AnnotationRecord {
        self.records
            .lock()
            .await
            .get(address)
            .cloned()
            .unwrap_or_default()
    }

    /// Like [`get`](Self::get), but remembers the defaults in memory so the
    /// address is part of the next persisted write.
    pub async fn ensure(&self, address: &str) -> AnnotationRecord {
        self.records
            .lock()
            .await
            .entry(address.to_string())
            .or_default()
            .clone()
    }

    /// Overwrite the annotation for `address` and persist the whole mapping.
    ///
    /// The lock is held until the file is written. If persistence fails the
    /// in-memory entry is restored to its previous value.
    pub async fn put(&self, address: &str, record: AnnotationRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        let previous = records.insert(address.to_string(), record);

        if let Err(e) = write_annotations(&self.path, &records).await {
            match previous {
                Some(previous) => {
                    records.insert(address.to_string(), previous);
                }
                None => {
                    records.remove(address);
                }
            }
            tracing::error!("Failed to save annotation for {}: {}", address, e);
            return Err(e);
        }

        tracing::debug!("Saved annotation for {} ({} total)", address, records.len());
        Ok(())
    }

    /// Copy of every annotation currently held, including stale ones.
    pub async fn entries(&self) -> BTreeMap<String, AnnotationRecord> {
        self.records.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

async fn read_annotations(path: &Path) -> (BTreeMap<String, AnnotationRecord>, LoadOutcome) {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(
                "No annotation file at {}, starting with an empty store",
                path.display()
            );
            return (BTreeMap::new(), LoadOutcome::Missing);
        }
        Err(e) => {
            tracing::warn!(
                "Could not read annotation file {}: {}. Starting empty; saved annotations \
                 will be lost when the next write replaces it",
                path.display(),
                e
            );
            return (BTreeMap::new(), LoadOutcome::Corrupt(e.to_string()));
        }
    };

    match serde_json::from_str::<BTreeMap<String, StoredAnnotation>>(&content) {
        Ok(stored) => {
            let records: BTreeMap<_, _> = stored
                .into_iter()
                .map(|(address, annotation)| (address, annotation.into()))
                .collect();
            tracing::info!(
                "Loaded {} annotations from {}",
                records.len(),
                path.display()
            );
            let count = records.len();
            (records, LoadOutcome::Loaded(count))
        }
        Err(e) => {
            tracing::warn!(
                "Annotation file {} is corrupt ({}). Starting empty; its contents will be \
                 lost when the next write replaces it",
                path.display(),
                e
            );
            (BTreeMap::new(), LoadOutcome::Corrupt(e.to_string()))
        }
    }
}

/// Rewrite the data file in full: temp file first, synced to disk, then
/// renamed over the old one. A failed attempt removes its temp file.
async fn write_annotations(
    path: &Path,
    records: &BTreeMap<String, AnnotationRecord>,
) -> Result<(), StoreError> {
    let stored: BTreeMap<&str, StoredAnnotation> = records
        .iter()
        .map(|(address, record)| (address.as_str(), record.clone().into()))
        .collect();
    let content = serde_json::to_string_pretty(&stored)?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let write_err = |source| StoreError::Write {
        path: path.to_path_buf(),
        source,
    };
    let result = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, path).await
    }
    .await;

    if let Err(e) = result {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(write_err(e));
    }

    Ok(())
}
