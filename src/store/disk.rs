use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{AttestationStore, DeviceRecord, StoreError};

/// File-backed store: one CBOR-encoded record per device under `dir`,
/// loaded into an in-memory index at open and written through on every
/// mutation. A single lock covers index and files, which makes every
/// operation atomic per device and counter advancement linearizable.
pub struct DiskStore {
    dir: PathBuf,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    by_device: HashMap<String, DeviceRecord>,
    by_key: HashMap<String, String>,
}

impl DiskStore {
    /// Load all records from `dir`, creating it if needed. Corrupt files
    /// are logged and skipped so one bad row cannot take the service down.
    pub fn open(dir: PathBuf) -> Result<Self, StoreError> {
        std::fs::create_dir_all(&dir)?;
        let mut inner = Inner::default();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("bin") {
                continue;
            }
            let record = match read_record(&path) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Skipping corrupt device record");
                    continue;
                }
            };
            if let Some(key_id) = &record.key_id {
                if let Some(other) = inner.by_key.get(key_id) {
                    tracing::warn!(
                        key_id = %key_id,
                        device_id = %record.device_id,
                        other_device_id = %other,
                        "Skipping record with duplicate key id"
                    );
                    continue;
                }
                inner.by_key.insert(key_id.clone(), record.device_id.clone());
            }
            inner.by_device.insert(record.device_id.clone(), record);
        }
        Ok(DiskStore { dir, inner: Mutex::new(inner) })
    }

    pub fn record_count(&self) -> usize {
        self.inner.lock().unwrap().by_device.len()
    }

    fn persist(&self, record: &DeviceRecord) -> Result<(), StoreError> {
        write_record(&self.dir, record)
    }
}

impl AttestationStore for DiskStore {
    fn put_nonce(&self, device_id: &str, nonce: &str, now: u64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let record = match inner.by_device.get_mut(device_id) {
            Some(record) => {
                record.nonce = Some(nonce.to_string());
                record.updated_at = now;
                record.clone()
            }
            None => {
                let record = DeviceRecord::new(device_id, nonce, now);
                inner.by_device.insert(device_id.to_string(), record.clone());
                record
            }
        };
        self.persist(&record)
    }

    fn get(&self, device_id: &str) -> Result<Option<DeviceRecord>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.by_device.get(device_id).cloned())
    }

    fn lookup(&self, device_id: &str, key_id: &str) -> Result<Option<DeviceRecord>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .by_device
            .get(device_id)
            .filter(|r| r.key_id.as_deref() == Some(key_id))
            .cloned())
    }

    fn put_attestation(
        &self,
        device_id: &str,
        key_id: &str,
        public_key_pem: &str,
        now: u64,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(owner) = inner.by_key.get(key_id) {
            if owner != device_id {
                return Err(StoreError::KeyIdTaken);
            }
        }
        let record = inner
            .by_device
            .get_mut(device_id)
            .ok_or(StoreError::NoRecord)?;

        let previous_key = record.key_id.take();
        if record.public_key_pem.as_deref() != Some(public_key_pem) {
            record.counter = 0;
        }
        record.key_id = Some(key_id.to_string());
        record.public_key_pem = Some(public_key_pem.to_string());
        record.nonce = None;
        record.updated_at = now;
        let snapshot = record.clone();

        if let Some(old) = previous_key {
            if old != key_id {
                inner.by_key.remove(&old);
            }
        }
        inner.by_key.insert(key_id.to_string(), device_id.to_string());
        // Write under the lock so index and file never diverge.
        self.persist(&snapshot)
    }

    fn advance_counter(
        &self,
        device_id: &str,
        key_id: &str,
        expected: u32,
        new_counter: u32,
        now: u64,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let record = match inner.by_device.get_mut(device_id) {
            Some(r) if r.key_id.as_deref() == Some(key_id) => r,
            _ => return Ok(false),
        };
        if record.counter != expected {
            return Ok(false);
        }
        record.counter = new_counter;
        record.updated_at = now;
        let snapshot = record.clone();
        self.persist(&snapshot)?;
        Ok(true)
    }
}

fn record_path(dir: &Path, device_id: &str) -> PathBuf {
    let hex: String = device_id.bytes().map(|b| format!("{b:02x}")).collect();
    dir.join(format!("{hex}.bin"))
}

fn write_record(dir: &Path, record: &DeviceRecord) -> Result<(), StoreError> {
    let mut buf = Vec::new();
    ciborium::into_writer(record, &mut buf)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    std::fs::write(record_path(dir, &record.device_id), buf)?;
    Ok(())
}

fn read_record(path: &Path) -> Result<DeviceRecord, StoreError> {
    let bytes = std::fs::read(path)?;
    ciborium::from_reader(bytes.as_slice()).map_err(|e| StoreError::Corrupt(e.to_string()))
}
