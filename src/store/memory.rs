use std::collections::HashMap;
use std::sync::Mutex;

use super::{AttestationStore, DeviceRecord, StoreError};

/// In-memory store: a device map plus a key-id index behind one lock.
/// Used in tests and wherever durability is someone else's problem.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    by_device: HashMap<String, DeviceRecord>,
    by_key: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AttestationStore for MemoryStore {
    fn put_nonce(&self, device_id: &str, nonce: &str, now: u64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.by_device.get_mut(device_id) {
            Some(record) => {
                record.nonce = Some(nonce.to_string());
                record.updated_at = now;
            }
            None => {
                inner
                    .by_device
                    .insert(device_id.to_string(), DeviceRecord::new(device_id, nonce, now));
            }
        }
        Ok(())
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

        if let Some(old) = previous_key {
            if old != key_id {
                inner.by_key.remove(&old);
            }
        }
        inner.by_key.insert(key_id.to_string(), device_id.to_string());
        Ok(())
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
        Ok(true)
    }
}
