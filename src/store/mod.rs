pub mod disk;
pub mod memory;
pub mod record;

pub use disk::DiskStore;
pub use memory::MemoryStore;
pub use record::DeviceRecord;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialize: {0}")]
    Serialization(String),
    #[error("Corrupt: {0}")]
    Corrupt(String),
    #[error("key id already registered to another device")]
    KeyIdTaken,
    #[error("no record for device")]
    NoRecord,
}

/// The narrow persistence capability the ceremonies need. Implementations
/// must make each operation atomic per device and `advance_counter`
/// linearizable per key id; both provided implementations do so with a
/// single interior lock.
pub trait AttestationStore: Send + Sync {
    /// Upsert the challenge for a device, creating the row on first use.
    /// A second call replaces (and thereby invalidates) the first nonce.
    fn put_nonce(&self, device_id: &str, nonce: &str, now: u64) -> Result<(), StoreError>;

    /// The device's row, if any.
    fn get(&self, device_id: &str) -> Result<Option<DeviceRecord>, StoreError>;

    /// The row for `(device_id, key_id)`; `None` unless the row exists and
    /// carries exactly that key id.
    fn lookup(&self, device_id: &str, key_id: &str) -> Result<Option<DeviceRecord>, StoreError>;

    /// Record a completed registration: set the key id and public key,
    /// consume the pending nonce, and reset the counter to zero whenever
    /// the public key changes. Fails with [`StoreError::KeyIdTaken`] if
    /// another device already holds `key_id`, and [`StoreError::NoRecord`]
    /// if the device has no row.
    fn put_attestation(
        &self,
        device_id: &str,
        key_id: &str,
        public_key_pem: &str,
        now: u64,
    ) -> Result<(), StoreError>;

    /// Compare-and-swap the counter: succeeds only while the stored value
    /// still equals `expected`. Returns `false` when the row is gone, the
    /// key no longer matches, or a concurrent assertion advanced first.
    fn advance_counter(
        &self,
        device_id: &str,
        key_id: &str,
        expected: u32,
        new_counter: u32,
        now: u64,
    ) -> Result<bool, StoreError>;
}
