use serde::{Deserialize, Serialize};

/// The single persisted entity: one row per device, keyed by the
/// client-chosen device id and, once attested, by the key id as well.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub version:        u8,
    pub device_id:      String,
    /// base64 SHA-256 of the attested public key; None until registration.
    pub key_id:         Option<String>,
    /// Most recently issued challenge; consumed by registration.
    pub nonce:          Option<String>,
    /// SPKI PEM of the attested P-256 key; None until registration.
    pub public_key_pem: Option<String>,
    /// Strictly monotonic assertion counter.
    pub counter:        u32,
    pub created_at:     u64,
    pub updated_at:     u64,
}

impl DeviceRecord {
    pub(crate) fn new(device_id: &str, nonce: &str, now: u64) -> Self {
        DeviceRecord {
            version: 1,
            device_id: device_id.to_string(),
            key_id: None,
            nonce: Some(nonce.to_string()),
            public_key_pem: None,
            counter: 0,
            created_at: now,
            updated_at: now,
        }
    }
}
