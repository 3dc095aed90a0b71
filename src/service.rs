use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;

use crate::appattest::chain::APPLE_ROOT_CA_PEM;
use crate::appattest::{decode_base64_any, verify_assertion, verify_attestation};
use crate::canonical;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::store::{AttestationStore, DiskStore, StoreError};

/// Maximum future clock skew accepted on the assertion `nonce` header.
const ASSERTION_MAX_SKEW_SECS: u64 = 60;
/// Maximum age accepted on the assertion `nonce` header. Anything older is
/// treated as a replay of captured headers.
const ASSERTION_MAX_AGE_SECS: u64 = 300;

/// Bounds on the decoded attestation object size.
const ATTESTATION_MIN_BYTES: usize = 100;
const ATTESTATION_MAX_BYTES: usize = 10_000;

/// Cap on the number of signed request headers.
const MAX_ASSERTION_INPUTS: usize = 20;

/// One assertion-protected request, as assembled by the HTTP layer from
/// the `device-id`, `key-id`, `signature` and `nonce` headers plus the
/// headers named in `assertion-inputs` (lowercased name -> value).
#[derive(Debug, Clone)]
pub struct AssertionRequest {
    pub device_id: String,
    pub key_id: String,
    /// base64 CBOR assertion envelope.
    pub signature: String,
    /// The `nonce` header: Unix epoch seconds as a decimal string.
    pub timestamp: String,
    pub client_data: BTreeMap<String, String>,
}

/// Composition root: validated configuration, the store, and the trust
/// anchor, shared by every request handler.
pub struct Service<S> {
    team_id: String,
    bundle_id: String,
    dev_mode: bool,
    root_pem: Vec<u8>,
    store: S,
}

impl Service<DiskStore> {
    /// Open the file-backed store at the configured data directory.
    pub fn open(config: &Config) -> Result<Self> {
        let store = DiskStore::open(config.data_dir.clone())?;
        Self::new(config, store)
    }
}

impl<S: AttestationStore> Service<S> {
    pub fn new(config: &Config, store: S) -> Result<Self> {
        config.validate()?;
        tracing::info!(
            team_id = %config.team_id,
            bundle_id = %config.bundle_id,
            dev_mode = config.dev_mode(),
            "Attestation service ready"
        );
        Ok(Service {
            team_id: config.team_id.clone(),
            bundle_id: config.bundle_id.clone(),
            dev_mode: config.dev_mode(),
            root_pem: APPLE_ROOT_CA_PEM.to_vec(),
            store,
        })
    }

    /// Swap the trust anchor. Test builds verify against a synthetic CA;
    /// production never calls this.
    pub fn with_root_pem(mut self, root_pem: Vec<u8>) -> Self {
        self.root_pem = root_pem;
        self
    }

    /// Issue a fresh 32-byte challenge for `device_id`, replacing any
    /// previously issued one.
    pub fn issue_nonce(&self, device_id: &str) -> Result<String> {
        check_device_id(device_id)?;
        let mut raw = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut raw);
        let nonce = STANDARD.encode(raw);
        self.store.put_nonce(device_id, &nonce, unix_now())?;
        tracing::info!(device_id, "Issued attestation nonce");
        Ok(nonce)
    }

    /// Register a device's attested key: consume the pending nonce, run the
    /// attestation pipeline against the trust anchor, persist the key.
    pub fn register_attestation(
        &self,
        device_id: &str,
        key_id: &str,
        attestation_b64: &str,
    ) -> Result<()> {
        check_device_id(device_id)?;
        check_key_id(key_id)?;
        let payload = decode_base64_any(attestation_b64)
            .ok_or_else(|| Error::InvalidInput("attestationObject is not base64".into()))?;
        if payload.len() < ATTESTATION_MIN_BYTES || payload.len() > ATTESTATION_MAX_BYTES {
            return Err(Error::InvalidInput("attestationObject size out of range".into()));
        }

        let nonce = self
            .store
            .get(device_id)?
            .and_then(|record| record.nonce)
            .ok_or(Error::NoPendingNonce)?;

        let public_key_pem = verify_attestation(
            &nonce,
            key_id,
            &payload,
            &self.team_id,
            &self.bundle_id,
            self.dev_mode,
            &self.root_pem,
            unix_now(),
        )
        .map_err(|e| {
            tracing::warn!(device_id, error = %e, "Attestation rejected");
            e
        })?;

        match self.store.put_attestation(device_id, key_id, &public_key_pem, unix_now()) {
            Ok(()) => {}
            Err(StoreError::KeyIdTaken) => {
                tracing::warn!(device_id, key_id, "Key id already bound to another device");
                return Err(Error::InvalidInput("key id already registered".into()));
            }
            Err(StoreError::NoRecord) => return Err(Error::NoPendingNonce),
            Err(e) => return Err(e.into()),
        }
        tracing::info!(device_id, key_id, "Device attested");
        Ok(())
    }

    /// Verify an assertion-protected request and advance the counter.
    /// Returns the new counter on success. `NoKeyForDevice` (HTTP 422)
    /// tells the client to restart from nonce issuance.
    pub fn verify_and_advance(&self, request: &AssertionRequest) -> Result<u32> {
        check_device_id(&request.device_id)?;
        check_key_id(&request.key_id)?;
        check_assertion_inputs(&request.client_data)?;
        check_timestamp(&request.timestamp, unix_now())?;

        let record = self
            .store
            .lookup(&request.device_id, &request.key_id)?
            .ok_or(Error::NoKeyForDevice)?;
        let public_key_pem = record.public_key_pem.ok_or(Error::NoKeyForDevice)?;

        let client_data_hash = canonical::client_data_hash(&request.client_data);
        let new_counter = verify_assertion(
            &request.signature,
            &client_data_hash,
            &public_key_pem,
            record.counter,
            &self.team_id,
            &self.bundle_id,
        )
        .map_err(|e| {
            tracing::warn!(device_id = %request.device_id, error = %e, "Assertion rejected");
            e
        })?;

        let advanced = self.store.advance_counter(
            &request.device_id,
            &request.key_id,
            record.counter,
            new_counter,
            unix_now(),
        )?;
        if !advanced {
            // A concurrent assertion won the race; this one is a replay
            // from the store's point of view.
            tracing::warn!(device_id = %request.device_id, "Lost counter race");
            return Err(crate::appattest::VerifyError::CounterRegression.into());
        }

        tracing::debug!(
            device_id = %request.device_id,
            counter = new_counter,
            "Assertion accepted"
        );
        Ok(new_counter)
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn check_device_id(device_id: &str) -> Result<()> {
    let ok = (8..=64).contains(&device_id.len())
        && device_id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-');
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidInput("device id must be 8-64 chars of [A-Za-z0-9-]".into()))
    }
}

fn check_key_id(key_id: &str) -> Result<()> {
    let ok = key_id.len() == 44
        && decode_base64_any(key_id).map_or(false, |raw| raw.len() == 32);
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidInput("key id must be 44-char base64 of 32 bytes".into()))
    }
}

fn check_assertion_inputs(client_data: &BTreeMap<String, String>) -> Result<()> {
    if client_data.len() > MAX_ASSERTION_INPUTS {
        return Err(Error::InvalidInput("too many assertion inputs".into()));
    }
    for name in client_data.keys() {
        let ok = (1..=50).contains(&name.len())
            && name
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-');
        if !ok {
            return Err(Error::InvalidInput(format!(
                "invalid assertion input name {name:?}"
            )));
        }
    }
    Ok(())
}

/// The assertion `nonce` header carries the client's clock in epoch
/// seconds. Tolerate +60s of skew and 300s of age; anything outside that
/// window is a replayed capture.
fn check_timestamp(header: &str, now: u64) -> Result<()> {
    let ts: u64 = header
        .parse()
        .map_err(|_| Error::InvalidInput("nonce header is not epoch seconds".into()))?;
    if ts > now + ASSERTION_MAX_SKEW_SECS || ts + ASSERTION_MAX_AGE_SECS < now {
        return Err(Error::StaleNonce);
    }
    Ok(())
}
