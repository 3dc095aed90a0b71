use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};
use p256::pkcs8::DecodePublicKey;
use sha2::{Digest, Sha256};

use super::auth_data::AssertionAuthData;
use super::envelope::AssertionEnvelope;
use super::VerifyError;

/// Verify one assertion against the stored public key and counter.
///
/// `client_data_hash` is the SHA-256 of the canonical JSON the client
/// signed (see `canonical`). The signed message is
/// `SHA-256(authenticatorData || clientDataHash)`, handed to an
/// ECDSA-SHA256 verifier which hashes it once more, matching the iOS
/// client library.
///
/// Returns the assertion's counter, which the caller must persist; it is
/// only accepted when strictly greater than `stored_counter`.
pub fn verify_assertion(
    signature_b64: &str,
    client_data_hash: &[u8; 32],
    public_key_pem: &str,
    stored_counter: u32,
    team_id: &str,
    bundle_id: &str,
) -> Result<u32, VerifyError> {
    let envelope = AssertionEnvelope::from_base64(signature_b64)?;
    let auth = AssertionAuthData::parse(&envelope.authenticator_data)?;

    let nonce: [u8; 32] = Sha256::new()
        .chain_update(&envelope.authenticator_data)
        .chain_update(client_data_hash)
        .finalize()
        .into();

    let verifying_key =
        VerifyingKey::from_public_key_pem(public_key_pem).map_err(|_| VerifyError::BadSignature)?;
    let signature =
        Signature::from_der(&envelope.signature).map_err(|_| VerifyError::BadSignature)?;
    verifying_key
        .verify(&nonce, &signature)
        .map_err(|_| VerifyError::BadSignature)?;

    let app_id = format!("{team_id}.{bundle_id}");
    if auth.rp_id_hash != <[u8; 32]>::from(Sha256::digest(app_id.as_bytes())) {
        return Err(VerifyError::RpIdMismatch);
    }

    if auth.sign_count <= stored_counter {
        return Err(VerifyError::CounterRegression);
    }

    Ok(auth.sign_count)
}
