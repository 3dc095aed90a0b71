use p256::pkcs8::{EncodePublicKey, LineEnding};
use sha2::{Digest, Sha256};
use x509_parser::der_parser::ber::parse_ber_octetstring;
use x509_parser::der_parser::{oid, parse_der};
use x509_parser::prelude::*;

use super::auth_data::{AttestedAuthData, AAGUID_DEVELOPMENT, AAGUID_PRODUCTION};
use super::chain::verify_chain;
use super::envelope::AttestationObject;
use super::{decode_base64_any, VerifyError};

/// Run the full App Attest registration pipeline over a decoded attestation
/// payload. Every step must pass; the first failure wins.
///
/// `nonce` is the base64 challenge string exactly as issued to the device,
/// `key_id` the base64 SHA-256 of the attested public key the client claims,
/// `root_pem` the trust anchor (the embedded Apple root in production, a
/// synthetic CA in tests), and `validation_time` the moment, in seconds
/// since the Unix epoch, at which certificate validity is judged.
///
/// On success returns the credential certificate's P-256 public key
/// re-encoded as SPKI PEM, ready to be stored for assertion verification.
#[allow(clippy::too_many_arguments)]
pub fn verify_attestation(
    nonce: &str,
    key_id: &str,
    payload: &[u8],
    team_id: &str,
    bundle_id: &str,
    dev_mode: bool,
    root_pem: &[u8],
    validation_time: u64,
) -> Result<String, VerifyError> {
    let obj = AttestationObject::from_bytes(payload)?;
    let auth = AttestedAuthData::parse(&obj.auth_data)?;

    // Nonce binding: the leaf certificate carries
    // SHA-256(authData || SHA-256(challenge)) in Apple's extension.
    let client_data_hash = Sha256::digest(nonce.as_bytes());
    let expected_nonce: [u8; 32] = Sha256::new()
        .chain_update(&obj.auth_data)
        .chain_update(client_data_hash)
        .finalize()
        .into();
    let cert_nonce = extract_nonce_extension(&obj.x5c[0])?;
    if cert_nonce != expected_nonce {
        return Err(VerifyError::NonceMismatch);
    }

    verify_chain(&obj.x5c, root_pem, validation_time)?;

    // The key id the client claims must be the hash of the key the leaf
    // certificate actually certifies.
    let public_key_point = leaf_public_key_point(&obj.x5c[0])?;
    let key_id_bytes = decode_base64_any(key_id).ok_or(VerifyError::KeyIdMismatch)?;
    if Sha256::digest(&public_key_point).as_slice() != key_id_bytes.as_slice() {
        return Err(VerifyError::KeyIdMismatch);
    }

    let app_id = format!("{team_id}.{bundle_id}");
    if auth.rp_id_hash != <[u8; 32]>::from(Sha256::digest(app_id.as_bytes())) {
        return Err(VerifyError::RpIdMismatch);
    }

    if auth.sign_count != 0 {
        return Err(VerifyError::NonZeroCounter);
    }

    let expected_aaguid = if dev_mode { AAGUID_DEVELOPMENT } else { AAGUID_PRODUCTION };
    if auth.aaguid != expected_aaguid {
        return Err(VerifyError::WrongEnvironment);
    }

    if auth.credential_id != key_id_bytes {
        return Err(VerifyError::CredentialIdMismatch);
    }

    let verifying_key = p256::ecdsa::VerifyingKey::from_sec1_bytes(&public_key_point)
        .map_err(|_| VerifyError::InvalidCertChain("leaf key is not a P-256 point"))?;
    let pem = verifying_key
        .to_public_key_pem(LineEnding::LF)
        .map_err(|_| VerifyError::InvalidCertChain("leaf key is not encodable"))?;

    Ok(pem)
}

/// Pull the expected nonce out of the credential certificate's
/// 1.2.840.113635.100.8.2 extension. The value is a DER SEQUENCE holding a
/// single `[1]`-tagged OCTET STRING with the 32-byte nonce.
fn extract_nonce_extension(leaf_der: &[u8]) -> Result<[u8; 32], VerifyError> {
    let (_, cert) =
        X509Certificate::from_der(leaf_der).map_err(|_| VerifyError::NonceMismatch)?;

    let ext = cert
        .get_extension_unique(&oid!(1.2.840.113635.100.8.2))
        .map_err(|_| VerifyError::NonceMismatch)?
        .ok_or(VerifyError::NonceMismatch)?;

    let (_, content) = parse_der(ext.value).map_err(|_| VerifyError::NonceMismatch)?;
    let seq = content.as_sequence().map_err(|_| VerifyError::NonceMismatch)?;
    let tagged = seq
        .first()
        .ok_or(VerifyError::NonceMismatch)?
        .as_slice()
        .map_err(|_| VerifyError::NonceMismatch)?;
    let (_, octets) =
        parse_ber_octetstring(tagged).map_err(|_| VerifyError::NonceMismatch)?;
    let nonce = octets.as_slice().map_err(|_| VerifyError::NonceMismatch)?;

    nonce.try_into().map_err(|_| VerifyError::NonceMismatch)
}

/// The leaf certificate's public key as a SEC1 uncompressed point.
fn leaf_public_key_point(leaf_der: &[u8]) -> Result<Vec<u8>, VerifyError> {
    let (_, cert) = X509Certificate::from_der(leaf_der)
        .map_err(|_| VerifyError::InvalidCertChain("unparsable leaf"))?;
    Ok(cert.public_key().subject_public_key.data.to_vec())
}
