use super::VerifyError;

/// AAGUID tagging keys generated in the App Attest development environment.
pub const AAGUID_DEVELOPMENT: [u8; 16] = *b"appattestdevelop";
/// AAGUID tagging production keys: `"appattest"` followed by seven NULs.
pub const AAGUID_PRODUCTION: [u8; 16] = *b"appattest\0\0\0\0\0\0\0";

/// Attestation authenticator data, big-endian fixed offsets:
///   [0..32]   rpIdHash = SHA-256(teamId.bundleId)
///   [32]      flags
///   [33..37]  signCount (u32)
///   [37..53]  AAGUID
///   [53..55]  credentialIdLength (u16)
///   [55..]    credentialId
#[derive(Debug, Clone)]
pub struct AttestedAuthData {
    pub rp_id_hash: [u8; 32],
    pub flags: u8,
    pub sign_count: u32,
    pub aaguid: [u8; 16],
    pub credential_id: Vec<u8>,
}

/// The 37-byte assertion prefix: rpIdHash, flags, signCount.
#[derive(Debug, Clone)]
pub struct AssertionAuthData {
    pub rp_id_hash: [u8; 32],
    pub flags: u8,
    pub sign_count: u32,
}

impl AttestedAuthData {
    pub fn parse(data: &[u8]) -> Result<Self, VerifyError> {
        if data.len() < 55 {
            return Err(VerifyError::TruncatedAuthData);
        }
        let cred_id_len = u16::from_be_bytes([data[53], data[54]]) as usize;
        if data.len() < 55 + cred_id_len {
            return Err(VerifyError::TruncatedAuthData);
        }
        Ok(AttestedAuthData {
            rp_id_hash: data[0..32].try_into().expect("slice is 32 bytes"),
            flags: data[32],
            sign_count: u32::from_be_bytes(data[33..37].try_into().expect("slice is 4 bytes")),
            aaguid: data[37..53].try_into().expect("slice is 16 bytes"),
            credential_id: data[55..55 + cred_id_len].to_vec(),
        })
    }
}

impl AssertionAuthData {
    pub fn parse(data: &[u8]) -> Result<Self, VerifyError> {
        if data.len() < 37 {
            return Err(VerifyError::TruncatedAuthData);
        }
        Ok(AssertionAuthData {
            rp_id_hash: data[0..32].try_into().expect("slice is 32 bytes"),
            flags: data[32],
            sign_count: u32::from_be_bytes(data[33..37].try_into().expect("slice is 4 bytes")),
        })
    }
}
