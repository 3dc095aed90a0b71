pub mod assertion;
pub mod attestation;
pub mod auth_data;
pub mod chain;
pub mod envelope;

pub use assertion::verify_assertion;
pub use attestation::verify_attestation;

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;

/// Why an attestation or assertion was rejected. Operators see the specific
/// variant in logs; clients only ever get the generic mapping from
/// `Error::client_message`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("malformed CBOR: {0}")]        MalformedCbor(String),
    #[error("truncated authenticator data")] TruncatedAuthData,
    #[error("nonce mismatch")]             NonceMismatch,
    #[error("invalid certificate chain: {0}")] InvalidCertChain(&'static str),
    #[error("key id mismatch")]            KeyIdMismatch,
    #[error("rp id mismatch")]             RpIdMismatch,
    #[error("non-zero counter in fresh attestation")] NonZeroCounter,
    #[error("wrong attestation environment")] WrongEnvironment,
    #[error("credential id mismatch")]     CredentialIdMismatch,
    #[error("bad signature")]              BadSignature,
    #[error("counter regression")]         CounterRegression,
}

/// Decode base64 accepting standard and URL-safe alphabets, padded or not.
/// iOS clients are not consistent about which they send, and the service
/// this replaces accepted all four forms.
pub(crate) fn decode_base64_any(s: &str) -> Option<Vec<u8>> {
    let s = s.trim();
    STANDARD
        .decode(s)
        .or_else(|_| STANDARD_NO_PAD.decode(s))
        .or_else(|_| URL_SAFE.decode(s))
        .or_else(|_| URL_SAFE_NO_PAD.decode(s))
        .ok()
}
