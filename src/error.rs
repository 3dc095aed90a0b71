pub use crate::appattest::VerifyError;
pub use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("no pending nonce for device")]
    NoPendingNonce,
    #[error("stale assertion nonce")]
    StaleNonce,
    #[error("verification failed: {0}")]
    Verify(#[from] VerifyError),
    #[error("no attested key for device")]
    NoKeyForDevice,
    #[error("store: {0}")]
    Store(#[from] StoreError),
}

impl Error {
    /// HTTP status the external layer should answer with. 422 is the
    /// sentinel that makes the client restart from nonce issuance.
    pub fn status(&self) -> u16 {
        match self {
            Self::NoKeyForDevice => 422,
            Self::Store(_) => 500,
            _ => 400,
        }
    }

    /// Message safe to put in the response body. Verification sub-reasons
    /// stay in the logs; handing them to callers would give forgers an
    /// oracle.
    pub fn client_message(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid request",
            Self::NoPendingNonce => "no pending nonce",
            Self::StaleNonce | Self::Verify(_) => "verification failed",
            Self::NoKeyForDevice => "attestation required",
            Self::Store(_) => "internal error",
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
