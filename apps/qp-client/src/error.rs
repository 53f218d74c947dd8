//! Client error taxonomy.
//!
//! Transport errors drive the connectivity state machine; protocol and
//! cryptographic failures on fetched data never reach this type (they
//! are dropped element-by-element); what remains is surfaced to the
//! user with a short category label.

use thiserror::Error;

use crate::relay::RelayError;
use qp_crypto::CryptoError;
use qp_store::StoreError;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("No messages can be sent before a successful key exchange with {contact}")]
    NoSharedKey { contact: String },

    #[error("No contact named {0:?} is known")]
    UnknownContact(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl ClientError {
    /// Short label shown alongside foreground errors.
    pub fn category(&self) -> &'static str {
        match self {
            Self::NoSharedKey { .. } => "no-encryption-key",
            Self::UnknownContact(_) => "unknown-contact",
            Self::Store(StoreError::DuplicateContactName(_))
            | Self::Store(StoreError::DuplicateVerificationKey)
            | Self::Store(StoreError::InvalidContactName) => "invalid-contact",
            Self::Store(_) => "storage",
            Self::Relay(RelayError::Timeout) => "timeout",
            Self::Relay(_) => "bad-response",
            Self::Crypto(_) => "crypto",
        }
    }
}
