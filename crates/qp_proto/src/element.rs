//! Validated wire elements.
//!
//! The codec decodes each raw element exactly once into one of these
//! types; offers and responses are distinguished here as explicit
//! variants instead of by probing an optional field downstream.

use chrono::{DateTime, Utc};
use qp_crypto::identity::PublicKeyBytes;

/// An exchange-key element whose signature has been verified against
/// the claimed sender.
#[derive(Debug, Clone)]
pub enum ValidatedExchangeKey {
    /// No `initial_exchange_key`: the peer is starting a handshake.
    Offer(ExchangeOffer),
    /// References one of our earlier offers.
    Response(ExchangeResponse),
}

impl ValidatedExchangeKey {
    pub fn sender(&self) -> &PublicKeyBytes {
        match self {
            Self::Offer(o) => &o.sender,
            Self::Response(r) => &r.sender,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExchangeOffer {
    pub sender: PublicKeyBytes,
    pub exchange_key: PublicKeyBytes,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ExchangeResponse {
    pub sender: PublicKeyBytes,
    pub exchange_key: PublicKeyBytes,
    /// The public half of the `SentExchangeKey` this responds to.
    pub initial_key: PublicKeyBytes,
    pub timestamp: DateTime<Utc>,
}

/// A message element whose signature has been verified. The payload is
/// still opaque; decryption is the message engine's business.
#[derive(Debug, Clone)]
pub struct MessageElement {
    pub sender: PublicKeyBytes,
    pub encrypted_text: String,
    pub nonce: String,
    pub timestamp: DateTime<Utc>,
}
