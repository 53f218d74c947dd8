//! Ephemeral X25519 key agreement.
//!
//! One agreement keypair is generated per handshake round. The offering
//! side keeps the secret half locally (`sent_exchange_keys`) until the
//! peer's response arrives; the responding side generates, agrees, and
//! discards its secret in one step. The 32-byte shared secret is used
//! directly as the symmetric key for `sealed` tokens.

use rand::rngs::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::ZeroizeOnDrop;

use crate::error::CryptoError;
use crate::identity::PublicKeyBytes;

/// Ephemeral agreement keypair. The secret is reusable (the offer side
/// must hold it until a response arrives) and zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct ExchangeKeyPair {
    secret_bytes: [u8; 32],
    #[zeroize(skip)]
    public: PublicKeyBytes,
}

impl ExchangeKeyPair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKeyBytes(*PublicKey::from(&secret).as_bytes());
        Self { secret_bytes: secret.to_bytes(), public }
    }

    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKey(format!("Exchange key must be 32 bytes, got {}", bytes.len()))
        })?;
        let secret = StaticSecret::from(arr);
        let public = PublicKeyBytes(*PublicKey::from(&secret).as_bytes());
        Ok(Self { secret_bytes: arr, public })
    }

    pub fn public(&self) -> &PublicKeyBytes {
        &self.public
    }

    pub fn secret_bytes(&self) -> &[u8; 32] {
        &self.secret_bytes
    }

    /// Compute the 32-byte shared secret with a peer's public key.
    /// Symmetric: `a.agree(b.public()) == b.agree(a.public())`.
    pub fn agree(&self, peer_public: &PublicKeyBytes) -> [u8; 32] {
        let secret = StaticSecret::from(self.secret_bytes);
        let peer = PublicKey::from(peer_public.0);
        secret.diffie_hellman(&peer).to_bytes()
    }
}
