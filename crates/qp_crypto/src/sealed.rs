//! Authenticated symmetric tokens.
//!
//! Uses XChaCha20-Poly1305 (192-bit nonce). Key size: 32 bytes.
//! Nonce: 24 bytes (random). Tag: 16 bytes.
//!
//! Token format, base64 (urlsafe, padded) over:
//!   [ issued_at (u64 BE, seconds) | nonce (24 bytes) | ciphertext + tag ]
//!
//! The timestamp is authenticated as AAD, so a tampered clock field
//! fails `open` the same way a tampered ciphertext does.

use std::time::{SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::URL_SAFE, Engine};
use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng as AeadOsRng},
    XChaCha20Poly1305,
};

use crate::error::CryptoError;

const TS_LEN: usize = 8;
const NONCE_LEN: usize = 24;

/// Encrypt `plaintext` under a 32-byte key into a portable token.
pub fn seal(key: &[u8; 32], plaintext: &[u8]) -> Result<String, CryptoError> {
    let cipher = XChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::Seal)?;

    let issued_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| CryptoError::Seal)?
        .as_secs();
    let ts_bytes = issued_at.to_be_bytes();

    let nonce = XChaCha20Poly1305::generate_nonce(&mut AeadOsRng);
    let ciphertext = cipher
        .encrypt(
            &nonce,
            chacha20poly1305::aead::Payload { msg: plaintext, aad: &ts_bytes },
        )
        .map_err(|_| CryptoError::Seal)?;

    let mut out = Vec::with_capacity(TS_LEN + NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&ts_bytes);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(URL_SAFE.encode(out))
}

/// Decrypt a token. Fails on tampering, truncation, or a wrong key;
/// never yields garbage plaintext.
pub fn open(key: &[u8; 32], token: &str) -> Result<Vec<u8>, CryptoError> {
    let data = URL_SAFE.decode(token).map_err(|_| CryptoError::Open)?;
    if data.len() < TS_LEN + NONCE_LEN {
        return Err(CryptoError::Open);
    }
    let (ts_bytes, rest) = data.split_at(TS_LEN);
    let (nonce_bytes, ct) = rest.split_at(NONCE_LEN);
    let nonce = chacha20poly1305::XNonce::from_slice(nonce_bytes);

    let cipher = XChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::Open)?;
    cipher
        .decrypt(nonce, chacha20poly1305::aead::Payload { msg: ct, aad: ts_bytes })
        .map_err(|_| CryptoError::Open)
}
