//! Validating decode of fetched wire elements.
//!
//! Validation order is fixed:
//!   1. structural checks (base64 shape, 32-byte keys, 64-byte
//!      signatures, hex nonce) before any cryptography;
//!   2. Ed25519 signature verification against the claimed sender key,
//!      over the exact bytes each element type signs;
//!   3. semantic checks (known contact, fresh nonce) are the engines'
//!      job, not the codec's.
//!
//! A `ProtoError` means "drop this element and move on". Forged or
//! corrupted relay data must never crash or corrupt local state, so
//! callers log at debug level at most.

use base64::{engine::general_purpose::URL_SAFE, Engine};
use thiserror::Error;

use qp_crypto::identity::{IdentityKeyPair, PublicKeyBytes};

use crate::element::{
    ExchangeOffer, ExchangeResponse, MessageElement, ValidatedExchangeKey,
};
use crate::wire::{WireExchangeKey, WireMessage};

#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("field `{0}` is not valid base64")]
    BadEncoding(&'static str),

    #[error("field `{field}` decoded to {got} bytes, expected {expected}")]
    BadLength {
        field: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("nonce is not a hex string of whole bytes")]
    BadNonce,

    #[error("signature does not match claimed sender")]
    BadSignature,
}

/// Decode a 44-char base64 field into a 32-byte key.
pub fn decode_key(field: &'static str, value: &str) -> Result<PublicKeyBytes, ProtoError> {
    let raw = URL_SAFE
        .decode(value)
        .map_err(|_| ProtoError::BadEncoding(field))?;
    let arr: [u8; 32] = raw.try_into().map_err(|b: Vec<u8>| ProtoError::BadLength {
        field,
        expected: 32,
        got: b.len(),
    })?;
    Ok(PublicKeyBytes(arr))
}

/// Decode an 88-char base64 field into a 64-byte signature.
pub fn decode_signature(value: &str) -> Result<[u8; 64], ProtoError> {
    let raw = URL_SAFE
        .decode(value)
        .map_err(|_| ProtoError::BadEncoding("signature"))?;
    raw.try_into().map_err(|b: Vec<u8>| ProtoError::BadLength {
        field: "signature",
        expected: 64,
        got: b.len(),
    })
}

/// Nonces are server-assigned hex strings of whole bytes.
fn validate_nonce(nonce: &str) -> Result<(), ProtoError> {
    if nonce.is_empty() || nonce.len() % 2 != 0 {
        return Err(ProtoError::BadNonce);
    }
    if !nonce.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ProtoError::BadNonce);
    }
    Ok(())
}

/// Validate one fetched exchange-key element. The signature covers the
/// raw bytes of the transmitted exchange key.
pub fn decode_exchange_key(
    raw: &WireExchangeKey,
) -> Result<ValidatedExchangeKey, ProtoError> {
    let sender = decode_key("sender_public_key", &raw.sender_public_key)?;
    let exchange_key = decode_key("received_exchange_key", &raw.received_exchange_key)?;
    let initial_key = raw
        .initial_exchange_key
        .as_deref()
        .map(|v| decode_key("initial_exchange_key", v))
        .transpose()?;
    let signature = decode_signature(&raw.signature)?;

    IdentityKeyPair::verify(&sender, exchange_key.as_bytes(), &signature)
        .map_err(|_| ProtoError::BadSignature)?;

    Ok(match initial_key {
        None => ValidatedExchangeKey::Offer(ExchangeOffer {
            sender,
            exchange_key,
            timestamp: raw.timestamp,
        }),
        Some(initial_key) => ValidatedExchangeKey::Response(ExchangeResponse {
            sender,
            exchange_key,
            initial_key,
            timestamp: raw.timestamp,
        }),
    })
}

/// Validate one fetched message element. The signature covers the
/// bytes of `encrypted_text`.
pub fn decode_message(raw: &WireMessage) -> Result<MessageElement, ProtoError> {
    let sender = decode_key("sender_public_key", &raw.sender_public_key)?;
    validate_nonce(&raw.nonce)?;
    let signature = decode_signature(&raw.signature)?;

    IdentityKeyPair::verify(&sender, raw.encrypted_text.as_bytes(), &signature)
        .map_err(|_| ProtoError::BadSignature)?;

    Ok(MessageElement {
        sender,
        encrypted_text: raw.encrypted_text.clone(),
        nonce: raw.nonce.clone(),
        timestamp: raw.timestamp,
    })
}
