//! Raw wire structs: these map one-to-one to JSON bodies.
//!
//! The relay has shipped several field spellings over time; aliases
//! keep older deployments decodable. Nothing here is validated beyond
//! JSON shape: the codec does that.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Requests ─────────────────────────────────────────────────────────────────

/// Ask the relay for everything addressed to `public_key` whose claimed
/// sender is in `sender_keys`. An empty list fetches nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    pub public_key: String,
    pub sender_keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostExchangeKeyRequest {
    pub public_key: String,
    pub recipient_public_key: String,
    pub transmitted_exchange_key: String,
    /// Present on responses: the offer this exchange key answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_exchange_key: Option<String>,
    /// Signature over the raw bytes of `transmitted_exchange_key`.
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostMessageRequest {
    pub public_key: String,
    pub recipient_public_key: String,
    pub encrypted_text: String,
    /// Signature over the bytes of `encrypted_text`.
    pub signature: String,
}

// ── Responses ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchResponse {
    pub status: String,
    pub message: String,
    pub data: FetchData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchData {
    #[serde(default)]
    pub exchange_keys: Vec<WireExchangeKey>,
    #[serde(default)]
    pub messages: Vec<WireMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireExchangeKey {
    #[serde(alias = "sender_verification_key", alias = "sender_key")]
    pub sender_public_key: String,
    #[serde(
        alias = "sent_exchange_key",
        alias = "key",
        alias = "exchange_key",
        alias = "transmitted_key",
        alias = "transmitted_exchange_key"
    )]
    pub received_exchange_key: String,
    #[serde(default, alias = "response_to")]
    pub initial_exchange_key: Option<String>,
    pub signature: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(alias = "sender_verification_key", alias = "sender_key")]
    pub sender_public_key: String,
    pub encrypted_text: String,
    pub nonce: String,
    pub signature: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostExchangeKeyResponse {
    pub status: String,
    pub message: String,
    pub data: PostExchangeKeyData,
}

/// Server-assigned timestamp; the caller persists it verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostExchangeKeyData {
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostMessageResponse {
    pub status: String,
    pub message: String,
    pub data: PostMessageData,
}

/// Server-assigned nonce and timestamp become the canonical record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostMessageData {
    pub nonce: String,
    pub timestamp: DateTime<Utc>,
}
