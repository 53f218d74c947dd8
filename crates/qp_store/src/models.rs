//! Database row models: these map to/from SQL rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ContactRow {
    pub id: i64,
    pub name: String,
    /// Padded urlsafe base64 of the contact's 32-byte Ed25519 key.
    pub verification_key: String,
}

/// Derived symmetric key for one contact. A contact accumulates several
/// over time (rotation); never mutated or deleted: old keys still
/// decrypt backlog.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SharedKeyRow {
    pub id: i64,
    pub contact_id: i64,
    /// Base64 of the 32-byte shared secret.
    pub key_b64: String,
    /// Server-assigned timestamp of the completing exchange.
    pub timestamp: DateTime<Utc>,
}

/// An agreement keypair we posted and whose response is still pending.
/// Deleted once the matching response is consumed.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SentExchangeKeyRow {
    pub id: i64,
    pub contact_id: i64,
    /// Local-only secret; never leaves this machine.
    pub private_key: String,
    pub public_key: String,
}

/// An ephemeral public key received from a contact. Kept forever as a
/// record of handshake completion; `matched` flips once answered.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReceivedExchangeKeyRow {
    pub id: i64,
    pub contact_id: i64,
    pub public_key: String,
    pub matched: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum Direction {
    #[sqlx(rename = "S")]
    #[serde(rename = "S")]
    Sent,
    #[sqlx(rename = "R")]
    #[serde(rename = "R")]
    Received,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MessageRow {
    pub id: i64,
    pub contact_id: i64,
    /// Plaintext: the local database is trusted storage.
    pub body: String,
    /// Server-assigned timestamp, persisted verbatim.
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    /// Server-assigned hex nonce; UNIQUE is the replay guard.
    pub nonce: String,
}
