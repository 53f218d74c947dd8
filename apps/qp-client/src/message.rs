//! Message engine: decrypting fetched messages and sending new ones.

use base64::{engine::general_purpose::URL_SAFE, Engine};

use qp_crypto::sealed;
use qp_proto::element::MessageElement;
use qp_proto::wire::PostMessageRequest;
use qp_store::db::StoreTx;
use qp_store::models::{ContactRow, Direction};

use crate::batch::FetchCache;
use crate::engine::SyncEngine;
use crate::error::ClientError;

/// Apply one validated message element inside the cycle's transaction.
///
/// Decryption is tried against the contact's shared keys newest first,
/// so backlog sealed under a rotated-out key still opens. A message
/// that opens under no key (or is not UTF-8) is dropped; it may have
/// been sealed under a key the handshake lost.
pub async fn ingest_message(
    tx: &mut StoreTx,
    cache: &mut FetchCache,
    element: &MessageElement,
) -> Result<(), ClientError> {
    let sender_b64 = element.sender.to_b64();
    let Some(contact_id) = cache.contact_id(tx, &sender_b64).await? else {
        tracing::debug!(sender = %sender_b64, "message from unknown sender dropped");
        return Ok(());
    };

    if tx.message_exists(&element.nonce).await? {
        return Ok(());
    }

    let keys = cache.shared_keys(tx, contact_id).await?;
    let Some(plaintext) = keys
        .iter()
        .find_map(|key| sealed::open(key, &element.encrypted_text).ok())
    else {
        tracing::debug!(contact_id, nonce = %element.nonce, "message opened under no shared key, dropped");
        return Ok(());
    };
    let Ok(body) = String::from_utf8(plaintext) else {
        tracing::debug!(contact_id, nonce = %element.nonce, "message body is not UTF-8, dropped");
        return Ok(());
    };

    tx.add_message(
        contact_id,
        &body,
        element.timestamp,
        Direction::Received,
        &element.nonce,
    )
    .await?;
    Ok(())
}

/// Encrypt `text` under the contact's newest shared key, post it, and
/// persist the sent copy under the server-assigned nonce and timestamp.
pub async fn send(
    engine: &SyncEngine,
    contact: &ContactRow,
    text: &str,
) -> Result<(), ClientError> {
    let keys = engine.store.shared_keys_for_contact(contact.id).await?;
    let newest = keys
        .first()
        .and_then(|row| {
            URL_SAFE
                .decode(&row.key_b64)
                .ok()
                .and_then(|b| <[u8; 32]>::try_from(b).ok())
        })
        .ok_or_else(|| ClientError::NoSharedKey { contact: contact.name.clone() })?;

    let token = sealed::seal(&newest, text.as_bytes())?;
    let request = PostMessageRequest {
        public_key: engine.identity.public_b64(),
        recipient_public_key: contact.verification_key.clone(),
        signature: URL_SAFE.encode(engine.identity.sign(token.as_bytes())),
        encrypted_text: token,
    };
    let resp = engine.relay.post_message(&request).await?;

    let mut tx = engine.store.begin().await?;
    tx.add_message(
        contact.id,
        text,
        resp.data.timestamp,
        Direction::Sent,
        &resp.data.nonce,
    )
    .await?;
    tx.commit().await?;
    Ok(())
}
