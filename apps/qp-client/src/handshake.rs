//! Key-exchange engine.
//!
//! A handshake is two exchange-key posts. The initiator publishes an
//! offer and keeps the secret half locally until the response arrives.
//! The responder answers an unmatched offer with its own key (tagged
//! with the offer it answers), derives the shared secret immediately,
//! and never stores its ephemeral secret. Both sides end up with the
//! same 32-byte key filed under the same server timestamp.

use base64::{engine::general_purpose::URL_SAFE, Engine};

use qp_crypto::exchange::ExchangeKeyPair;
use qp_crypto::identity::PublicKeyBytes;
use qp_proto::element::{ExchangeOffer, ExchangeResponse, ValidatedExchangeKey};
use qp_proto::wire::PostExchangeKeyRequest;
use qp_store::db::StoreTx;
use qp_store::models::ContactRow;

use crate::batch::FetchCache;
use crate::engine::SyncEngine;
use crate::error::ClientError;
use crate::relay::RelayError;

/// Apply one validated exchange-key element inside the cycle's
/// transaction. Elements that cannot be applied (unknown sender, stale
/// response, replay) are dropped without failing the cycle.
pub async fn ingest_exchange_key(
    tx: &mut StoreTx,
    cache: &mut FetchCache,
    element: &ValidatedExchangeKey,
) -> Result<(), ClientError> {
    let sender_b64 = element.sender().to_b64();
    let Some(contact_id) = cache.contact_id(tx, &sender_b64).await? else {
        tracing::debug!(sender = %sender_b64, "exchange key from unknown sender dropped");
        return Ok(());
    };

    match element {
        ValidatedExchangeKey::Offer(offer) => ingest_offer(tx, contact_id, offer).await,
        ValidatedExchangeKey::Response(resp) => {
            ingest_response(tx, cache, contact_id, resp).await
        }
    }
}

async fn ingest_offer(
    tx: &mut StoreTx,
    contact_id: i64,
    offer: &ExchangeOffer,
) -> Result<(), ClientError> {
    let key_b64 = offer.exchange_key.to_b64();
    if tx.received_key_exists(&key_b64).await? {
        return Ok(());
    }
    tx.add_received_key(contact_id, &key_b64, false).await?;
    tracing::debug!(contact_id, "handshake offer recorded");
    Ok(())
}

async fn ingest_response(
    tx: &mut StoreTx,
    cache: &mut FetchCache,
    contact_id: i64,
    resp: &ExchangeResponse,
) -> Result<(), ClientError> {
    let key_b64 = resp.exchange_key.to_b64();
    if tx.received_key_exists(&key_b64).await? {
        return Ok(());
    }

    let initial_b64 = resp.initial_key.to_b64();
    let Some(sent) = tx.find_sent_key(&initial_b64).await? else {
        tracing::debug!(contact_id, "response to unknown offer dropped");
        return Ok(());
    };
    if sent.contact_id != contact_id {
        tracing::debug!(contact_id, "response references another contact's offer, dropped");
        return Ok(());
    }

    let secret_bytes = URL_SAFE
        .decode(&sent.private_key)
        .map_err(qp_crypto::CryptoError::from)?;
    let pair = ExchangeKeyPair::from_secret_bytes(&secret_bytes)?;
    let shared = pair.agree(&resp.exchange_key);

    tx.add_shared_key(contact_id, &URL_SAFE.encode(shared), resp.timestamp)
        .await?;
    tx.add_received_key(contact_id, &key_b64, true).await?;
    tx.delete_sent_key(sent.id).await?;
    cache.note_shared_key(contact_id, shared);
    tracing::debug!(contact_id, "handshake completed from response");
    Ok(())
}

/// Answer every unmatched offer on file. Each answer is posted first;
/// only a successful post (with its server timestamp) is persisted, so
/// a failed post leaves the offer unmatched for the next sweep.
///
/// A timeout aborts the sweep and propagates so the sync loop can flip
/// to disconnected; any other relay error is reported and the sweep
/// moves on to the next offer.
pub async fn respond_to_unmatched(engine: &SyncEngine) -> Result<(), ClientError> {
    let pending = engine.store.unmatched_received_keys().await?;
    for row in pending {
        let Some(contact) = engine.store.contact_by_id(row.contact_id).await? else {
            continue;
        };
        let peer_key = match PublicKeyBytes::from_b64(&row.public_key) {
            Ok(k) => k,
            Err(e) => {
                tracing::debug!(id = row.id, error = %e, "stored offer key undecodable, skipped");
                continue;
            }
        };

        let pair = ExchangeKeyPair::generate();
        let request = PostExchangeKeyRequest {
            public_key: engine.identity.public_b64(),
            recipient_public_key: contact.verification_key.clone(),
            transmitted_exchange_key: pair.public().to_b64(),
            initial_exchange_key: Some(row.public_key.clone()),
            signature: URL_SAFE.encode(engine.identity.sign(pair.public().as_bytes())),
        };

        match engine.relay.post_exchange_key(&request).await {
            Ok(resp) => {
                let shared = pair.agree(&peer_key);
                let mut tx = engine.store.begin().await?;
                tx.add_shared_key(contact.id, &URL_SAFE.encode(shared), resp.data.timestamp)
                    .await?;
                tx.mark_received_key_matched(row.id).await?;
                tx.commit().await?;
                engine.events.info(
                    "Key Exchange Completed",
                    format!("Shared key established with {}", contact.name),
                );
            }
            Err(RelayError::Timeout) => return Err(RelayError::Timeout.into()),
            Err(e) => {
                engine.events.error(
                    "Key Exchange Failed",
                    format!("Could not answer {}'s offer: {e}", contact.name),
                );
            }
        }
    }
    Ok(())
}

/// Start a handshake with a contact: post an offer and keep the secret
/// half until the peer's response arrives.
pub async fn initiate(engine: &SyncEngine, contact: &ContactRow) -> Result<(), ClientError> {
    let pair = ExchangeKeyPair::generate();
    let request = PostExchangeKeyRequest {
        public_key: engine.identity.public_b64(),
        recipient_public_key: contact.verification_key.clone(),
        transmitted_exchange_key: pair.public().to_b64(),
        initial_exchange_key: None,
        signature: URL_SAFE.encode(engine.identity.sign(pair.public().as_bytes())),
    };
    engine.relay.post_exchange_key(&request).await?;

    engine
        .store
        .add_sent_key(
            contact.id,
            &URL_SAFE.encode(pair.secret_bytes()),
            &pair.public().to_b64(),
        )
        .await?;
    Ok(())
}
