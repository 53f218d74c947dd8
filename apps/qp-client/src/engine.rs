//! The sync engine: one fetch cycle from request to committed state.

use std::sync::Arc;

use qp_crypto::identity::IdentityKeyPair;
use qp_proto::codec;
use qp_proto::wire::{FetchData, FetchRequest};
use qp_store::db::Store;

use crate::batch::FetchCache;
use crate::error::ClientError;
use crate::events::EventLog;
use crate::handshake;
use crate::message;
use crate::relay::Relay;

/// Shared handles for everything the engines touch. Cheap to clone.
#[derive(Clone)]
pub struct SyncEngine {
    pub store: Store,
    pub relay: Arc<dyn Relay>,
    pub identity: Arc<IdentityKeyPair>,
    pub events: Arc<EventLog>,
}

impl SyncEngine {
    pub fn new(
        store: Store,
        relay: Arc<dyn Relay>,
        identity: Arc<IdentityKeyPair>,
        events: Arc<EventLog>,
    ) -> Self {
        Self { store, relay, identity, events }
    }

    /// One fetch cycle: ask the relay for everything addressed to us
    /// from known contacts and apply it. A client with no contacts has
    /// nothing to fetch.
    pub async fn fetch_and_apply(&self) -> Result<(), ClientError> {
        let sender_keys = self.store.contact_keys().await?;
        if sender_keys.is_empty() {
            return Ok(());
        }
        let request = FetchRequest {
            public_key: self.identity.public_b64(),
            sender_keys,
        };
        let response = self.relay.fetch(&request).await?;
        self.apply_fetch(&response.data).await
    }

    /// Apply one fetched batch in a single transaction: exchange keys
    /// first (in batch order, so an offer earlier in the batch is
    /// visible to a response or message later in it), then messages.
    /// Elements that fail validation are dropped individually; the
    /// batch still commits.
    pub async fn apply_fetch(&self, data: &FetchData) -> Result<(), ClientError> {
        let mut tx = self.store.begin().await?;
        let mut cache = FetchCache::new();

        for raw in &data.exchange_keys {
            match codec::decode_exchange_key(raw) {
                Ok(element) => {
                    handshake::ingest_exchange_key(&mut tx, &mut cache, &element).await?
                }
                Err(e) => tracing::debug!(error = %e, "invalid exchange key dropped"),
            }
        }
        for raw in &data.messages {
            match codec::decode_message(raw) {
                Ok(element) => message::ingest_message(&mut tx, &mut cache, &element).await?,
                Err(e) => tracing::debug!(error = %e, "invalid message dropped"),
            }
        }

        tx.commit().await?;
        Ok(())
    }
}
