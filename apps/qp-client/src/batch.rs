//! Per-cycle lookup cache.
//!
//! One fetch batch repeats the same senders over and over; contact and
//! shared-key lookups are memoized for the lifetime of the cycle's
//! transaction. The cache also sees writes made earlier in the same
//! cycle (a shared key derived from an offer is visible to a message
//! later in the batch) because `note_shared_key` updates it in step
//! with the transaction.

use std::collections::HashMap;

use base64::{engine::general_purpose::URL_SAFE, Engine};

use qp_store::{db::StoreTx, StoreError};

#[derive(Default)]
pub struct FetchCache {
    contact_ids: HashMap<String, Option<i64>>,
    shared_keys: HashMap<i64, Vec<[u8; 32]>>,
}

impl FetchCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Contact id for a sender's verification key, or `None` for an
    /// unknown sender. Memoized.
    pub async fn contact_id(
        &mut self,
        tx: &mut StoreTx,
        verification_key: &str,
    ) -> Result<Option<i64>, StoreError> {
        if let Some(cached) = self.contact_ids.get(verification_key) {
            return Ok(*cached);
        }
        let id = tx
            .find_contact_by_key(verification_key)
            .await?
            .map(|c| c.id);
        self.contact_ids.insert(verification_key.to_string(), id);
        Ok(id)
    }

    /// Shared keys for a contact, newest first. Rows whose base64 does
    /// not decode to 32 bytes are skipped.
    pub async fn shared_keys(
        &mut self,
        tx: &mut StoreTx,
        contact_id: i64,
    ) -> Result<Vec<[u8; 32]>, StoreError> {
        if let Some(cached) = self.shared_keys.get(&contact_id) {
            return Ok(cached.clone());
        }
        let rows = tx.shared_keys_for_contact(contact_id).await?;
        let keys: Vec<[u8; 32]> = rows
            .iter()
            .filter_map(|row| {
                URL_SAFE
                    .decode(&row.key_b64)
                    .ok()
                    .and_then(|b| <[u8; 32]>::try_from(b).ok())
            })
            .collect();
        self.shared_keys.insert(contact_id, keys.clone());
        Ok(keys)
    }

    /// Record a key derived during this cycle so later elements in the
    /// same batch can decrypt with it. Newest first.
    pub fn note_shared_key(&mut self, contact_id: i64, key: [u8; 32]) {
        self.shared_keys
            .entry(contact_id)
            .or_default()
            .insert(0, key);
    }
}
