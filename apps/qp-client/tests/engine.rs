//! End-to-end engine tests against an in-memory relay.
//!
//! The fake relay keeps every posted element and redelivers all of it
//! on every fetch, which is exactly the hostile case the engines must
//! tolerate: replays, duplicates, and elements from strangers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE, Engine};
use chrono::Utc;
use parking_lot::Mutex;
use tempfile::TempDir;

use qp_client::engine::SyncEngine;
use qp_client::error::ClientError;
use qp_client::events::EventLog;
use qp_client::handshake;
use qp_client::message;
use qp_client::relay::{Relay, RelayError};
use qp_crypto::identity::IdentityKeyPair;
use qp_crypto::sealed;
use qp_proto::wire::{
    FetchData, FetchRequest, FetchResponse, PostExchangeKeyData, PostExchangeKeyRequest,
    PostExchangeKeyResponse, PostMessageData, PostMessageRequest, PostMessageResponse,
    WireExchangeKey, WireMessage,
};
use qp_store::db::Store;
use qp_store::models::Direction;

#[derive(Default)]
struct Mailbox {
    exchange_keys: Vec<WireExchangeKey>,
    messages: Vec<WireMessage>,
}

/// Append-only relay: nothing is ever cleared, every fetch redelivers.
#[derive(Default)]
struct FakeRelay {
    boxes: Mutex<HashMap<String, Mailbox>>,
    nonce_counter: AtomicU64,
}

impl FakeRelay {
    fn inject_message(&self, recipient: &str, message: WireMessage) {
        self.boxes
            .lock()
            .entry(recipient.to_string())
            .or_default()
            .messages
            .push(message);
    }
}

#[async_trait]
impl Relay for FakeRelay {
    async fn ping(&self) -> Result<(), RelayError> {
        Ok(())
    }

    async fn fetch(&self, req: &FetchRequest) -> Result<FetchResponse, RelayError> {
        let boxes = self.boxes.lock();
        let data = match boxes.get(&req.public_key) {
            Some(mailbox) => FetchData {
                exchange_keys: mailbox
                    .exchange_keys
                    .iter()
                    .filter(|k| req.sender_keys.contains(&k.sender_public_key))
                    .cloned()
                    .collect(),
                messages: mailbox
                    .messages
                    .iter()
                    .filter(|m| req.sender_keys.contains(&m.sender_public_key))
                    .cloned()
                    .collect(),
            },
            None => FetchData::default(),
        };
        Ok(FetchResponse {
            status: "success".into(),
            message: String::new(),
            data,
        })
    }

    async fn post_exchange_key(
        &self,
        req: &PostExchangeKeyRequest,
    ) -> Result<PostExchangeKeyResponse, RelayError> {
        let timestamp = Utc::now();
        self.boxes
            .lock()
            .entry(req.recipient_public_key.clone())
            .or_default()
            .exchange_keys
            .push(WireExchangeKey {
                sender_public_key: req.public_key.clone(),
                received_exchange_key: req.transmitted_exchange_key.clone(),
                initial_exchange_key: req.initial_exchange_key.clone(),
                signature: req.signature.clone(),
                timestamp,
            });
        Ok(PostExchangeKeyResponse {
            status: "success".into(),
            message: String::new(),
            data: PostExchangeKeyData { timestamp },
        })
    }

    async fn post_message(
        &self,
        req: &PostMessageRequest,
    ) -> Result<PostMessageResponse, RelayError> {
        let timestamp = Utc::now();
        let nonce = format!("{:08x}", self.nonce_counter.fetch_add(1, Ordering::Relaxed));
        self.boxes
            .lock()
            .entry(req.recipient_public_key.clone())
            .or_default()
            .messages
            .push(WireMessage {
                sender_public_key: req.public_key.clone(),
                encrypted_text: req.encrypted_text.clone(),
                nonce: nonce.clone(),
                signature: req.signature.clone(),
                timestamp,
            });
        Ok(PostMessageResponse {
            status: "success".into(),
            message: String::new(),
            data: PostMessageData { nonce, timestamp },
        })
    }
}

struct Party {
    _dir: TempDir,
    engine: SyncEngine,
}

impl Party {
    async fn new(relay: Arc<FakeRelay>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(&dir.path().join("qp.db")).await.unwrap();
        let identity = Arc::new(IdentityKeyPair::generate());
        let engine = SyncEngine::new(store, relay, identity, Arc::new(EventLog::new()));
        Self { _dir: dir, engine }
    }

    fn public_b64(&self) -> String {
        self.engine.identity.public_b64()
    }

    async fn befriend(&self, name: &str, other: &Party) -> qp_store::models::ContactRow {
        self.engine
            .store
            .add_contact(name, &other.public_b64())
            .await
            .unwrap()
    }

    async fn shared_keys(&self, contact_id: i64) -> Vec<String> {
        self.engine
            .store
            .shared_keys_for_contact(contact_id)
            .await
            .unwrap()
            .into_iter()
            .map(|row| row.key_b64)
            .collect()
    }
}

/// Offer, respond, apply: both sides derive the same key and the
/// message that follows round-trips.
#[tokio::test]
async fn full_handshake_then_message() {
    let relay = Arc::new(FakeRelay::default());
    let alice = Party::new(relay.clone()).await;
    let bob = Party::new(relay.clone()).await;
    let bob_as_seen = alice.befriend("bob", &bob).await;
    let alice_as_seen = bob.befriend("alice", &alice).await;

    handshake::initiate(&alice.engine, &bob_as_seen).await.unwrap();

    bob.engine.fetch_and_apply().await.unwrap();
    handshake::respond_to_unmatched(&bob.engine).await.unwrap();
    alice.engine.fetch_and_apply().await.unwrap();

    let alice_keys = alice.shared_keys(bob_as_seen.id).await;
    let bob_keys = bob.shared_keys(alice_as_seen.id).await;
    assert_eq!(alice_keys.len(), 1);
    assert_eq!(alice_keys, bob_keys);

    message::send(&alice.engine, &bob_as_seen, "hello bob").await.unwrap();
    bob.engine.fetch_and_apply().await.unwrap();

    let rows = bob
        .engine
        .store
        .messages_for_contact(alice_as_seen.id, &Default::default())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].body, "hello bob");
    assert_eq!(rows[0].direction, Direction::Received);

    // The sender persisted its copy under the relay-assigned nonce.
    let sent = alice
        .engine
        .store
        .messages_for_contact(bob_as_seen.id, &Default::default())
        .await
        .unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].direction, Direction::Sent);
    assert_eq!(sent[0].nonce, rows[0].nonce);
}

#[tokio::test]
async fn send_requires_a_shared_key() {
    let relay = Arc::new(FakeRelay::default());
    let alice = Party::new(relay.clone()).await;
    let bob = Party::new(relay.clone()).await;
    let bob_as_seen = alice.befriend("bob", &bob).await;

    let err = message::send(&alice.engine, &bob_as_seen, "too soon")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::NoSharedKey { .. }));
    assert_eq!(alice.engine.store.message_count().await.unwrap(), 0);
}

/// The relay redelivers everything on every fetch; reapplying a batch
/// must change nothing.
#[tokio::test]
async fn redelivered_batches_are_idempotent() {
    let relay = Arc::new(FakeRelay::default());
    let alice = Party::new(relay.clone()).await;
    let bob = Party::new(relay.clone()).await;
    let bob_as_seen = alice.befriend("bob", &bob).await;
    let alice_as_seen = bob.befriend("alice", &alice).await;

    handshake::initiate(&alice.engine, &bob_as_seen).await.unwrap();
    bob.engine.fetch_and_apply().await.unwrap();
    handshake::respond_to_unmatched(&bob.engine).await.unwrap();
    alice.engine.fetch_and_apply().await.unwrap();
    message::send(&alice.engine, &bob_as_seen, "once").await.unwrap();

    for _ in 0..3 {
        alice.engine.fetch_and_apply().await.unwrap();
        bob.engine.fetch_and_apply().await.unwrap();
        handshake::respond_to_unmatched(&bob.engine).await.unwrap();
    }

    assert_eq!(alice.shared_keys(bob_as_seen.id).await.len(), 1);
    assert_eq!(bob.shared_keys(alice_as_seen.id).await.len(), 1);
    assert_eq!(bob.engine.store.message_count().await.unwrap(), 1);
}

/// A response plus a message sealed under the just-derived key arrive
/// in one batch; the key derived mid-batch decrypts the message.
#[tokio::test]
async fn same_batch_response_and_message() {
    let relay = Arc::new(FakeRelay::default());
    let alice = Party::new(relay.clone()).await;
    let bob = Party::new(relay.clone()).await;
    let bob_as_seen = alice.befriend("bob", &bob).await;
    let alice_as_seen = bob.befriend("alice", &alice).await;

    handshake::initiate(&alice.engine, &bob_as_seen).await.unwrap();
    bob.engine.fetch_and_apply().await.unwrap();
    handshake::respond_to_unmatched(&bob.engine).await.unwrap();
    message::send(&bob.engine, &alice_as_seen, "right behind the key").await.unwrap();

    // Alice has fetched nothing yet; one cycle carries both elements.
    alice.engine.fetch_and_apply().await.unwrap();

    assert_eq!(alice.shared_keys(bob_as_seen.id).await.len(), 1);
    let rows = alice
        .engine
        .store
        .messages_for_contact(bob_as_seen.id, &Default::default())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].body, "right behind the key");
}

/// A fresh offer and a response from the same contact arrive in one
/// batch; either relative order yields exactly one shared key, one
/// unmatched offer, and a consumed sent key.
#[tokio::test]
async fn same_batch_offer_and_response_either_order() {
    for response_first in [true, false] {
        let relay = Arc::new(FakeRelay::default());
        let alice = Party::new(relay.clone()).await;
        let bob = IdentityKeyPair::generate();
        let contact = alice
            .engine
            .store
            .add_contact("bob", &bob.public_b64())
            .await
            .unwrap();

        // Alice has an offer outstanding.
        let offered = qp_crypto::exchange::ExchangeKeyPair::generate();
        alice
            .engine
            .store
            .add_sent_key(
                contact.id,
                &URL_SAFE.encode(offered.secret_bytes()),
                &offered.public().to_b64(),
            )
            .await
            .unwrap();

        let signed = |initial: Option<String>| {
            let eph = qp_crypto::exchange::ExchangeKeyPair::generate();
            let wire = WireExchangeKey {
                sender_public_key: bob.public_b64(),
                received_exchange_key: eph.public().to_b64(),
                initial_exchange_key: initial,
                signature: URL_SAFE.encode(bob.sign(eph.public().as_bytes())),
                timestamp: Utc::now(),
            };
            (wire, eph)
        };
        let (response, _) = signed(Some(offered.public().to_b64()));
        let (offer, offer_eph) = signed(None);

        let exchange_keys = if response_first {
            vec![response.clone(), offer.clone()]
        } else {
            vec![offer, response]
        };
        alice
            .engine
            .apply_fetch(&FetchData { exchange_keys, messages: vec![] })
            .await
            .unwrap();

        assert_eq!(
            alice.shared_keys(contact.id).await.len(),
            1,
            "response_first={response_first}"
        );
        let unmatched = alice.engine.store.unmatched_received_keys().await.unwrap();
        assert_eq!(unmatched.len(), 1, "response_first={response_first}");
        assert_eq!(unmatched[0].public_key, offer_eph.public().to_b64());
        assert!(alice
            .engine
            .store
            .find_sent_key(&offered.public().to_b64())
            .await
            .unwrap()
            .is_none());
    }
}

/// After rotation the newest key is tried first, but backlog sealed
/// under an older key still opens.
#[tokio::test]
async fn older_keys_still_decrypt() {
    let relay = Arc::new(FakeRelay::default());
    let alice = Party::new(relay.clone()).await;
    let bob = Party::new(relay.clone()).await;
    let bob_as_seen = alice.befriend("bob", &bob).await;
    let alice_as_seen = bob.befriend("alice", &alice).await;

    for _ in 0..2 {
        handshake::initiate(&alice.engine, &bob_as_seen).await.unwrap();
        bob.engine.fetch_and_apply().await.unwrap();
        handshake::respond_to_unmatched(&bob.engine).await.unwrap();
        alice.engine.fetch_and_apply().await.unwrap();
    }
    let keys = alice.shared_keys(bob_as_seen.id).await;
    assert_eq!(keys.len(), 2);

    // Seal under the oldest key and post it the way a peer would.
    let old_key: [u8; 32] = URL_SAFE
        .decode(keys.last().unwrap())
        .unwrap()
        .try_into()
        .unwrap();
    let token = sealed::seal(&old_key, b"from the backlog").unwrap();
    let signature = URL_SAFE.encode(alice.engine.identity.sign(token.as_bytes()));
    relay
        .post_message(&PostMessageRequest {
            public_key: alice.public_b64(),
            recipient_public_key: bob.public_b64(),
            encrypted_text: token,
            signature,
        })
        .await
        .unwrap();

    bob.engine.fetch_and_apply().await.unwrap();
    let rows = bob
        .engine
        .store
        .messages_for_contact(alice_as_seen.id, &Default::default())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].body, "from the backlog");
}

#[tokio::test]
async fn forged_message_is_dropped() {
    let relay = Arc::new(FakeRelay::default());
    let alice = Party::new(relay.clone()).await;
    let bob = Party::new(relay.clone()).await;
    let bob_as_seen = alice.befriend("bob", &bob).await;
    bob.befriend("alice", &alice).await;

    handshake::initiate(&alice.engine, &bob_as_seen).await.unwrap();
    bob.engine.fetch_and_apply().await.unwrap();
    handshake::respond_to_unmatched(&bob.engine).await.unwrap();
    alice.engine.fetch_and_apply().await.unwrap();

    // Claims to be from alice but signed by a stranger.
    let stranger = IdentityKeyPair::generate();
    let token = "Zm9yZ2Vk".to_string();
    relay.inject_message(
        &bob.public_b64(),
        WireMessage {
            sender_public_key: alice.public_b64(),
            signature: URL_SAFE.encode(stranger.sign(token.as_bytes())),
            encrypted_text: token,
            nonce: "deadbeef".into(),
            timestamp: Utc::now(),
        },
    );

    bob.engine.fetch_and_apply().await.unwrap();
    assert_eq!(bob.engine.store.message_count().await.unwrap(), 0);
}

/// A well-signed offer from a sender who is not a contact is ignored
/// even if the relay delivers it.
#[tokio::test]
async fn elements_from_strangers_are_dropped() {
    let relay = Arc::new(FakeRelay::default());
    let alice = Party::new(relay.clone()).await;
    let bob = Party::new(relay.clone()).await;
    bob.befriend("alice", &alice).await;

    let mallory = IdentityKeyPair::generate();
    let ephemeral = qp_crypto::exchange::ExchangeKeyPair::generate();
    let offer = WireExchangeKey {
        sender_public_key: mallory.public_b64(),
        received_exchange_key: ephemeral.public().to_b64(),
        initial_exchange_key: None,
        signature: URL_SAFE.encode(mallory.sign(ephemeral.public().as_bytes())),
        timestamp: Utc::now(),
    };
    bob.engine
        .apply_fetch(&FetchData { exchange_keys: vec![offer], messages: vec![] })
        .await
        .unwrap();

    assert!(bob
        .engine
        .store
        .unmatched_received_keys()
        .await
        .unwrap()
        .is_empty());
}

/// A response that references no offer of ours is discarded without
/// deriving anything.
#[tokio::test]
async fn stale_response_is_discarded() {
    let relay = Arc::new(FakeRelay::default());
    let alice = Party::new(relay.clone()).await;
    let bob = Party::new(relay.clone()).await;
    let bob_as_seen = alice.befriend("bob", &bob).await;

    let phantom = qp_crypto::exchange::ExchangeKeyPair::generate();
    let ephemeral = qp_crypto::exchange::ExchangeKeyPair::generate();
    relay
        .post_exchange_key(&PostExchangeKeyRequest {
            public_key: bob.public_b64(),
            recipient_public_key: alice.public_b64(),
            transmitted_exchange_key: ephemeral.public().to_b64(),
            initial_exchange_key: Some(phantom.public().to_b64()),
            signature: URL_SAFE.encode(bob.engine.identity.sign(ephemeral.public().as_bytes())),
        })
        .await
        .unwrap();

    alice.engine.fetch_and_apply().await.unwrap();
    assert!(alice.shared_keys(bob_as_seen.id).await.is_empty());
}
