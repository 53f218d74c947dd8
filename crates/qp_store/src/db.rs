//! Database abstraction over SQLite via sqlx.
//!
//! All writes go through a single `tokio::sync::Mutex`: either a
//! one-shot write method or a `StoreTx`, which holds the lock for the
//! whole fetch/handshake cycle so its multi-row updates commit as one
//! atomic, serialized unit. Reads run on the pool without the lock and
//! observe a consistent WAL snapshot.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool},
    SqliteExecutor, Transaction,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::StoreError;
use crate::models::{
    ContactRow, Direction, MessageRow, ReceivedExchangeKeyRow, SentExchangeKeyRow, SharedKeyRow,
};

/// Central store handle. Cheap to clone (Arc internally).
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

impl Store {
    /// Open (or create) the SQLite database at `db_path` and run all
    /// pending migrations.
    ///
    /// WAL journal mode and foreign-key enforcement are configured at
    /// connection time, not inside a migration: SQLite forbids
    /// changing `journal_mode` inside a transaction and sqlx wraps
    /// every migration in one.
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        let opts = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePool::connect_with(opts).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        tracing::debug!(path = %db_path.display(), "store opened");
        Ok(Self { pool, write_lock: Arc::new(Mutex::new(())) })
    }

    /// Begin a serialized write transaction for one fetch/handshake
    /// cycle. Holds the write lock until commit or drop (rollback).
    pub async fn begin(&self) -> Result<StoreTx, StoreError> {
        let guard = self.write_lock.clone().lock_owned().await;
        let tx = self.pool.begin().await?;
        Ok(StoreTx { tx, _guard: guard })
    }

    // ── Contacts ─────────────────────────────────────────────────────────────

    pub async fn add_contact(
        &self,
        name: &str,
        verification_key: &str,
    ) -> Result<ContactRow, StoreError> {
        // Characters, not bytes, matching the schema's length() check.
        if name.is_empty() || name.chars().count() > 255 {
            return Err(StoreError::InvalidContactName);
        }
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query_as::<_, ContactRow>(
            "INSERT INTO contacts (name, verification_key) VALUES (?, ?) RETURNING *",
        )
        .bind(name)
        .bind(verification_key)
        .fetch_one(&self.pool)
        .await;
        result.map_err(|e| map_contact_conflict(e, name))
    }

    /// Remove a contact and, via cascade, all state derived from it.
    pub async fn delete_contact(&self, contact_id: i64) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let done = sqlx::query("DELETE FROM contacts WHERE id = ?")
            .bind(contact_id)
            .execute(&self.pool)
            .await?;
        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("contact {contact_id}")));
        }
        Ok(())
    }

    pub async fn list_contacts(&self) -> Result<Vec<ContactRow>, StoreError> {
        Ok(
            sqlx::query_as::<_, ContactRow>("SELECT * FROM contacts ORDER BY name")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    pub async fn contact_by_id(&self, id: i64) -> Result<Option<ContactRow>, StoreError> {
        Ok(sqlx::query_as::<_, ContactRow>("SELECT * FROM contacts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn contact_by_name(&self, name: &str) -> Result<Option<ContactRow>, StoreError> {
        Ok(sqlx::query_as::<_, ContactRow>("SELECT * FROM contacts WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn find_contact_by_key(
        &self,
        verification_key: &str,
    ) -> Result<Option<ContactRow>, StoreError> {
        find_contact_by_key(&self.pool, verification_key).await
    }

    /// Every known verification key: the sender list for a fetch.
    pub async fn contact_keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(
            sqlx::query_scalar::<_, String>("SELECT verification_key FROM contacts")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    // ── Shared keys ──────────────────────────────────────────────────────────

    pub async fn shared_keys_for_contact(
        &self,
        contact_id: i64,
    ) -> Result<Vec<SharedKeyRow>, StoreError> {
        shared_keys_for_contact(&self.pool, contact_id).await
    }

    // ── Exchange keys ────────────────────────────────────────────────────────

    pub async fn unmatched_received_keys(
        &self,
    ) -> Result<Vec<ReceivedExchangeKeyRow>, StoreError> {
        Ok(sqlx::query_as::<_, ReceivedExchangeKeyRow>(
            "SELECT * FROM received_exchange_keys WHERE matched = 0",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn add_sent_key(
        &self,
        contact_id: i64,
        private_key: &str,
        public_key: &str,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        add_sent_key(&self.pool, contact_id, private_key, public_key).await
    }

    pub async fn find_sent_key(
        &self,
        public_key: &str,
    ) -> Result<Option<SentExchangeKeyRow>, StoreError> {
        find_sent_key(&self.pool, public_key).await
    }

    // ── Messages ─────────────────────────────────────────────────────────────

    pub async fn message_exists(&self, nonce: &str) -> Result<bool, StoreError> {
        message_exists(&self.pool, nonce).await
    }

    /// Message history for a contact ordered by timestamp, skipping
    /// nonces the caller already has (incremental refresh).
    pub async fn messages_for_contact(
        &self,
        contact_id: i64,
        known_nonces: &HashSet<String>,
    ) -> Result<Vec<MessageRow>, StoreError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            "SELECT * FROM messages WHERE contact_id = ? ORDER BY timestamp",
        )
        .bind(contact_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .filter(|m| !known_nonces.contains(&m.nonce))
            .collect())
    }

    pub async fn message_count(&self) -> Result<i64, StoreError> {
        Ok(sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool)
            .await?)
    }
}

/// A serialized write transaction covering one fetch/handshake cycle.
///
/// Dropping without `commit` rolls everything back, so a crash mid-cycle
/// never leaves a shared key recorded without its matched flag (or vice
/// versa).
pub struct StoreTx {
    tx: Transaction<'static, sqlx::Sqlite>,
    _guard: OwnedMutexGuard<()>,
}

impl StoreTx {
    pub async fn commit(self) -> Result<(), StoreError> {
        Ok(self.tx.commit().await?)
    }

    pub async fn find_contact_by_key(
        &mut self,
        verification_key: &str,
    ) -> Result<Option<ContactRow>, StoreError> {
        find_contact_by_key(&mut *self.tx, verification_key).await
    }

    pub async fn shared_keys_for_contact(
        &mut self,
        contact_id: i64,
    ) -> Result<Vec<SharedKeyRow>, StoreError> {
        shared_keys_for_contact(&mut *self.tx, contact_id).await
    }

    pub async fn received_key_exists(&mut self, public_key: &str) -> Result<bool, StoreError> {
        Ok(sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM received_exchange_keys WHERE public_key = ?",
        )
        .bind(public_key)
        .fetch_one(&mut *self.tx)
        .await?
            > 0)
    }

    /// Idempotent: a duplicate public key is a no-op, so replaying the
    /// same fetch batch cannot insert twice.
    pub async fn add_received_key(
        &mut self,
        contact_id: i64,
        public_key: &str,
        matched: bool,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR IGNORE INTO received_exchange_keys (contact_id, public_key, matched) \
             VALUES (?, ?, ?)",
        )
        .bind(contact_id)
        .bind(public_key)
        .bind(matched)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    pub async fn mark_received_key_matched(&mut self, id: i64) -> Result<(), StoreError> {
        sqlx::query("UPDATE received_exchange_keys SET matched = 1 WHERE id = ?")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub async fn add_shared_key(
        &mut self,
        contact_id: i64,
        key_b64: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO shared_keys (contact_id, key_b64, timestamp) VALUES (?, ?, ?)",
        )
        .bind(contact_id)
        .bind(key_b64)
        .bind(timestamp)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    pub async fn add_sent_key(
        &mut self,
        contact_id: i64,
        private_key: &str,
        public_key: &str,
    ) -> Result<(), StoreError> {
        add_sent_key(&mut *self.tx, contact_id, private_key, public_key).await
    }

    pub async fn find_sent_key(
        &mut self,
        public_key: &str,
    ) -> Result<Option<SentExchangeKeyRow>, StoreError> {
        find_sent_key(&mut *self.tx, public_key).await
    }

    pub async fn delete_sent_key(&mut self, id: i64) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM sent_exchange_keys WHERE id = ?")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub async fn message_exists(&mut self, nonce: &str) -> Result<bool, StoreError> {
        message_exists(&mut *self.tx, nonce).await
    }

    /// Idempotent: a duplicate nonce is a no-op rather than an error
    /// that would abort the surrounding cycle.
    pub async fn add_message(
        &mut self,
        contact_id: i64,
        body: &str,
        timestamp: DateTime<Utc>,
        direction: Direction,
        nonce: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR IGNORE INTO messages (contact_id, body, timestamp, direction, nonce) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(contact_id)
        .bind(body)
        .bind(timestamp)
        .bind(direction)
        .bind(nonce)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }
}

// ── Shared query helpers ─────────────────────────────────────────────────────

async fn find_contact_by_key<'e, E: SqliteExecutor<'e>>(
    executor: E,
    verification_key: &str,
) -> Result<Option<ContactRow>, StoreError> {
    Ok(
        sqlx::query_as::<_, ContactRow>("SELECT * FROM contacts WHERE verification_key = ?")
            .bind(verification_key)
            .fetch_optional(executor)
            .await?,
    )
}

async fn shared_keys_for_contact<'e, E: SqliteExecutor<'e>>(
    executor: E,
    contact_id: i64,
) -> Result<Vec<SharedKeyRow>, StoreError> {
    Ok(sqlx::query_as::<_, SharedKeyRow>(
        "SELECT * FROM shared_keys WHERE contact_id = ? ORDER BY timestamp DESC, id DESC",
    )
    .bind(contact_id)
    .fetch_all(executor)
    .await?)
}

async fn find_sent_key<'e, E: SqliteExecutor<'e>>(
    executor: E,
    public_key: &str,
) -> Result<Option<SentExchangeKeyRow>, StoreError> {
    Ok(sqlx::query_as::<_, SentExchangeKeyRow>(
        "SELECT * FROM sent_exchange_keys WHERE public_key = ?",
    )
    .bind(public_key)
    .fetch_optional(executor)
    .await?)
}

async fn message_exists<'e, E: SqliteExecutor<'e>>(
    executor: E,
    nonce: &str,
) -> Result<bool, StoreError> {
    Ok(
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM messages WHERE nonce = ?")
            .bind(nonce)
            .fetch_one(executor)
            .await?
            > 0,
    )
}

async fn add_sent_key<'e, E: SqliteExecutor<'e>>(
    executor: E,
    contact_id: i64,
    private_key: &str,
    public_key: &str,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO sent_exchange_keys (contact_id, private_key, public_key) VALUES (?, ?, ?)",
    )
    .bind(contact_id)
    .bind(private_key)
    .bind(public_key)
    .execute(executor)
    .await?;
    Ok(())
}

fn map_contact_conflict(err: sqlx::Error, name: &str) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.is_unique_violation() {
            let msg = db_err.message();
            if msg.contains("contacts.name") {
                return StoreError::DuplicateContactName(name.to_string());
            }
            if msg.contains("contacts.verification_key") {
                return StoreError::DuplicateVerificationKey;
            }
        }
    }
    StoreError::Database(err)
}
