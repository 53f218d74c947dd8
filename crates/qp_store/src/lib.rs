//! qp_store: Local database for QuietPost
//!
//! Durable relational storage of contacts, exchange-key state, derived
//! shared keys, and message history. The store exclusively owns all
//! persisted entities; the engines above it hold no state across calls.
//!
//! # Concurrency
//! One internal write lock serializes every writer; `Store::begin`
//! hands out a transaction that keeps the lock for a whole
//! fetch/handshake cycle. See `db` for details.
//!
//! # Migration
//! SQLx migrations in `migrations/` run on open.

pub mod db;
pub mod error;
pub mod models;

pub use db::{Store, StoreTx};
pub use error::StoreError;
pub use models::Direction;
