//! qp-client: QuietPost relay messaging client
//!
//! Ties the crates together: the relay HTTP client, the handshake and
//! message engines, the background sync loop, and the user-facing
//! event log. The terminal front-end is deliberately thin (a CLI);
//! everything interesting happens here.

pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod handshake;
pub mod keyfile;
pub mod message;
pub mod relay;
pub mod sync;

pub use engine::SyncEngine;
pub use error::ClientError;
