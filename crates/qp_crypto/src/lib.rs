//! qp_crypto: QuietPost cryptographic primitives
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Zeroize secret material on drop.
//! - Public APIs take and return opaque newtypes to prevent misuse.
//!
//! # Module layout
//! - `identity`: long-term Ed25519 signing identity
//! - `exchange`: ephemeral X25519 key agreement
//! - `sealed`  : XChaCha20-Poly1305 authenticated tokens
//! - `error`   : unified error type

pub mod error;
pub mod exchange;
pub mod identity;
pub mod sealed;

pub use error::CryptoError;
