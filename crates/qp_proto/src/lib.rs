//! qp_proto: Wire types and validating codec for QuietPost
//!
//! Everything the relay sends or receives is JSON. Binary fields
//! (keys, signatures) travel as fixed-length padded urlsafe base64:
//! 44 characters for 32-byte keys, 88 for 64-byte signatures.
//!
//! # Modules
//! - `wire`   : serde structs matching the relay JSON exactly
//! - `element`: validated element sum types handed to the engines
//! - `codec`  : structural validation + signature verification

pub mod codec;
pub mod element;
pub mod wire;

pub use codec::ProtoError;
pub use element::{ExchangeOffer, ExchangeResponse, MessageElement, ValidatedExchangeKey};
