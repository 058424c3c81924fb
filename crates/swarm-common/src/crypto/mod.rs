//! Cryptographic primitives
//!
//! - Keyed BLAKE3 frame authentication
//! - Key derivation from the swarm's shared secret

pub mod auth;

pub use auth::{AuthKey, AUTH_TAG_LEN};
