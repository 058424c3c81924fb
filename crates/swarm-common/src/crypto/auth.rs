//! Frame Authentication
//!
//! Every gossip frame ends with a keyed BLAKE3 tag over its tag byte and
//! payload. The 32-byte key is derived from the swarm's shared secret, so
//! secrets of any length are accepted. Tag comparison goes through
//! [`blake3::Hash`], whose equality is constant-time.

use std::fmt;

use crate::error::CryptoError;

/// Authentication tag size in bytes (BLAKE3 output)
pub const AUTH_TAG_LEN: usize = 32;

const FRAME_CONTEXT: &str = "formula-swarm 2024-06 gossip frame authentication";
const LEDGER_CONTEXT: &str = "formula-swarm 2024-06 audit ledger chaining";

/// Prefix marking a hex-encoded secret in configuration
const HEX_PREFIX: &str = "hex:";

/// Symmetric key shared by every node of one swarm
#[derive(Clone)]
pub struct AuthKey {
    key: [u8; 32],
}

impl AuthKey {
    /// Derive the frame authentication key from a shared secret
    pub fn for_frames(secret: &[u8]) -> Result<Self, CryptoError> {
        Self::derive(FRAME_CONTEXT, secret)
    }

    /// Derive the key used to chain audit ledger records
    pub fn for_ledger(secret: &[u8]) -> Result<Self, CryptoError> {
        Self::derive(LEDGER_CONTEXT, secret)
    }

    /// Parse a configured secret: `hex:`-prefixed values are hex-decoded,
    /// anything else is used as raw UTF-8 bytes.
    pub fn secret_from_config(value: &str) -> Result<Vec<u8>, CryptoError> {
        let secret = match value.strip_prefix(HEX_PREFIX) {
            Some(encoded) => {
                hex::decode(encoded.trim()).map_err(|e| CryptoError::KeyEncoding(e.to_string()))?
            }
            None => value.as_bytes().to_vec(),
        };
        if secret.is_empty() {
            return Err(CryptoError::EmptyKey);
        }
        Ok(secret)
    }

    fn derive(context: &str, secret: &[u8]) -> Result<Self, CryptoError> {
        if secret.is_empty() {
            return Err(CryptoError::EmptyKey);
        }
        Ok(Self {
            key: blake3::derive_key(context, secret),
        })
    }

    /// Compute the tag for a frame body
    #[inline]
    pub fn tag(&self, body: &[u8]) -> [u8; AUTH_TAG_LEN] {
        *blake3::keyed_hash(&self.key, body).as_bytes()
    }

    /// Compute the tag over several byte slices as if they were concatenated
    pub fn tag_parts(&self, parts: &[&[u8]]) -> [u8; AUTH_TAG_LEN] {
        let mut hasher = blake3::Hasher::new_keyed(&self.key);
        for part in parts {
            hasher.update(part);
        }
        *hasher.finalize().as_bytes()
    }

    /// Check a received tag against the body it claims to cover
    pub fn verify(&self, body: &[u8], tag: &[u8]) -> bool {
        let Ok(received) = <[u8; AUTH_TAG_LEN]>::try_from(tag) else {
            return false;
        };
        blake3::keyed_hash(&self.key, body) == blake3::Hash::from(received)
    }
}

impl fmt::Debug for AuthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthKey(<redacted>)")
    }
}
