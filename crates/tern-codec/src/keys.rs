//! Identity key helpers.

use ed25519_dalek::SigningKey;
use rand::RngCore;
use tern_types::IdentityId;

/// Generate a fresh identity key.
pub fn generate_signing_key() -> SigningKey {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    SigningKey::from_bytes(&bytes)
}

/// The identity handle published for `key`.
pub fn identity_of(key: &SigningKey) -> IdentityId {
    IdentityId::from(key.verifying_key().to_bytes())
}
