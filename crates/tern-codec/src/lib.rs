//! Document codec: turns a [`Document`](tern_types::Document) into signed
//! bytes for the store and back.
//!
//! The fetch path only depends on the [`DocumentCodec`] trait. The provided
//! [`SignedCodec`] serializes documents with postcard, hashes everything
//! but the signature with BLAKE3 and signs that hash with the owner's
//! ed25519 key.

mod codec;
mod error;
mod keys;

pub use codec::{DocumentCodec, MAX_DOCUMENT_SIZE, SignedCodec, content_hash};
pub use error::CodecError;
pub use keys::{generate_signing_key, identity_of};
