//! The [`DocumentCodec`] trait and its signed postcard implementation.

use std::collections::BTreeSet;

use bytes::Bytes;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::Serialize;
use tern_types::{
    Album, Document, DocumentSignature, Edition, IdentityId, Post, PostId, Profile, Reply, ReplyId,
};
use tracing::debug;

use crate::error::CodecError;
use crate::keys::identity_of;

/// Largest payload `decode` will attempt to parse.
pub const MAX_DOCUMENT_SIZE: usize = 4 * 1024 * 1024;

/// Parses and verifies documents fetched from the store.
pub trait DocumentCodec: Send + Sync {
    /// Parse raw bytes into a document. Does not check the signature.
    fn decode(&self, bytes: &[u8]) -> Result<Document, CodecError>;

    /// Check that `document` was signed by `identity`.
    ///
    /// Any mismatch, including an embedded identity that differs from
    /// `identity`, yields `false`.
    fn verify(&self, document: &Document, identity: &IdentityId) -> bool;
}

/// Hashable content of a [`Document`] (excludes the signature).
#[derive(Serialize)]
struct HashableContent<'a> {
    identity: IdentityId,
    edition: Edition,
    time: u64,
    profile: &'a Profile,
    posts: &'a [Post],
    replies: &'a [Reply],
    liked_posts: &'a BTreeSet<PostId>,
    liked_replies: &'a BTreeSet<ReplyId>,
    albums: &'a [Album],
}

/// BLAKE3 hash over every field of `document` except its signature.
pub fn content_hash(document: &Document) -> [u8; 32] {
    let content = HashableContent {
        identity: document.identity,
        edition: document.edition,
        time: document.time,
        profile: &document.profile,
        posts: &document.posts,
        replies: &document.replies,
        liked_posts: &document.liked_posts,
        liked_replies: &document.liked_replies,
        albums: &document.albums,
    };
    let bytes = postcard::to_allocvec(&content).expect("serialization should not fail");
    blake3::hash(&bytes).into()
}

/// Postcard body signed with the owner's ed25519 key.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignedCodec;

impl SignedCodec {
    pub fn new() -> Self {
        Self
    }

    /// Sign `document` with `key` and serialize it.
    ///
    /// The document's `identity` must be the key's identity.
    pub fn encode(&self, document: &Document, key: &SigningKey) -> Result<Bytes, CodecError> {
        if identity_of(key) != document.identity {
            return Err(CodecError::KeyMismatch);
        }
        let hash = content_hash(document);
        let signature: Signature = key.sign(&hash);

        let mut signed = document.clone();
        signed.signature = DocumentSignature::from_bytes(&signature.to_bytes());
        let bytes = postcard::to_allocvec(&signed)?;
        debug!(
            identity = %document.identity,
            edition = document.edition,
            size = bytes.len(),
            "encoded document"
        );
        Ok(Bytes::from(bytes))
    }
}

impl DocumentCodec for SignedCodec {
    fn decode(&self, bytes: &[u8]) -> Result<Document, CodecError> {
        if bytes.len() > MAX_DOCUMENT_SIZE {
            return Err(CodecError::Malformed(format!(
                "{} bytes exceeds limit of {MAX_DOCUMENT_SIZE}",
                bytes.len()
            )));
        }
        postcard::from_bytes(bytes).map_err(|e| CodecError::Malformed(e.to_string()))
    }

    fn verify(&self, document: &Document, identity: &IdentityId) -> bool {
        if document.identity != *identity {
            return false;
        }
        let Ok(verifying_key) = VerifyingKey::from_bytes(identity.as_bytes()) else {
            return false;
        };
        let signature = Signature::from_bytes(&document.signature.to_bytes());
        verifying_key
            .verify(&content_hash(document), &signature)
            .is_ok()
    }
}
