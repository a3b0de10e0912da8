//! Shared types and identifiers for tern.
//!
//! This crate defines the core types used across the tern workspace:
//! identifiers ([`IdentityId`], [`PostId`], [`ReplyId`], [`AlbumId`]),
//! the versioned address of a published document ([`DocumentAddress`]),
//! the document model itself ([`Document`], [`Post`], [`Reply`],
//! [`Profile`], [`Album`]) and the per-identity [`IdentityStatus`].
//!
//! The [`events`] module carries the typed event bus through which the
//! engine announces changes to whoever renders them.

pub mod events;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ID types
// ---------------------------------------------------------------------------

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
        pub struct $name([u8; 32]);

        impl $name {
            /// Create an ID by hashing arbitrary data with BLAKE3.
            pub fn from_data(data: &[u8]) -> Self {
                Self(blake3::hash(data).into())
            }

            /// Return the raw 32-byte representation.
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// Parse a 64-character hex string.
            pub fn from_hex(s: &str) -> Option<Self> {
                if s.len() != 64 {
                    return None;
                }
                let mut bytes = [0u8; 32];
                for (i, pair) in s.as_bytes().chunks(2).enumerate() {
                    let hi = (pair[0] as char).to_digit(16)?;
                    let lo = (pair[1] as char).to_digit(16)?;
                    bytes[i] = (hi * 16 + lo) as u8;
                }
                Some(Self(bytes))
            }

            /// First eight hex characters, for log lines and display names.
            pub fn short(&self) -> String {
                self.to_string()[..8].to_string()
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                for byte in &self.0 {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.short())
            }
        }
    };
}

define_id!(
    /// Handle of a user identity: the raw bytes of its ed25519 verifying key.
    IdentityId
);

define_id!(
    /// Identifier of a post, derived from owner, time and a random nonce.
    PostId
);

define_id!(
    /// Identifier of a reply, derived from owner, time and a random nonce.
    ReplyId
);

define_id!(
    /// Identifier of an album, derived from owner, time and a random nonce.
    AlbumId
);

/// Version number of one identity's published document.
pub type Edition = u64;

/// Label under which identity documents are published.
pub const DOCUMENT_LABEL: &str = "document";

// ---------------------------------------------------------------------------
// Addressing
// ---------------------------------------------------------------------------

/// Versioned content address: `(public key, edition, label)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentAddress {
    /// Identity whose key signs the data at this address.
    pub identity: IdentityId,
    /// Edition number.
    pub edition: Edition,
    /// Document label within the edition.
    pub label: String,
}

impl DocumentAddress {
    /// Address of the identity document at `edition`.
    pub fn document(identity: IdentityId, edition: Edition) -> Self {
        Self {
            identity,
            edition,
            label: DOCUMENT_LABEL.to_string(),
        }
    }

    /// Stable 32-byte key for backends that need a flat namespace.
    pub fn storage_key(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.identity.as_bytes());
        hasher.update(&self.edition.to_be_bytes());
        hasher.update(self.label.as_bytes());
        hasher.finalize().into()
    }
}

impl fmt::Display for DocumentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}-{}", self.identity, self.label, self.edition)
    }
}

// ---------------------------------------------------------------------------
// Document model
// ---------------------------------------------------------------------------

/// Detached ed25519 signature over a document's content hash.
///
/// Stored as two 32-byte halves (serde doesn't derive for `[u8; 64]`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSignature {
    pub r: [u8; 32],
    pub s: [u8; 32],
}

impl DocumentSignature {
    /// Split a 64-byte signature into its halves.
    pub fn from_bytes(bytes: &[u8; 64]) -> Self {
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        Self { r, s }
    }

    /// Reassemble the 64-byte signature.
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut sig = [0u8; 64];
        sig[..32].copy_from_slice(&self.r);
        sig[32..].copy_from_slice(&self.s);
        sig
    }
}

/// One published edition of an identity's document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Owner of the document.
    pub identity: IdentityId,
    /// Edition this document was published as.
    pub edition: Edition,
    /// Publication time (milliseconds since the Unix epoch).
    pub time: u64,
    /// Profile information.
    pub profile: Profile,
    /// Posts authored by the owner.
    pub posts: Vec<Post>,
    /// Replies authored by the owner.
    pub replies: Vec<Reply>,
    /// Posts the owner likes.
    pub liked_posts: BTreeSet<PostId>,
    /// Replies the owner likes.
    pub liked_replies: BTreeSet<ReplyId>,
    /// Albums in display order.
    pub albums: Vec<Album>,
    /// Signature by the owner's key; filled in by the codec.
    pub signature: DocumentSignature,
}

impl Document {
    /// An unpublished, empty document for `identity`.
    pub fn empty(identity: IdentityId) -> Self {
        Self {
            identity,
            edition: 0,
            time: 0,
            profile: Profile::default(),
            posts: Vec::new(),
            replies: Vec::new(),
            liked_posts: BTreeSet::new(),
            liked_replies: BTreeSet::new(),
            albums: Vec::new(),
            signature: DocumentSignature::default(),
        }
    }

    /// Find a post by ID.
    pub fn post(&self, id: &PostId) -> Option<&Post> {
        self.posts.iter().find(|p| p.id == *id)
    }

    /// Find a reply by ID.
    pub fn reply(&self, id: &ReplyId) -> Option<&Reply> {
        self.replies.iter().find(|r| r.id == *id)
    }

    /// Find an album by ID.
    pub fn album(&self, id: &AlbumId) -> Option<&Album> {
        self.albums.iter().find(|a| a.id == *id)
    }
}

/// Profile of an identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    /// Free-form fields in display order.
    pub fields: Vec<ProfileField>,
}

impl Profile {
    /// Name parts joined by spaces, or `None` if no part is set.
    pub fn display_name(&self) -> Option<String> {
        let parts: Vec<&str> = [&self.first_name, &self.middle_name, &self.last_name]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .filter(|p| !p.is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// A single named profile field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileField {
    pub name: String,
    pub value: String,
}

/// A post.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    /// Identity that published the post.
    pub owner: IdentityId,
    /// Identity the post is directed at, if any.
    pub recipient: Option<IdentityId>,
    /// Creation time (milliseconds since the Unix epoch).
    pub time: u64,
    pub text: String,
}

/// A reply to a post.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Reply {
    pub id: ReplyId,
    /// Identity that published the reply.
    pub owner: IdentityId,
    /// The post this reply belongs to.
    pub post: PostId,
    /// Creation time (milliseconds since the Unix epoch).
    pub time: u64,
    pub text: String,
}

/// A photo album.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Album {
    pub id: AlbumId,
    pub owner: IdentityId,
    /// Enclosing album, `None` for top-level albums.
    pub parent: Option<AlbumId>,
    pub title: String,
    pub description: String,
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// What the node is currently doing with an identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentityStatus {
    /// Never fetched.
    #[default]
    Unknown,
    /// Nothing in flight.
    Idle,
    /// A fetch of the identity's document is in flight.
    Downloading,
    /// A local identity's document is being inserted.
    Inserting,
}

impl fmt::Display for IdentityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Idle => "idle",
            Self::Downloading => "downloading",
            Self::Inserting => "inserting",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
