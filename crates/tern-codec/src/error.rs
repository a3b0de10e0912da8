//! Error types for the codec.

/// Errors that can occur while encoding or decoding documents.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The bytes do not parse as a document.
    #[error("malformed document: {0}")]
    Malformed(String),

    /// The document could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The document is signed for another identity than the key given.
    #[error("signing key does not belong to the document's identity")]
    KeyMismatch,
}

impl From<postcard::Error> for CodecError {
    fn from(e: postcard::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
