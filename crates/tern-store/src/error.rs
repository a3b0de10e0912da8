//! Error types for document storage operations.

/// Errors that can occur during storage operations.
///
/// Absence is not an error: `get` returns `Ok(None)` for an empty address.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The store could not be reached or answered partially.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
