//! Defines the custom error type for the `jwks-kit` crate.

use thiserror::Error;

/// The main error type for the `jwks-kit` crate.
#[derive(Debug, Error)]
pub enum Error {
    /// The JWA identifier is not part of the supported set.
    /// Surfaced at configuration time, never retried.
    #[error("not supported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Builder misuse, e.g. a content encryption scheme on a signature
    /// algorithm. Programmer error, fails fast.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Backend I/O failure. Propagated immediately; retry is the
    /// caller's policy decision.
    #[error("storage unavailable")]
    Storage(#[from] std::io::Error),

    #[cfg(feature = "sqlite")]
    #[error("database error")]
    Database(#[from] rusqlite::Error),

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("decoding from Base64 failed: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    #[error("cryptography error: {0}")]
    Cryptography(String),

    #[error("key protection error: {0}")]
    Protection(String),

    /// A key that an operation requires does not exist. Lookups that
    /// are expected to miss (`get`, `get_current`) return `Option`
    /// instead; revoking an absent key is a safe no-op.
    #[error("key not found with id: {0}")]
    KeyNotFound(String),
}
