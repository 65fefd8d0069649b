//! # Jwks-Kit: JSON Web Key lifecycle management
//!
//! `jwks-kit` issues, rotates and publishes the signing and encryption
//! key material behind JWS/JWE tokens. Consumers ask for "the current
//! key"; the library transparently generates a new one when none
//! exists, the current one has expired or the configured algorithm has
//! changed, and keeps a bounded history of recent keys (revoked ones
//! included, stripped of private material) so tokens signed with a
//! slightly stale key can still be validated during rollover.
//!
//! ## Core Concepts
//!
//! - **[`KeyManager`]**: the rotation orchestrator. Serves signing and
//!   encrypting credentials and decides when to rotate.
//! - **[`store::JsonWebKeyStore`]**: the storage contract, implemented
//!   by in-memory, file system, SQLite and encrypted-repository
//!   backends.
//! - **[`JwksOptions`]**: construction-time configuration (algorithms,
//!   rotation cadence, retention, cache window, key prefix).
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use jwks_kit::prelude::*;
//!
//! fn main() -> Result<(), Error> {
//!     let store = Arc::new(InMemoryStore::new());
//!     let manager = KeyManager::new(store, JwksOptions::default());
//!
//!     // First call generates and stores a key; later calls reuse it.
//!     let credentials = manager.get_current_signing_credentials()?;
//!     let signature = credentials.sign(b"header.payload")?;
//!
//!     // The public key set for a discovery endpoint.
//!     let jwks = manager.get_public_key_set(None, None)?;
//!     println!("{}", serde_json::to_string(&jwks).unwrap());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod credentials;
pub mod crypto;
pub mod error;
pub mod jwa;
pub mod jwk;
pub mod manager;
pub mod material;
pub mod options;
pub mod store;

pub use error::Error;
pub use manager::KeyManager;
pub use options::JwksOptions;

// --- Prelude ---
// A collection of the most commonly used types.
pub mod prelude {
    pub use crate::cache::CachedKeyStore;
    pub use crate::credentials::{EncryptingCredentials, SigningCredentials};
    pub use crate::error::Error;
    pub use crate::jwa::{Algorithm, AlgorithmType, JwtKeyType};
    pub use crate::jwk::{JsonWebKey, JsonWebKeySet};
    pub use crate::manager::KeyManager;
    pub use crate::material::{CryptographicKey, KeyMaterial};
    pub use crate::options::JwksOptions;
    pub use crate::store::{FileSystemStore, InMemoryStore, JsonWebKeyStore};

    #[cfg(feature = "sqlite")]
    pub use crate::store::DatabaseStore;
    #[cfg(feature = "protected-storage")]
    pub use crate::store::{FileSystemBlobRepository, PassphraseProtector, ProtectedStore};
}

/// The version of the `jwks-kit` crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
