//! The rotation orchestrator serving signing and encrypting
//! credentials.
//!
//! Every current-credential request re-evaluates the key's state:
//! a missing key is generated on the spot, an expired or revoked key
//! is revoked and replaced, and a key whose type no longer matches the
//! configured algorithm is superseded without being revoked (it stays
//! valid for verifying already-issued tokens).

use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::CachedKeyStore;
use crate::credentials::{EncryptingCredentials, SigningCredentials};
use crate::error::Error;
use crate::jwa::{Algorithm, JwtKeyType};
use crate::jwk::JsonWebKeySet;
use crate::material::{CryptographicKey, KeyMaterial};
use crate::options::JwksOptions;
use crate::store::JsonWebKeyStore;

/// Orchestrates key generation, rotation and retrieval over a store.
///
/// All operations take `&self` and are safe to call concurrently
/// within one process. Two processes racing on the same backing store
/// may both generate a replacement key; both stay usable for
/// verification and the newest wins on read, so the duplication is
/// benign (see the store docs).
pub struct KeyManager {
    store: Arc<dyn JsonWebKeyStore>,
    options: JwksOptions,
}

impl KeyManager {
    /// Wraps `store` with the read-through cache configured by
    /// `options.cache_time`.
    pub fn new(store: Arc<dyn JsonWebKeyStore>, options: JwksOptions) -> Self {
        let cached = CachedKeyStore::new(store, options.cache_time);
        Self::without_cache(Arc::new(cached), options)
    }

    /// Uses `store` directly. Intended for callers that already layer
    /// their own caching, and for tests.
    pub fn without_cache(store: Arc<dyn JsonWebKeyStore>, options: JwksOptions) -> Self {
        Self { store, options }
    }

    pub fn options(&self) -> &JwksOptions {
        &self.options
    }

    fn algorithm_for(&self, key_type: JwtKeyType) -> &Algorithm {
        match key_type {
            JwtKeyType::Jws => &self.options.jws,
            JwtKeyType::Jwe => &self.options.jwe,
        }
    }

    /// Generates and stores a fresh key for `key_type` under the
    /// currently configured algorithm.
    fn generate_key(&self, key_type: JwtKeyType) -> Result<KeyMaterial, Error> {
        let algorithm = self.algorithm_for(key_type).clone();
        let key = CryptographicKey::generate(algorithm)?;
        let model = KeyMaterial::new(&key)?;
        info!(key_id = %model.key_id, %key_type, kty = %model.key_type, "generated new key");
        self.store.store(model.clone())?;
        Ok(model)
    }

    /// The current usable key record for `key_type`, generating or
    /// rotating as needed.
    pub fn get_current_security_key(&self, key_type: JwtKeyType) -> Result<KeyMaterial, Error> {
        let current = self.store.get_current(key_type)?;

        let Some(mut current) = current else {
            return self.generate_key(key_type);
        };

        if current.is_expired(self.options.days_until_expire) || current.is_revoked {
            // Private key material should be removed as soon as it is
            // no longer needed (NIST SP 800-57 part 1).
            info!(key_id = %current.key_id, "current key is stale, rotating");
            self.store.revoke(&mut current, None)?;
            return self.generate_key(key_type);
        }

        if current.key_type != self.algorithm_for(key_type).kty() {
            // The configured algorithm changed family. The old key is
            // not revoked: verifiers still need it for tokens already
            // issued under it.
            debug!(key_id = %current.key_id, "algorithm changed, issuing a new key");
            self.generate_key(key_type)?;
            return self
                .store
                .get_current(key_type)?
                .ok_or_else(|| Error::KeyNotFound(key_type.use_tag().to_string()));
        }

        Ok(current)
    }

    /// The current signing key paired with the configured JWS
    /// algorithm.
    pub fn get_current_signing_credentials(&self) -> Result<SigningCredentials, Error> {
        let current = self.get_current_security_key(JwtKeyType::Jws)?;
        Ok(SigningCredentials::new(
            current.get_security_key()?,
            self.options.jws.clone(),
        ))
    }

    /// The current encryption key paired with the configured key
    /// management and content encryption algorithms.
    pub fn get_current_encrypting_credentials(&self) -> Result<EncryptingCredentials, Error> {
        let current = self.get_current_security_key(JwtKeyType::Jwe)?;
        Ok(EncryptingCredentials::new(
            current.get_security_key()?,
            self.options.jwe.clone(),
        ))
    }

    /// Up to `quantity` recent keys, revoked ones included, newest
    /// first; unfiltered queries return up to `quantity` per use.
    pub fn get_last_keys(
        &self,
        quantity: usize,
        key_type: Option<JwtKeyType>,
    ) -> Result<Vec<KeyMaterial>, Error> {
        self.store.get_last_keys(quantity, key_type)
    }

    /// Looks a key up by its public identifier and revokes it. A
    /// missing key is a silent no-op, unlike lookups that require the
    /// key to exist.
    pub fn revoke_key(&self, key_id: &str, reason: Option<&str>) -> Result<(), Error> {
        let Some(mut key) = self.store.get(key_id)? else {
            return Ok(());
        };
        self.store.revoke(&mut key, reason)
    }

    /// Unconditionally revokes the current key for `key_type` and
    /// generates a replacement.
    pub fn generate_new_key(&self, key_type: JwtKeyType) -> Result<KeyMaterial, Error> {
        if let Some(mut current) = self.store.get_current(key_type)? {
            self.store.revoke(&mut current, None)?;
        }
        self.generate_key(key_type)
    }

    /// The public, privacy-safe key set for a discovery document:
    /// up to `max_count` (default: the configured retention count)
    /// recent keys per use, projected to public-only JWKs.
    pub fn get_public_key_set(
        &self,
        key_type: Option<JwtKeyType>,
        max_count: Option<usize>,
    ) -> Result<JsonWebKeySet, Error> {
        let quantity = max_count.unwrap_or(self.options.algorithms_to_keep);
        let keys = self.store.get_last_keys(quantity, key_type)?;

        let mut public_keys = Vec::with_capacity(keys.len());
        for key in &keys {
            public_keys.push(key.get_security_key()?.public_jwk());
        }
        Ok(JsonWebKeySet::new(public_keys))
    }

    /// Revokes and removes every stored key. Test/reset flows only.
    pub fn clear(&self) -> Result<(), Error> {
        self.store.clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwa::AlgorithmType;
    use crate::store::InMemoryStore;

    fn manager_with(options: JwksOptions) -> KeyManager {
        KeyManager::new(Arc::new(InMemoryStore::new()), options)
    }

    fn manager() -> KeyManager {
        manager_with(JwksOptions::default())
    }

    #[test]
    fn first_request_generates_a_key_and_later_requests_reuse_it() {
        let manager = manager();
        let first = manager.get_current_security_key(JwtKeyType::Jws).unwrap();
        let second = manager.get_current_security_key(JwtKeyType::Jws).unwrap();
        assert_eq!(first.key_id, second.key_id);
        assert_eq!(manager.get_last_keys(5, None).unwrap().len(), 1);
    }

    #[test]
    fn signing_and_encrypting_keys_are_separate() {
        let manager = manager();
        let signing = manager.get_current_signing_credentials().unwrap();
        let encrypting = manager.get_current_encrypting_credentials().unwrap();
        assert_ne!(signing.key_id(), encrypting.key_id());
        assert_eq!(encrypting.alg(), "RSA-OAEP");
        assert_eq!(encrypting.enc(), Some("A128CBC-HS256"));
    }

    #[test]
    fn revoke_key_is_a_noop_for_unknown_ids() {
        let manager = manager();
        manager.revoke_key("does-not-exist", None).unwrap();
    }

    #[test]
    fn generate_new_key_revokes_the_previous_current() {
        let options = JwksOptions {
            jws: Algorithm::recommended(AlgorithmType::Ecdsa, JwtKeyType::Jws).unwrap(),
            ..JwksOptions::default()
        };
        let manager = manager_with(options);

        let first = manager.get_current_security_key(JwtKeyType::Jws).unwrap();
        let replacement = manager.generate_new_key(JwtKeyType::Jws).unwrap();
        assert_ne!(first.key_id, replacement.key_id);

        let keys = manager.get_last_keys(5, Some(JwtKeyType::Jws)).unwrap();
        let old = keys.iter().find(|k| k.key_id == first.key_id).unwrap();
        assert!(old.is_revoked);
    }

    #[test]
    fn public_key_set_is_private_free() {
        let options = JwksOptions {
            jws: Algorithm::recommended(AlgorithmType::Ecdsa, JwtKeyType::Jws).unwrap(),
            ..JwksOptions::default()
        };
        let manager = manager_with(options);
        manager.get_current_security_key(JwtKeyType::Jws).unwrap();

        let jwks = manager.get_public_key_set(Some(JwtKeyType::Jws), None).unwrap();
        assert_eq!(jwks.keys.len(), 1);
        let jwk = &jwks.keys[0];
        assert!(!jwk.has_private_key());
        assert!(jwk.x.is_some() && jwk.y.is_some());
        assert!(jwk.n.is_none() && jwk.e.is_none());
    }
}
