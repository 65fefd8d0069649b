//! Process-lifetime key store for single-process and test deployments.

use std::sync::RwLock;

use tracing::debug;

use crate::error::Error;
use crate::jwa::JwtKeyType;
use crate::material::KeyMaterial;
use crate::store::{JsonWebKeyStore, find_current, group_then_limit};

/// An in-memory store backed by an ordered collection.
///
/// The instance is explicitly owned and injectable; there is no
/// process-wide static. State is lost on restart; readers run
/// concurrently with each other but not with a writer.
#[derive(Default)]
pub struct InMemoryStore {
    keys: RwLock<Vec<KeyMaterial>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JsonWebKeyStore for InMemoryStore {
    fn store(&self, key_material: KeyMaterial) -> Result<(), Error> {
        let mut keys = self.keys.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        if keys.iter().any(|k| k.id == key_material.id) {
            return Err(Error::InvalidOperation(format!(
                "a key with id {} is already stored",
                key_material.id
            )));
        }
        debug!(key_id = %key_material.key_id, "storing new key");
        keys.push(key_material);
        Ok(())
    }

    fn get_current(&self, key_type: JwtKeyType) -> Result<Option<KeyMaterial>, Error> {
        let keys = self.keys.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(find_current(keys.iter().cloned(), key_type))
    }

    fn get_last_keys(
        &self,
        quantity: usize,
        key_type: Option<JwtKeyType>,
    ) -> Result<Vec<KeyMaterial>, Error> {
        let keys = self.keys.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(group_then_limit(keys.clone(), quantity, key_type))
    }

    fn get(&self, key_id: &str) -> Result<Option<KeyMaterial>, Error> {
        let keys = self.keys.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(keys.iter().find(|k| k.key_id == key_id).cloned())
    }

    fn revoke(&self, key_material: &mut KeyMaterial, reason: Option<&str>) -> Result<(), Error> {
        key_material.revoke(reason)?;

        let mut keys = self.keys.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        // 原位替换，保持插入顺序
        if let Some(stored) = keys.iter_mut().find(|k| k.id == key_material.id) {
            *stored = key_material.clone();
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), Error> {
        let mut keys = self.keys.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        for key in keys.iter_mut() {
            key.revoke(None)?;
        }
        keys.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwa::Algorithm;
    use crate::material::CryptographicKey;

    fn sig_key() -> KeyMaterial {
        let key = CryptographicKey::generate(Algorithm::create("ES256").unwrap()).unwrap();
        KeyMaterial::new(&key).unwrap()
    }

    #[test]
    fn store_rejects_duplicate_ids() {
        let store = InMemoryStore::new();
        let key = sig_key();
        store.store(key.clone()).unwrap();
        assert!(matches!(store.store(key), Err(Error::InvalidOperation(_))));
    }

    #[test]
    fn current_is_newest_non_revoked() {
        let store = InMemoryStore::new();
        let mut first = sig_key();
        first.creation_date -= chrono::Duration::minutes(5);
        let second = sig_key();

        store.store(first.clone()).unwrap();
        store.store(second.clone()).unwrap();
        assert_eq!(
            store.get_current(JwtKeyType::Jws).unwrap().unwrap().key_id,
            second.key_id
        );

        let mut second = second;
        store.revoke(&mut second, None).unwrap();
        assert_eq!(
            store.get_current(JwtKeyType::Jws).unwrap().unwrap().key_id,
            first.key_id
        );
    }

    #[test]
    fn revoked_keys_stay_retrievable() {
        let store = InMemoryStore::new();
        let mut key = sig_key();
        store.store(key.clone()).unwrap();
        store.revoke(&mut key, Some("rolled over")).unwrap();

        let fetched = store.get(&key.key_id).unwrap().unwrap();
        assert!(fetched.is_revoked);
        assert_eq!(fetched.revoked_reason.as_deref(), Some("rolled over"));
        assert!(store.get_current(JwtKeyType::Jws).unwrap().is_none());
        assert_eq!(store.get_last_keys(5, None).unwrap().len(), 1);
    }

    #[test]
    fn clear_empties_the_store() {
        let store = InMemoryStore::new();
        store.store(sig_key()).unwrap();
        store.store(sig_key()).unwrap();
        store.clear().unwrap();
        assert!(store.get_last_keys(10, None).unwrap().is_empty());
    }
}
