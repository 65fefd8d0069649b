//! Sliding-TTL read-through cache in front of a key store.
// 中文: 位于密钥存储之前的滑动过期读穿缓存。

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::debug;

use crate::error::Error;
use crate::jwa::JwtKeyType;
use crate::material::KeyMaterial;
use crate::store::JsonWebKeyStore;

struct CacheEntry<T> {
    value: T,
    last_access: Instant,
}

/// Wraps a store with two kinds of cache entries: the current key per
/// use and the recent-keys listing per query shape. The TTL is
/// sliding: every hit resets the window.
///
/// Every mutation (`store`, `revoke`, `clear`) invalidates all entries
/// *after* the inner store has confirmed the write and *before*
/// returning, so a reader immediately after a mutation never observes
/// pre-mutation data; entries are repopulated only from a fresh inner
/// read, never from the in-flight write's local value.
pub struct CachedKeyStore {
    inner: Arc<dyn JsonWebKeyStore>,
    cache_time: Duration,
    current: DashMap<JwtKeyType, CacheEntry<KeyMaterial>>,
    last_keys: DashMap<(usize, Option<JwtKeyType>), CacheEntry<Vec<KeyMaterial>>>,
}

impl CachedKeyStore {
    pub fn new(inner: Arc<dyn JsonWebKeyStore>, cache_time: Duration) -> Self {
        Self {
            inner,
            cache_time,
            current: DashMap::new(),
            last_keys: DashMap::new(),
        }
    }

    fn clear_cache(&self) {
        self.current.clear();
        self.last_keys.clear();
    }

    fn cached_current(&self, key_type: JwtKeyType) -> Option<KeyMaterial> {
        let mut entry = self.current.get_mut(&key_type)?;
        if entry.last_access.elapsed() > self.cache_time {
            drop(entry);
            self.current.remove(&key_type);
            return None;
        }
        entry.last_access = Instant::now();
        Some(entry.value.clone())
    }

    fn cached_last_keys(
        &self,
        quantity: usize,
        key_type: Option<JwtKeyType>,
    ) -> Option<Vec<KeyMaterial>> {
        let cache_key = (quantity, key_type);
        let mut entry = self.last_keys.get_mut(&cache_key)?;
        if entry.last_access.elapsed() > self.cache_time {
            drop(entry);
            self.last_keys.remove(&cache_key);
            return None;
        }
        entry.last_access = Instant::now();
        Some(entry.value.clone())
    }
}

impl JsonWebKeyStore for CachedKeyStore {
    fn store(&self, key_material: KeyMaterial) -> Result<(), Error> {
        self.inner.store(key_material)?;
        self.clear_cache();
        Ok(())
    }

    fn get_current(&self, key_type: JwtKeyType) -> Result<Option<KeyMaterial>, Error> {
        if let Some(hit) = self.cached_current(key_type) {
            return Ok(Some(hit));
        }

        let credentials = self.inner.get_current(key_type)?;
        if let Some(ref key) = credentials {
            debug!(key_id = %key.key_id, "cache refill for current key");
            self.current.insert(
                key_type,
                CacheEntry { value: key.clone(), last_access: Instant::now() },
            );
        }
        Ok(credentials)
    }

    fn get_last_keys(
        &self,
        quantity: usize,
        key_type: Option<JwtKeyType>,
    ) -> Result<Vec<KeyMaterial>, Error> {
        if let Some(hit) = self.cached_last_keys(quantity, key_type) {
            return Ok(hit);
        }

        let keys = self.inner.get_last_keys(quantity, key_type)?;
        if !keys.is_empty() {
            self.last_keys.insert(
                (quantity, key_type),
                CacheEntry { value: keys.clone(), last_access: Instant::now() },
            );
        }
        Ok(keys)
    }

    fn get(&self, key_id: &str) -> Result<Option<KeyMaterial>, Error> {
        // Point lookups are rare enough to always fall through.
        self.inner.get(key_id)
    }

    fn revoke(&self, key_material: &mut KeyMaterial, reason: Option<&str>) -> Result<(), Error> {
        self.inner.revoke(key_material, reason)?;
        self.clear_cache();
        Ok(())
    }

    fn clear(&self) -> Result<(), Error> {
        self.inner.clear()?;
        self.clear_cache();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwa::Algorithm;
    use crate::material::CryptographicKey;
    use crate::store::InMemoryStore;

    fn key(alg: &str) -> KeyMaterial {
        let key = CryptographicKey::generate(Algorithm::create(alg).unwrap()).unwrap();
        KeyMaterial::new(&key).unwrap()
    }

    fn cached() -> CachedKeyStore {
        CachedKeyStore::new(Arc::new(InMemoryStore::new()), Duration::from_secs(900))
    }

    #[test]
    fn reads_are_served_from_cache_within_the_window() {
        let store = cached();
        let material = key("ES256");
        store.store(material.clone()).unwrap();

        let first = store.get_current(JwtKeyType::Jws).unwrap().unwrap();
        assert_eq!(first.key_id, material.key_id);
        // 第二次命中缓存
        assert!(store.current.contains_key(&JwtKeyType::Jws));
        let second = store.get_current(JwtKeyType::Jws).unwrap().unwrap();
        assert_eq!(second.key_id, material.key_id);
    }

    #[test]
    fn expired_entries_fall_through_to_the_store() {
        let store = CachedKeyStore::new(Arc::new(InMemoryStore::new()), Duration::ZERO);
        store.store(key("ES256")).unwrap();

        store.get_current(JwtKeyType::Jws).unwrap().unwrap();
        // 窗口为零，条目立即过期
        assert!(store.get_current(JwtKeyType::Jws).unwrap().is_some());
    }

    #[test]
    fn store_invalidates_stale_entries() {
        let store = cached();
        let mut first = key("ES256");
        first.creation_date -= chrono::Duration::minutes(1);
        store.store(first.clone()).unwrap();
        store.get_current(JwtKeyType::Jws).unwrap();
        store.get_last_keys(5, None).unwrap();

        let second = key("ES256");
        store.store(second.clone()).unwrap();

        // Even though the window has not elapsed, the mutation must be
        // visible immediately.
        assert_eq!(
            store.get_current(JwtKeyType::Jws).unwrap().unwrap().key_id,
            second.key_id
        );
        assert_eq!(store.get_last_keys(5, None).unwrap().len(), 2);
    }

    #[test]
    fn revoke_invalidates_stale_entries() {
        let store = cached();
        let mut material = key("ES256");
        store.store(material.clone()).unwrap();
        store.get_current(JwtKeyType::Jws).unwrap();

        store.revoke(&mut material, None).unwrap();
        assert!(store.get_current(JwtKeyType::Jws).unwrap().is_none());

        let listed = store.get_last_keys(5, Some(JwtKeyType::Jws)).unwrap();
        assert!(listed[0].is_revoked);
    }
}
