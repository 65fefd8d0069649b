//! One-file-per-key store with a current pointer file per use.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::Error;
use crate::jwa::JwtKeyType;
use crate::material::KeyMaterial;
use crate::options::JwksOptions;
use crate::store::{JsonWebKeyStore, directories, find_current, group_then_limit, key_type_of};

/// A key store that keeps each record as a JSON file on disk.
///
/// Layout inside the keys directory (all names carry the configured
/// key prefix):
/// - `<prefix><kid>.<jws|jwe>.key`: one data file per key record;
/// - `<prefix>current.<jws|jwe>.key`: the current pointer per use,
///   snapshotted aside as `<prefix>old-<date>-<kid>.key` before each
///   overwrite;
/// - `old-` snapshots are never read back except by full-directory
///   scans.
///
/// Concurrent writers from different processes are not serialized;
/// simultaneous rotation can produce two valid replacement keys. Both
/// remain usable for verification (newest wins on read), so this is
/// benign duplication, accepted rather than special-cased.
pub struct FileSystemStore {
    keys_path: PathBuf,
    options: JwksOptions,
}

impl FileSystemStore {
    /// Creates the store rooted at `keys_path`, creating the directory
    /// if necessary.
    pub fn new<P: AsRef<Path>>(keys_path: P, options: JwksOptions) -> Result<Self, Error> {
        let path = keys_path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;
        Ok(Self { keys_path: path, options })
    }

    /// Creates the store at the best-effort default location
    /// (user profile → machine-wide → temp), resolved once here.
    pub fn default_location(options: JwksOptions) -> Result<Self, Error> {
        Self::new(directories::default_key_storage_directory(), options)
    }

    pub fn keys_path(&self) -> &Path {
        &self.keys_path
    }

    fn current_path(&self, key_type: JwtKeyType) -> PathBuf {
        self.keys_path
            .join(format!("{}current.{key_type}.key", self.options.key_prefix))
    }

    fn data_path(&self, key_material: &KeyMaterial) -> PathBuf {
        self.keys_path.join(format!(
            "{}{}.{}.key",
            self.options.key_prefix,
            key_material.key_id,
            key_type_of(key_material)
        ))
    }

    fn read_key(path: &Path) -> Result<Option<KeyMaterial>, Error> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn write_key(path: &Path, key_material: &KeyMaterial) -> Result<(), Error> {
        fs::write(path, serde_json::to_string(key_material)?)?;
        Ok(())
    }

    /// Scans every data and pointer file, skipping unreadable entries.
    /// `old-` snapshots are excluded so a record appears exactly once.
    fn scan_keys(&self) -> Result<Vec<KeyMaterial>, Error> {
        let mut keys = Vec::new();
        let mut seen = Vec::new();

        for entry in fs::read_dir(&self.keys_path)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.ends_with(".key") || self.is_snapshot(name) || self.is_pointer(name) {
                continue;
            }

            match Self::read_key(&path) {
                Ok(Some(key)) if !seen.contains(&key.id) => {
                    seen.push(key.id);
                    keys.push(key);
                }
                Ok(_) => {}
                Err(e) => warn!(file = %path.display(), error = %e, "skipping unreadable key file"),
            }
        }

        Ok(keys)
    }

    fn is_snapshot(&self, file_name: &str) -> bool {
        file_name
            .strip_prefix(&self.options.key_prefix)
            .unwrap_or(file_name)
            .starts_with("old-")
    }

    fn is_pointer(&self, file_name: &str) -> bool {
        file_name
            .strip_prefix(&self.options.key_prefix)
            .unwrap_or(file_name)
            .starts_with("current.")
    }
}

impl JsonWebKeyStore for FileSystemStore {
    fn store(&self, key_material: KeyMaterial) -> Result<(), Error> {
        // 目录可能被外部删除
        fs::create_dir_all(&self.keys_path)?;

        let data_path = self.data_path(&key_material);
        if data_path.exists() {
            return Err(Error::InvalidOperation(format!(
                "a key with id {} is already stored",
                key_material.key_id
            )));
        }

        let key_type = key_type_of(&key_material);
        let current = self.current_path(key_type);
        if current.exists() {
            // The date makes rollover snapshots easy to search.
            let snapshot = self.keys_path.join(format!(
                "{}old-{}-{}.key",
                self.options.key_prefix,
                Utc::now().format("%Y-%m-%d"),
                key_material.key_id,
            ));
            fs::copy(&current, snapshot)?;
        }

        Self::write_key(&data_path, &key_material)?;
        Self::write_key(&current, &key_material)?;
        debug!(key_id = %key_material.key_id, %key_type, "stored key on disk");
        Ok(())
    }

    fn get_current(&self, key_type: JwtKeyType) -> Result<Option<KeyMaterial>, Error> {
        match Self::read_key(&self.current_path(key_type))? {
            Some(key) if !key.is_revoked => Ok(Some(key)),
            // 指针已被吊销或缺失时回退到全目录扫描
            _ => Ok(find_current(self.scan_keys()?, key_type)),
        }
    }

    fn get_last_keys(
        &self,
        quantity: usize,
        key_type: Option<JwtKeyType>,
    ) -> Result<Vec<KeyMaterial>, Error> {
        Ok(group_then_limit(self.scan_keys()?, quantity, key_type))
    }

    fn get(&self, key_id: &str) -> Result<Option<KeyMaterial>, Error> {
        Ok(self.scan_keys()?.into_iter().find(|k| k.key_id == key_id))
    }

    fn revoke(&self, key_material: &mut KeyMaterial, reason: Option<&str>) -> Result<(), Error> {
        key_material.revoke(reason)?;

        // Rewrite every non-snapshot file holding this record: the data
        // file and, when it is the current one, the pointer file.
        for entry in fs::read_dir(&self.keys_path)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.ends_with(".key") || self.is_snapshot(name) {
                continue;
            }
            if let Ok(Some(stored)) = Self::read_key(&path) {
                if stored.id == key_material.id {
                    Self::write_key(&path, key_material)?;
                }
            }
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), Error> {
        if !self.keys_path.exists() {
            return Ok(());
        }
        for entry in fs::read_dir(&self.keys_path)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "key") {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwa::Algorithm;
    use crate::material::CryptographicKey;
    use tempfile::tempdir;

    fn options() -> JwksOptions {
        JwksOptions {
            key_prefix: "test_".to_string(),
            ..JwksOptions::default()
        }
    }

    fn key(alg: &str) -> KeyMaterial {
        let key = CryptographicKey::generate(Algorithm::create(alg).unwrap()).unwrap();
        KeyMaterial::new(&key).unwrap()
    }

    #[test]
    fn store_writes_data_and_pointer_files() {
        let dir = tempdir().unwrap();
        let store = FileSystemStore::new(dir.path(), options()).unwrap();
        let material = key("ES256");

        store.store(material.clone()).unwrap();

        assert!(dir.path().join(format!("test_{}.jws.key", material.key_id)).exists());
        assert!(dir.path().join("test_current.jws.key").exists());
        assert_eq!(
            store.get_current(JwtKeyType::Jws).unwrap().unwrap().key_id,
            material.key_id
        );
    }

    #[test]
    fn overwriting_current_snapshots_the_previous_one() {
        let dir = tempdir().unwrap();
        let store = FileSystemStore::new(dir.path(), options()).unwrap();

        let mut first = key("ES256");
        first.creation_date -= chrono::Duration::minutes(1);
        store.store(first.clone()).unwrap();
        let second = key("ES256");
        store.store(second.clone()).unwrap();

        let snapshots: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.unwrap().file_name().into_string().ok())
            .filter(|n| n.starts_with("test_old-"))
            .collect();
        assert_eq!(snapshots.len(), 1);

        // 两把密钥都能通过目录扫描找回
        let last = store.get_last_keys(5, Some(JwtKeyType::Jws)).unwrap();
        assert_eq!(last.len(), 2);
        assert_eq!(last[0].key_id, second.key_id);
    }

    #[test]
    fn revoke_updates_files_in_place() {
        let dir = tempdir().unwrap();
        let store = FileSystemStore::new(dir.path(), options()).unwrap();
        let mut material = key("PS256");
        store.store(material.clone()).unwrap();

        store.revoke(&mut material, None).unwrap();

        let fetched = store.get(&material.key_id).unwrap().unwrap();
        assert!(fetched.is_revoked);
        assert!(!fetched.get_security_key().unwrap().has_private_key());
        assert!(store.get_current(JwtKeyType::Jws).unwrap().is_none());
    }

    #[test]
    fn corrupt_files_do_not_abort_the_scan() {
        let dir = tempdir().unwrap();
        let store = FileSystemStore::new(dir.path(), options()).unwrap();
        store.store(key("ES256")).unwrap();
        std::fs::write(dir.path().join("test_garbage.jws.key"), "not json").unwrap();

        assert_eq!(store.get_last_keys(5, None).unwrap().len(), 1);
    }

    #[test]
    fn clear_removes_every_key_file() {
        let dir = tempdir().unwrap();
        let store = FileSystemStore::new(dir.path(), options()).unwrap();
        store.store(key("ES256")).unwrap();
        store.store(key("RSA-OAEP")).unwrap();

        store.clear().unwrap();
        assert!(store.get_last_keys(10, None).unwrap().is_empty());
        assert!(store.get_current(JwtKeyType::Jws).unwrap().is_none());
    }
}
