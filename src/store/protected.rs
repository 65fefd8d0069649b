//! Key store over an injected encrypt/decrypt boundary.
//!
//! Records are serialized, passed through a [`KeyProtector`] and kept
//! as opaque blobs in a [`BlobRepository`], so at-rest encryption is
//! delegated to the host environment. A default repository
//! ([`FileSystemBlobRepository`]) and a default protector
//! ([`PassphraseProtector`], Argon2id + AES-256-GCM) are provided.

use std::fs;
use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Error;
use crate::jwa::JwtKeyType;
use crate::material::KeyMaterial;
use crate::store::{JsonWebKeyStore, find_current, group_then_limit, key_type_of};

/// The encrypt/decrypt boundary applied to every record before it
/// reaches the repository.
pub trait KeyProtector: Send + Sync {
    fn protect(&self, plaintext: &[u8]) -> Result<Vec<u8>, Error>;
    fn unprotect(&self, protected: &[u8]) -> Result<Vec<u8>, Error>;
}

/// Named opaque blob storage. Storing under an existing name
/// overwrites the element in place.
pub trait BlobRepository: Send + Sync {
    fn store_element(&self, friendly_name: &str, blob: &[u8]) -> Result<(), Error>;
    fn get_all_elements(&self) -> Result<Vec<(String, Vec<u8>)>, Error>;
    fn remove_element(&self, friendly_name: &str) -> Result<(), Error>;
}

/// A store combining a repository with a protector.
pub struct ProtectedStore {
    repository: Box<dyn BlobRepository>,
    protector: Box<dyn KeyProtector>,
}

impl ProtectedStore {
    pub fn new(repository: Box<dyn BlobRepository>, protector: Box<dyn KeyProtector>) -> Self {
        Self { repository, protector }
    }

    fn friendly_name(key_material: &KeyMaterial) -> String {
        format!("key-{}-{}", key_type_of(key_material), key_material.id)
    }

    fn save(&self, key_material: &KeyMaterial) -> Result<(), Error> {
        let plaintext = serde_json::to_vec(key_material)?;
        let blob = self.protector.protect(&plaintext)?;
        self.repository
            .store_element(&Self::friendly_name(key_material), &blob)
    }

    /// Decrypts and parses every stored element. A corrupt or
    /// undecryptable entry must not prevent reading the rest: it is
    /// skipped with a warning and counted for observability.
    fn load_keys(&self) -> Result<Vec<KeyMaterial>, Error> {
        let mut keys = Vec::new();
        let mut skipped = 0usize;

        for (name, blob) in self.repository.get_all_elements()? {
            if !name.starts_with("key-") {
                continue;
            }
            let parsed = self
                .protector
                .unprotect(&blob)
                .and_then(|plaintext| serde_json::from_slice(&plaintext).map_err(Error::from));
            match parsed {
                Ok(key) => keys.push(key),
                Err(e) => {
                    skipped += 1;
                    warn!(element = %name, error = %e, "skipping undecryptable key element");
                }
            }
        }

        if skipped > 0 {
            debug!(skipped, "elements skipped during key listing");
        }
        Ok(keys)
    }
}

impl JsonWebKeyStore for ProtectedStore {
    fn store(&self, key_material: KeyMaterial) -> Result<(), Error> {
        let name = Self::friendly_name(&key_material);
        let exists = self
            .repository
            .get_all_elements()?
            .iter()
            .any(|(stored, _)| stored == &name);
        if exists {
            return Err(Error::InvalidOperation(format!(
                "a key with id {} is already stored",
                key_material.id
            )));
        }
        self.save(&key_material)
    }

    fn get_current(&self, key_type: JwtKeyType) -> Result<Option<KeyMaterial>, Error> {
        Ok(find_current(self.load_keys()?, key_type))
    }

    fn get_last_keys(
        &self,
        quantity: usize,
        key_type: Option<JwtKeyType>,
    ) -> Result<Vec<KeyMaterial>, Error> {
        Ok(group_then_limit(self.load_keys()?, quantity, key_type))
    }

    fn get(&self, key_id: &str) -> Result<Option<KeyMaterial>, Error> {
        Ok(self.load_keys()?.into_iter().find(|k| k.key_id == key_id))
    }

    fn revoke(&self, key_material: &mut KeyMaterial, reason: Option<&str>) -> Result<(), Error> {
        key_material.revoke(reason)?;
        // Same friendly name: the stripped record replaces the blob.
        self.save(key_material)
    }

    fn clear(&self) -> Result<(), Error> {
        for (name, _) in self.repository.get_all_elements()? {
            if name.starts_with("key-") {
                self.repository.remove_element(&name)?;
            }
        }
        Ok(())
    }
}

/// A [`BlobRepository`] keeping one file per element.
pub struct FileSystemBlobRepository {
    directory: PathBuf,
}

impl FileSystemBlobRepository {
    pub fn new<P: AsRef<Path>>(directory: P) -> Result<Self, Error> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory)?;
        Ok(Self { directory })
    }

    /// Uses the best-effort default location (user profile →
    /// machine-wide → temp), resolved once here.
    pub fn default_location() -> Result<Self, Error> {
        Self::new(crate::store::directories::default_key_storage_directory())
    }

    fn element_path(&self, friendly_name: &str) -> PathBuf {
        self.directory.join(format!("{friendly_name}.bin"))
    }
}

impl BlobRepository for FileSystemBlobRepository {
    fn store_element(&self, friendly_name: &str, blob: &[u8]) -> Result<(), Error> {
        fs::create_dir_all(&self.directory)?;
        fs::write(self.element_path(friendly_name), blob)?;
        Ok(())
    }

    fn get_all_elements(&self) -> Result<Vec<(String, Vec<u8>)>, Error> {
        let mut elements = Vec::new();
        for entry in fs::read_dir(&self.directory)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(stem) = name.strip_suffix(".bin") {
                elements.push((stem.to_string(), fs::read(&path)?));
            }
        }
        Ok(elements)
    }

    fn remove_element(&self, friendly_name: &str) -> Result<(), Error> {
        let path = self.element_path(friendly_name);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

fn default_memory_cost() -> u32 {
    19456 // 19 MiB
}
fn default_time_cost() -> u32 {
    2
}
fn default_parallelism_cost() -> u32 {
    1
}

/// Envelope written around each protected blob: the Argon2 parameters
/// and salt travel with the ciphertext so old blobs stay readable
/// after a cost change.
#[derive(Serialize, Deserialize)]
struct ProtectedEnvelope {
    encrypted_data: String,
    salt: String,
    nonce: String,
    #[serde(default = "default_memory_cost")]
    memory_cost: u32,
    #[serde(default = "default_time_cost")]
    time_cost: u32,
    #[serde(default = "default_parallelism_cost")]
    parallelism_cost: u32,
}

/// A [`KeyProtector`] deriving an AES-256-GCM wrapping key from a
/// passphrase with Argon2id.
pub struct PassphraseProtector {
    passphrase: SecretString,
    memory_cost: u32,
    time_cost: u32,
    parallelism_cost: u32,
}

impl PassphraseProtector {
    pub fn new(passphrase: SecretString) -> Self {
        Self {
            passphrase,
            memory_cost: default_memory_cost(),
            time_cost: default_time_cost(),
            parallelism_cost: default_parallelism_cost(),
        }
    }

    pub fn with_params(
        passphrase: SecretString,
        memory_cost: u32,
        time_cost: u32,
        parallelism_cost: u32,
    ) -> Self {
        Self { passphrase, memory_cost, time_cost, parallelism_cost }
    }

    fn derive_wrapping_key(
        &self,
        salt: &[u8],
        memory_cost: u32,
        time_cost: u32,
        parallelism_cost: u32,
    ) -> Result<[u8; 32], Error> {
        let params = argon2::Params::new(memory_cost, time_cost, parallelism_cost, Some(32))
            .map_err(|e| Error::Protection(e.to_string()))?;
        let argon2 = argon2::Argon2::new(
            argon2::Algorithm::Argon2id,
            argon2::Version::V0x13,
            params,
        );

        let mut wrapping_key = [0u8; 32];
        argon2
            .hash_password_into(
                self.passphrase.expose_secret().as_bytes(),
                salt,
                &mut wrapping_key,
            )
            .map_err(|e| Error::Protection(e.to_string()))?;
        Ok(wrapping_key)
    }
}

impl KeyProtector for PassphraseProtector {
    fn protect(&self, plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        let mut salt = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt);
        let mut nonce = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut nonce);

        let wrapping_key = self.derive_wrapping_key(
            &salt,
            self.memory_cost,
            self.time_cost,
            self.parallelism_cost,
        )?;
        let cipher = Aes256Gcm::new_from_slice(&wrapping_key)
            .map_err(|e| Error::Protection(e.to_string()))?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| Error::Protection(e.to_string()))?;

        let envelope = ProtectedEnvelope {
            encrypted_data: BASE64.encode(ciphertext),
            salt: BASE64.encode(salt),
            nonce: BASE64.encode(nonce),
            memory_cost: self.memory_cost,
            time_cost: self.time_cost,
            parallelism_cost: self.parallelism_cost,
        };
        Ok(serde_json::to_vec(&envelope)?)
    }

    fn unprotect(&self, protected: &[u8]) -> Result<Vec<u8>, Error> {
        let envelope: ProtectedEnvelope = serde_json::from_slice(protected)?;
        let salt = BASE64.decode(&envelope.salt)?;
        let nonce = BASE64.decode(&envelope.nonce)?;
        let ciphertext = BASE64.decode(&envelope.encrypted_data)?;

        let wrapping_key = self.derive_wrapping_key(
            &salt,
            envelope.memory_cost,
            envelope.time_cost,
            envelope.parallelism_cost,
        )?;
        let cipher = Aes256Gcm::new_from_slice(&wrapping_key)
            .map_err(|e| Error::Protection(e.to_string()))?;
        cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
            .map_err(|_| Error::Protection("decryption failed".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwa::Algorithm;
    use crate::material::CryptographicKey;
    use tempfile::tempdir;

    fn protector() -> PassphraseProtector {
        // 低成本参数，只为测试提速
        PassphraseProtector::with_params(SecretString::new("test-passphrase".into()), 4096, 1, 1)
    }

    fn store(dir: &Path) -> ProtectedStore {
        ProtectedStore::new(
            Box::new(FileSystemBlobRepository::new(dir).unwrap()),
            Box::new(protector()),
        )
    }

    fn key(alg: &str) -> KeyMaterial {
        let key = CryptographicKey::generate(Algorithm::create(alg).unwrap()).unwrap();
        KeyMaterial::new(&key).unwrap()
    }

    #[test]
    fn passphrase_protector_roundtrip() {
        let protector = protector();
        let blob = protector.protect(b"this-is-a-secret-key").unwrap();
        assert_eq!(protector.unprotect(&blob).unwrap(), b"this-is-a-secret-key");
    }

    #[test]
    fn wrong_passphrase_fails() {
        let blob = protector().protect(b"some key data").unwrap();
        let wrong =
            PassphraseProtector::with_params(SecretString::new("wrong".into()), 4096, 1, 1);
        assert!(wrong.unprotect(&blob).is_err());
    }

    #[test]
    fn blobs_on_disk_are_opaque() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let material = key("PS256");
        store.store(material.clone()).unwrap();

        for entry in std::fs::read_dir(dir.path()).unwrap() {
            let raw = std::fs::read(entry.unwrap().path()).unwrap();
            let text = String::from_utf8_lossy(&raw);
            assert!(!text.contains(&material.key_id));
            assert!(!text.contains("parameters"));
        }

        let fetched = store.get(&material.key_id).unwrap().unwrap();
        assert_eq!(fetched.parameters, material.parameters);
    }

    #[test]
    fn corrupt_element_is_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        store.store(key("ES256")).unwrap();
        std::fs::write(dir.path().join("key-jws-corrupt.bin"), b"garbage").unwrap();

        let keys = store.get_last_keys(5, None).unwrap();
        assert_eq!(keys.len(), 1);
    }

    #[test]
    fn revoke_overwrites_the_blob_in_place() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let mut material = key("PS256");
        store.store(material.clone()).unwrap();
        store.revoke(&mut material, None).unwrap();

        let fetched = store.get(&material.key_id).unwrap().unwrap();
        assert!(fetched.is_revoked);
        assert!(!fetched.get_security_key().unwrap().has_private_key());
        assert_eq!(store.get_last_keys(5, None).unwrap().len(), 1);
    }

    #[test]
    fn clear_removes_every_element() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        store.store(key("ES256")).unwrap();
        store.store(key("RSA-OAEP")).unwrap();
        store.clear().unwrap();
        assert!(store.get_last_keys(10, None).unwrap().is_empty());
    }
}
