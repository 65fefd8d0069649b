//! Traits for abstracting key persistence.
// 中文: 用于抽象密钥持久化的 Trait。

use crate::error::Error;
use crate::jwa::JwtKeyType;
use crate::material::KeyMaterial;

pub mod directories;
pub mod file_system;
pub mod memory;

#[cfg(feature = "sqlite")]
pub mod database;
#[cfg(feature = "protected-storage")]
pub mod protected;

#[cfg(feature = "sqlite")]
pub use database::DatabaseStore;
pub use file_system::FileSystemStore;
pub use memory::InMemoryStore;
#[cfg(feature = "protected-storage")]
pub use protected::{BlobRepository, FileSystemBlobRepository, KeyProtector, PassphraseProtector, ProtectedStore};

/// Defines the universal interface every key store backend satisfies.
///
/// The contract is storage-agnostic: the in-memory, file system,
/// relational and encrypted-repository backends differ in durability
/// and atomicity but must answer these operations with identical
/// semantics. Lookups that are expected to miss return `Option`;
/// backend I/O failures propagate as [`Error`] without translation.
///
/// 中文: 定义了所有密钥存储后端都必须满足的通用接口。
///
/// 该契约与具体存储无关：内存、文件系统、关系型与加密仓库后端在持久性和
/// 原子性上各有取舍，但必须以相同的语义回答这些操作。
pub trait JsonWebKeyStore: Send + Sync {
    /// Durably persists a new record. Storing a record whose `id`
    /// already exists is an error, never a silent overwrite.
    fn store(&self, key_material: KeyMaterial) -> Result<(), Error>;

    /// The newest non-revoked record for the given use, or `None`.
    fn get_current(&self, key_type: JwtKeyType) -> Result<Option<KeyMaterial>, Error>;

    /// Up to `quantity` most recent records, newest first. With no
    /// filter the limit applies *per use*, so signature keys cannot
    /// crowd out encryption keys.
    fn get_last_keys(
        &self,
        quantity: usize,
        key_type: Option<JwtKeyType>,
    ) -> Result<Vec<KeyMaterial>, Error>;

    /// Point lookup by public key identifier.
    fn get(&self, key_id: &str) -> Result<Option<KeyMaterial>, Error>;

    /// Applies record-level revocation and persists the stripped
    /// record in place.
    fn revoke(&self, key_material: &mut KeyMaterial, reason: Option<&str>) -> Result<(), Error>;

    /// Revokes and removes everything. Test/reset flows only; normal
    /// rotation never deletes.
    fn clear(&self) -> Result<(), Error>;
}

/// The use a record was created for.
pub(crate) fn key_type_of(key_material: &KeyMaterial) -> JwtKeyType {
    JwtKeyType::from_use_tag(&key_material.key_use).unwrap_or(JwtKeyType::Jws)
}

/// Sorts newest first, then applies `quantity`, per use when no
/// filter is given (group-then-limit, not limit-then-group).
pub(crate) fn group_then_limit(
    mut keys: Vec<KeyMaterial>,
    quantity: usize,
    key_type: Option<JwtKeyType>,
) -> Vec<KeyMaterial> {
    keys.sort_by(|a, b| b.creation_date.cmp(&a.creation_date));

    match key_type {
        Some(filter) => keys
            .into_iter()
            .filter(|k| key_type_of(k) == filter)
            .take(quantity)
            .collect(),
        None => {
            let mut taken_sig = 0usize;
            let mut taken_enc = 0usize;
            keys.into_iter()
                .filter(|k| {
                    let taken = match key_type_of(k) {
                        JwtKeyType::Jws => &mut taken_sig,
                        JwtKeyType::Jwe => &mut taken_enc,
                    };
                    *taken += 1;
                    *taken <= quantity
                })
                .collect()
        }
    }
}

/// The newest non-revoked record for a use, from an unordered scan.
pub(crate) fn find_current(
    keys: impl IntoIterator<Item = KeyMaterial>,
    key_type: JwtKeyType,
) -> Option<KeyMaterial> {
    keys.into_iter()
        .filter(|k| !k.is_revoked && key_type_of(k) == key_type)
        .max_by_key(|k| k.creation_date)
}
