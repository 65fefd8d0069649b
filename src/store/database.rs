//! Relational key store: one row per record, revoke is an UPDATE.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, Row, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::Error;
use crate::jwa::JwtKeyType;
use crate::material::KeyMaterial;
use crate::store::{JsonWebKeyStore, group_then_limit};

/// A store keeping records as rows of a single `security_keys` table.
///
/// Revocation updates the row in place, never deletes it, preserving
/// auditability. The primary key constraint turns a duplicate `store`
/// into an error instead of a silent overwrite, which also narrows
/// (but does not eliminate) the cross-process rotation race: two
/// processes may still insert two valid replacement keys, and the
/// newest wins on read.
pub struct DatabaseStore {
    connection: Mutex<Connection>,
}

impl DatabaseStore {
    /// Wraps an existing connection. The host application owns schema
    /// creation; call [`DatabaseStore::ensure_schema`] when it does not.
    pub fn new(connection: Connection) -> Self {
        Self { connection: Mutex::new(connection) }
    }

    /// Opens (or creates) a database file and ensures the schema.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let store = Self::new(Connection::open(path)?);
        store.ensure_schema()?;
        Ok(store)
    }

    /// A private in-memory database, handy for tests.
    pub fn open_in_memory() -> Result<Self, Error> {
        let store = Self::new(Connection::open_in_memory()?);
        store.ensure_schema()?;
        Ok(store)
    }

    /// Opens a database file at the best-effort default location
    /// (user profile → machine-wide → temp), resolved once here.
    pub fn open_default_location() -> Result<Self, Error> {
        let directory = crate::store::directories::default_key_storage_directory();
        std::fs::create_dir_all(&directory)?;
        Self::open(directory.join("security_keys.db"))
    }

    /// Creates the `security_keys` table if it does not exist. The
    /// columns mirror [`KeyMaterial`]'s fields exactly.
    pub fn ensure_schema(&self) -> Result<(), Error> {
        self.lock().execute(
            "CREATE TABLE IF NOT EXISTS security_keys (
                id             TEXT PRIMARY KEY,
                key_id         TEXT NOT NULL,
                key_type       TEXT NOT NULL,
                use_tag        TEXT NOT NULL,
                parameters     TEXT NOT NULL,
                is_revoked     INTEGER NOT NULL DEFAULT 0,
                revoked_reason TEXT,
                creation_date  TEXT NOT NULL,
                expired_at     TEXT
            )",
            [],
        )?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.connection
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn from_row(row: &Row) -> Result<KeyMaterial, rusqlite::Error> {
        let id: String = row.get("id")?;
        let creation_date: String = row.get("creation_date")?;
        let expired_at: Option<String> = row.get("expired_at")?;

        Ok(KeyMaterial {
            id: Uuid::parse_str(&id).map_err(|e| conversion_error(0, e))?,
            key_id: row.get("key_id")?,
            key_type: row.get("key_type")?,
            key_use: row.get("use_tag")?,
            parameters: row.get("parameters")?,
            is_revoked: row.get("is_revoked")?,
            revoked_reason: row.get("revoked_reason")?,
            creation_date: parse_timestamp(&creation_date).map_err(|e| conversion_error(8, e))?,
            expired_at: expired_at
                .map(|v| parse_timestamp(&v).map_err(|e| conversion_error(9, e)))
                .transpose()?,
        })
    }
}

fn conversion_error(
    index: usize,
    source: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(source))
}

/// Fixed-width UTC timestamps, so lexicographic ORDER BY matches
/// chronological order.
fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

impl JsonWebKeyStore for DatabaseStore {
    fn store(&self, key_material: KeyMaterial) -> Result<(), Error> {
        info!(key_id = %key_material.key_id, "saving new security key");
        self.lock().execute(
            "INSERT INTO security_keys
                (id, key_id, key_type, use_tag, parameters, is_revoked,
                 revoked_reason, creation_date, expired_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                key_material.id.to_string(),
                key_material.key_id,
                key_material.key_type,
                key_material.key_use,
                key_material.parameters,
                key_material.is_revoked,
                key_material.revoked_reason,
                format_timestamp(key_material.creation_date),
                key_material.expired_at.map(format_timestamp),
            ],
        )?;
        Ok(())
    }

    fn get_current(&self, key_type: JwtKeyType) -> Result<Option<KeyMaterial>, Error> {
        let connection = self.lock();
        let mut statement = connection.prepare(
            "SELECT * FROM security_keys
             WHERE is_revoked = 0 AND use_tag = ?1
             ORDER BY creation_date DESC
             LIMIT 1",
        )?;
        let mut rows = statement.query_map(params![key_type.use_tag()], Self::from_row)?;
        rows.next().transpose().map_err(Error::from)
    }

    fn get_last_keys(
        &self,
        quantity: usize,
        key_type: Option<JwtKeyType>,
    ) -> Result<Vec<KeyMaterial>, Error> {
        let connection = self.lock();
        let mut statement = connection
            .prepare("SELECT * FROM security_keys ORDER BY creation_date DESC")?;
        let keys = statement
            .query_map([], Self::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        drop(statement);
        drop(connection);
        Ok(group_then_limit(keys, quantity, key_type))
    }

    fn get(&self, key_id: &str) -> Result<Option<KeyMaterial>, Error> {
        let connection = self.lock();
        let mut statement =
            connection.prepare("SELECT * FROM security_keys WHERE key_id = ?1 LIMIT 1")?;
        let mut rows = statement.query_map(params![key_id], Self::from_row)?;
        rows.next().transpose().map_err(Error::from)
    }

    fn revoke(&self, key_material: &mut KeyMaterial, reason: Option<&str>) -> Result<(), Error> {
        key_material.revoke(reason)?;
        debug!(key_id = %key_material.key_id, "revoking security key row");
        self.lock().execute(
            "UPDATE security_keys
             SET parameters = ?1, is_revoked = ?2, revoked_reason = ?3, expired_at = ?4
             WHERE id = ?5",
            params![
                key_material.parameters,
                key_material.is_revoked,
                key_material.revoked_reason,
                key_material.expired_at.map(format_timestamp),
                key_material.id.to_string(),
            ],
        )?;
        Ok(())
    }

    fn clear(&self) -> Result<(), Error> {
        self.lock().execute("DELETE FROM security_keys", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwa::Algorithm;
    use crate::material::CryptographicKey;

    fn key(alg: &str) -> KeyMaterial {
        let key = CryptographicKey::generate(Algorithm::create(alg).unwrap()).unwrap();
        KeyMaterial::new(&key).unwrap()
    }

    #[test]
    fn row_round_trip_preserves_the_record() {
        let store = DatabaseStore::open_in_memory().unwrap();
        let material = key("ES256");
        store.store(material.clone()).unwrap();

        let fetched = store.get(&material.key_id).unwrap().unwrap();
        assert_eq!(fetched.id, material.id);
        assert_eq!(fetched.key_type, "EC");
        assert_eq!(fetched.key_use, "sig");
        assert_eq!(fetched.parameters, material.parameters);
    }

    #[test]
    fn duplicate_insert_is_rejected_by_the_primary_key() {
        let store = DatabaseStore::open_in_memory().unwrap();
        let material = key("ES256");
        store.store(material.clone()).unwrap();
        assert!(matches!(store.store(material), Err(Error::Database(_))));
    }

    #[test]
    fn current_ignores_revoked_rows() {
        let store = DatabaseStore::open_in_memory().unwrap();
        let mut old = key("PS256");
        old.creation_date -= chrono::Duration::hours(1);
        let newer = key("PS256");
        store.store(old.clone()).unwrap();
        store.store(newer.clone()).unwrap();

        let mut newer = newer;
        store.revoke(&mut newer, None).unwrap();
        let current = store.get_current(JwtKeyType::Jws).unwrap().unwrap();
        assert_eq!(current.key_id, old.key_id);
    }

    #[test]
    fn revoke_is_an_update_not_a_delete() {
        let store = DatabaseStore::open_in_memory().unwrap();
        let mut material = key("PS256");
        store.store(material.clone()).unwrap();
        store.revoke(&mut material, Some("audit")).unwrap();

        let fetched = store.get(&material.key_id).unwrap().unwrap();
        assert!(fetched.is_revoked);
        assert_eq!(fetched.revoked_reason.as_deref(), Some("audit"));
        assert!(!fetched.get_security_key().unwrap().has_private_key());
    }

    #[test]
    fn clear_removes_all_rows() {
        let store = DatabaseStore::open_in_memory().unwrap();
        store.store(key("ES256")).unwrap();
        store.store(key("RSA-OAEP")).unwrap();
        store.clear().unwrap();
        assert!(store.get_last_keys(10, None).unwrap().is_empty());
    }
}
