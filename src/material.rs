//! The generated key and its persisted record.
//!
//! [`CryptographicKey`] pairs an algorithm policy with freshly
//! generated key material; [`KeyMaterial`] is the unit every store
//! persists: lifecycle metadata plus the serialized JWK, with the
//! private components stripped on revocation.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto;
use crate::error::Error;
use crate::jwa::{Algorithm, AlgorithmType, signature};
use crate::jwk::JsonWebKey;

/// Reason recorded when a key is revoked without an explicit one.
pub const DEFAULT_REVOCATION_REASON: &str = "Revoked";

/// A freshly generated key bound to the policy that produced it.
pub struct CryptographicKey {
    pub algorithm: Algorithm,
    key: JsonWebKey,
}

impl CryptographicKey {
    /// Generates key material appropriate to the policy's family:
    /// an RSA-2048 keypair, an ECDSA keypair on the policy's curve, or
    /// a random symmetric secret sized by the algorithm's strength.
    pub fn generate(algorithm: Algorithm) -> Result<Self, Error> {
        let mut key = match algorithm.algorithm_type() {
            AlgorithmType::Rsa => crypto::create_rsa_jwk(crypto::DEFAULT_RSA_KEY_SIZE)?,
            AlgorithmType::Ecdsa => {
                let curve = algorithm.curve().ok_or_else(|| {
                    Error::InvalidOperation("ECDSA policy without a curve".to_string())
                })?;
                crypto::create_ec_jwk(curve)?
            }
            AlgorithmType::Hmac => crypto::create_oct_jwk(hmac_key_length(algorithm.alg())),
            AlgorithmType::Aes => crypto::create_oct_jwk(aes_key_length(algorithm.alg())),
        };

        key.key_use = Some(algorithm.use_tag().to_string());
        key.alg = Some(algorithm.alg().to_string());

        Ok(Self { algorithm, key })
    }

    /// The generated key as a JWK, private fields included.
    pub fn json_web_key(&self) -> &JsonWebKey {
        &self.key
    }

    pub fn key_id(&self) -> &str {
        // 生成器总是为新密钥分配 kid
        self.key.kid.as_deref().unwrap_or_default()
    }
}

fn hmac_key_length(alg: &str) -> usize {
    match alg {
        signature::HMAC_SHA384 => 48,
        signature::HMAC_SHA512 => 64,
        _ => 32,
    }
}

fn aes_key_length(alg: &str) -> usize {
    match alg {
        crate::jwa::key_management::AES256_KW => 32,
        _ => 16,
    }
}

/// The persisted unit holding one generated key's material and
/// lifecycle metadata.
///
/// 中文: 持久化的密钥记录，包含密钥材料与生命周期元数据。
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyMaterial {
    /// Process-unique identifier, immutable after creation.
    pub id: Uuid,
    /// Public-facing identifier embedded in tokens so verifiers can
    /// pick the right key.
    pub key_id: String,
    /// The "kty" tag copied from the policy at creation. A policy
    /// change that would alter this tag creates a new record instead
    /// of mutating this one.
    pub key_type: String,
    /// "sig" or "enc".
    #[serde(rename = "use")]
    pub key_use: String,
    /// The serialized JWK. Public and private while the key is active;
    /// replaced with the public-only projection on revocation.
    pub parameters: String,
    pub is_revoked: bool,
    pub revoked_reason: Option<String>,
    pub creation_date: DateTime<Utc>,
    pub expired_at: Option<DateTime<Utc>>,
}

impl KeyMaterial {
    pub fn new(cryptographic_key: &CryptographicKey) -> Result<Self, Error> {
        let jwk = cryptographic_key.json_web_key();
        Ok(Self {
            id: Uuid::new_v4(),
            key_id: cryptographic_key.key_id().to_string(),
            key_type: cryptographic_key.algorithm.kty().to_string(),
            key_use: cryptographic_key.algorithm.use_tag().to_string(),
            parameters: serde_json::to_string(jwk)?,
            is_revoked: false,
            revoked_reason: None,
            creation_date: Utc::now(),
            expired_at: None,
        })
    }

    /// Deserializes the stored JWK.
    pub fn get_security_key(&self) -> Result<JsonWebKey, Error> {
        Ok(serde_json::from_str(&self.parameters)?)
    }

    /// Revokes this record, stripping the private key components.
    ///
    /// Idempotent: revoking an already-revoked record leaves it
    /// untouched, including the originally recorded reason. Asymmetric
    /// keys keep only their public projection; octet keys have no such
    /// projection and the secret is retained in full. Callers that
    /// need full redaction of symmetric material must delete the
    /// record instead.
    pub fn revoke(&mut self, reason: Option<&str>) -> Result<(), Error> {
        if self.is_revoked {
            return Ok(());
        }

        let public = self.get_security_key()?.public_jwk();
        self.parameters = serde_json::to_string(&public)?;
        self.is_revoked = true;
        self.expired_at = Some(Utc::now());
        self.revoked_reason = Some(reason.unwrap_or(DEFAULT_REVOCATION_REASON).to_string());
        Ok(())
    }

    /// Whether the record is older than `days_until_expire`, measured
    /// against today's UTC date boundary. Rotation cadence is
    /// day-granular, not instant-granular.
    pub fn is_expired(&self, days_until_expire: u32) -> bool {
        let today = Utc::now()
            .date_naive()
            .and_time(NaiveTime::MIN)
            .and_utc();
        self.creation_date + Duration::days(i64::from(days_until_expire)) < today
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwa::{JwtKeyType, curves};

    fn material(alg: &str) -> KeyMaterial {
        let algorithm = Algorithm::create(alg).unwrap();
        KeyMaterial::new(&CryptographicKey::generate(algorithm).unwrap()).unwrap()
    }

    #[test]
    fn generation_tags_key_with_use_and_alg() {
        let key = CryptographicKey::generate(Algorithm::create("ES256").unwrap()).unwrap();
        let jwk = key.json_web_key();
        assert_eq!(jwk.key_use.as_deref(), Some("sig"));
        assert_eq!(jwk.alg.as_deref(), Some("ES256"));
        assert_eq!(jwk.crv.as_deref(), Some(curves::P256));
        assert!(!key.key_id().is_empty());
    }

    #[test]
    fn hmac_strength_follows_algorithm() {
        use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
        for (alg, len) in [("HS256", 32), ("HS384", 48), ("HS512", 64)] {
            let key = CryptographicKey::generate(Algorithm::create(alg).unwrap()).unwrap();
            let k = key.json_web_key().k.clone().unwrap();
            assert_eq!(URL_SAFE_NO_PAD.decode(k).unwrap().len(), len);
        }
    }

    #[test]
    fn revoke_strips_private_components_for_asymmetric_keys() {
        for alg in ["PS256", "RS256", "ES256", "ES384", "ES512"] {
            let mut material = material(alg);
            material.revoke(None).unwrap();

            let jwk = material.get_security_key().unwrap();
            assert!(!jwk.has_private_key(), "{alg} kept private material");
            // 公钥部分必须保留
            if jwk.kty == "RSA" {
                assert!(jwk.n.is_some() && jwk.e.is_some());
            } else {
                assert!(jwk.x.is_some() && jwk.y.is_some());
            }
            assert!(material.is_revoked);
            assert!(material.expired_at.is_some());
            assert_eq!(material.revoked_reason.as_deref(), Some(DEFAULT_REVOCATION_REASON));
        }
    }

    #[test]
    fn revoke_is_idempotent() {
        let mut material = material("PS256");
        material.revoke(Some("compromised")).unwrap();
        let first_expiry = material.expired_at;

        material.revoke(Some("second call")).unwrap();
        assert_eq!(material.revoked_reason.as_deref(), Some("compromised"));
        assert_eq!(material.expired_at, first_expiry);
    }

    #[test]
    fn symmetric_secret_survives_revocation() {
        // 已知限制: oct 密钥没有公开投影
        let mut material = material("HS256");
        material.revoke(None).unwrap();
        let jwk = material.get_security_key().unwrap();
        assert!(jwk.k.is_some());
    }

    #[test]
    fn expiry_is_day_granular() {
        let mut material = material("PS256");
        assert!(!material.is_expired(0), "created today is not expired");

        material.creation_date = Utc::now() - Duration::days(91);
        assert!(material.is_expired(90));
        assert!(!material.is_expired(365));
    }

    #[test]
    fn use_tag_round_trips() {
        let material = material("RSA-OAEP");
        assert_eq!(material.key_use, "enc");
        assert_eq!(JwtKeyType::from_use_tag(&material.key_use), Some(JwtKeyType::Jwe));
    }
}
