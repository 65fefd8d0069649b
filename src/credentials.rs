//! Credential objects returned by the key manager.
//!
//! A [`SigningCredentials`] bundles the current signature key with its
//! configured JWS algorithm and can produce/verify raw signatures; the
//! consuming token library handles compact serialization. An
//! [`EncryptingCredentials`] bundles the current encryption key with
//! its key management and content encryption algorithms.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Signer, Verifier};
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use sha2::{Sha256, Sha384, Sha512};
use zeroize::Zeroizing;

use crate::error::Error;
use crate::jwa::{Algorithm, signature};
use crate::jwk::JsonWebKey;

/// The current signing key plus the JWS algorithm to sign with.
#[derive(Clone, Debug)]
pub struct SigningCredentials {
    key: JsonWebKey,
    algorithm: Algorithm,
}

impl SigningCredentials {
    pub fn new(key: JsonWebKey, algorithm: Algorithm) -> Self {
        Self { key, algorithm }
    }

    pub fn key(&self) -> &JsonWebKey {
        &self.key
    }

    pub fn algorithm(&self) -> &Algorithm {
        &self.algorithm
    }

    pub fn key_id(&self) -> Option<&str> {
        self.key.kid.as_deref()
    }

    /// Signs `data` with the credential's key and algorithm.
    ///
    /// HS* and RS* are deterministic; PS* and ES* embed a fresh nonce
    /// and yield a different signature on every call.
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        match self.algorithm.alg() {
            signature::HMAC_SHA256 => hmac_sign::<Hmac<Sha256>>(&self.secret()?, data),
            signature::HMAC_SHA384 => hmac_sign::<Hmac<Sha384>>(&self.secret()?, data),
            signature::HMAC_SHA512 => hmac_sign::<Hmac<Sha512>>(&self.secret()?, data),

            signature::RSA_SHA256 => {
                let key = rsa::pkcs1v15::SigningKey::<Sha256>::new(rsa_private_key(&self.key)?);
                Ok(key.sign(data).to_vec())
            }
            signature::RSA_SHA384 => {
                let key = rsa::pkcs1v15::SigningKey::<Sha384>::new(rsa_private_key(&self.key)?);
                Ok(key.sign(data).to_vec())
            }
            signature::RSA_SHA512 => {
                let key = rsa::pkcs1v15::SigningKey::<Sha512>::new(rsa_private_key(&self.key)?);
                Ok(key.sign(data).to_vec())
            }

            signature::RSA_SSA_PSS_SHA256 => {
                let key = rsa::pss::SigningKey::<Sha256>::new(rsa_private_key(&self.key)?);
                Ok(key.sign_with_rng(&mut rand::thread_rng(), data).to_vec())
            }
            signature::RSA_SSA_PSS_SHA384 => {
                let key = rsa::pss::SigningKey::<Sha384>::new(rsa_private_key(&self.key)?);
                Ok(key.sign_with_rng(&mut rand::thread_rng(), data).to_vec())
            }
            signature::RSA_SSA_PSS_SHA512 => {
                let key = rsa::pss::SigningKey::<Sha512>::new(rsa_private_key(&self.key)?);
                Ok(key.sign_with_rng(&mut rand::thread_rng(), data).to_vec())
            }

            signature::ECDSA_SHA256 => {
                let key = p256::ecdsa::SigningKey::from_slice(&self.scalar()?)
                    .map_err(crypto_err)?;
                let sig: p256::ecdsa::Signature = key.sign(data);
                Ok(sig.to_vec())
            }
            signature::ECDSA_SHA384 => {
                let key = p384::ecdsa::SigningKey::from_slice(&self.scalar()?)
                    .map_err(crypto_err)?;
                let sig: p384::ecdsa::Signature = key.sign(data);
                Ok(sig.to_vec())
            }
            signature::ECDSA_SHA512 => {
                let key = p521::ecdsa::SigningKey::from_slice(&self.scalar()?)
                    .map_err(crypto_err)?;
                let sig: p521::ecdsa::Signature = key.sign(data);
                Ok(sig.to_vec())
            }

            other => Err(Error::UnsupportedAlgorithm(other.to_string())),
        }
    }

    /// Verifies a signature using the key's public components only, so
    /// it also works with revoked (stripped) keys.
    pub fn verify(&self, data: &[u8], sig: &[u8]) -> Result<bool, Error> {
        verify_signature(&self.key, &self.algorithm, data, sig)
    }

    fn secret(&self) -> Result<Zeroizing<Vec<u8>>, Error> {
        decode_field(&self.key.k, "k")
    }

    fn scalar(&self) -> Result<Zeroizing<Vec<u8>>, Error> {
        decode_field(&self.key.d, "d")
    }
}

/// The current encryption key plus key management and content
/// encryption algorithms. Actual JWE processing belongs to the token
/// library consuming these credentials.
#[derive(Clone, Debug)]
pub struct EncryptingCredentials {
    key: JsonWebKey,
    algorithm: Algorithm,
}

impl EncryptingCredentials {
    pub fn new(key: JsonWebKey, algorithm: Algorithm) -> Self {
        Self { key, algorithm }
    }

    pub fn key(&self) -> &JsonWebKey {
        &self.key
    }

    pub fn key_id(&self) -> Option<&str> {
        self.key.kid.as_deref()
    }

    /// The key management algorithm, e.g. "RSA-OAEP".
    pub fn alg(&self) -> &str {
        self.algorithm.alg()
    }

    /// The content encryption scheme, e.g. "A128CBC-HS256".
    pub fn enc(&self) -> Option<&str> {
        self.algorithm.content_encryption()
    }
}

/// Verifies `sig` over `data` against a JWK's public components.
pub fn verify_signature(
    key: &JsonWebKey,
    algorithm: &Algorithm,
    data: &[u8],
    sig: &[u8],
) -> Result<bool, Error> {
    match algorithm.alg() {
        signature::HMAC_SHA256 => hmac_verify::<Hmac<Sha256>>(&decode_field(&key.k, "k")?, data, sig),
        signature::HMAC_SHA384 => hmac_verify::<Hmac<Sha384>>(&decode_field(&key.k, "k")?, data, sig),
        signature::HMAC_SHA512 => hmac_verify::<Hmac<Sha512>>(&decode_field(&key.k, "k")?, data, sig),

        signature::RSA_SHA256 => {
            let verifier = rsa::pkcs1v15::VerifyingKey::<Sha256>::new(rsa_public_key(key)?);
            let sig = rsa::pkcs1v15::Signature::try_from(sig).map_err(crypto_err)?;
            Ok(verifier.verify(data, &sig).is_ok())
        }
        signature::RSA_SHA384 => {
            let verifier = rsa::pkcs1v15::VerifyingKey::<Sha384>::new(rsa_public_key(key)?);
            let sig = rsa::pkcs1v15::Signature::try_from(sig).map_err(crypto_err)?;
            Ok(verifier.verify(data, &sig).is_ok())
        }
        signature::RSA_SHA512 => {
            let verifier = rsa::pkcs1v15::VerifyingKey::<Sha512>::new(rsa_public_key(key)?);
            let sig = rsa::pkcs1v15::Signature::try_from(sig).map_err(crypto_err)?;
            Ok(verifier.verify(data, &sig).is_ok())
        }

        signature::RSA_SSA_PSS_SHA256 => {
            let verifier = rsa::pss::VerifyingKey::<Sha256>::new(rsa_public_key(key)?);
            let sig = rsa::pss::Signature::try_from(sig).map_err(crypto_err)?;
            Ok(verifier.verify(data, &sig).is_ok())
        }
        signature::RSA_SSA_PSS_SHA384 => {
            let verifier = rsa::pss::VerifyingKey::<Sha384>::new(rsa_public_key(key)?);
            let sig = rsa::pss::Signature::try_from(sig).map_err(crypto_err)?;
            Ok(verifier.verify(data, &sig).is_ok())
        }
        signature::RSA_SSA_PSS_SHA512 => {
            let verifier = rsa::pss::VerifyingKey::<Sha512>::new(rsa_public_key(key)?);
            let sig = rsa::pss::Signature::try_from(sig).map_err(crypto_err)?;
            Ok(verifier.verify(data, &sig).is_ok())
        }

        signature::ECDSA_SHA256 => {
            let public = p256::PublicKey::from_sec1_bytes(&ec_sec1_bytes(key)?)
                .map_err(crypto_err)?;
            let verifier = p256::ecdsa::VerifyingKey::from(&public);
            let sig = p256::ecdsa::Signature::from_slice(sig).map_err(crypto_err)?;
            Ok(verifier.verify(data, &sig).is_ok())
        }
        signature::ECDSA_SHA384 => {
            let public = p384::PublicKey::from_sec1_bytes(&ec_sec1_bytes(key)?)
                .map_err(crypto_err)?;
            let verifier = p384::ecdsa::VerifyingKey::from(&public);
            let sig = p384::ecdsa::Signature::from_slice(sig).map_err(crypto_err)?;
            Ok(verifier.verify(data, &sig).is_ok())
        }
        signature::ECDSA_SHA512 => {
            let public = p521::PublicKey::from_sec1_bytes(&ec_sec1_bytes(key)?)
                .map_err(crypto_err)?;
            let verifier = p521::ecdsa::VerifyingKey::from_affine(*public.as_affine())
                .map_err(crypto_err)?;
            let sig = p521::ecdsa::Signature::from_slice(sig).map_err(crypto_err)?;
            Ok(verifier.verify(data, &sig).is_ok())
        }

        other => Err(Error::UnsupportedAlgorithm(other.to_string())),
    }
}

fn crypto_err(e: impl std::fmt::Display) -> Error {
    Error::Cryptography(e.to_string())
}

fn decode_field(value: &Option<String>, field: &str) -> Result<Zeroizing<Vec<u8>>, Error> {
    let raw = value
        .as_deref()
        .ok_or_else(|| Error::Cryptography(format!("JWK is missing the '{field}' field")))?;
    Ok(Zeroizing::new(URL_SAFE_NO_PAD.decode(raw)?))
}

fn decode_uint(value: &Option<String>, field: &str) -> Result<BigUint, Error> {
    Ok(BigUint::from_bytes_be(&decode_field(value, field)?))
}

fn rsa_private_key(key: &JsonWebKey) -> Result<RsaPrivateKey, Error> {
    let n = decode_uint(&key.n, "n")?;
    let e = decode_uint(&key.e, "e")?;
    let d = decode_uint(&key.d, "d")?;
    let p = decode_uint(&key.p, "p")?;
    let q = decode_uint(&key.q, "q")?;
    RsaPrivateKey::from_components(n, e, d, vec![p, q]).map_err(crypto_err)
}

fn rsa_public_key(key: &JsonWebKey) -> Result<RsaPublicKey, Error> {
    let n = decode_uint(&key.n, "n")?;
    let e = decode_uint(&key.e, "e")?;
    RsaPublicKey::new(n, e).map_err(crypto_err)
}

/// Uncompressed SEC1 point: 0x04 || x || y.
fn ec_sec1_bytes(key: &JsonWebKey) -> Result<Vec<u8>, Error> {
    let x = decode_field(&key.x, "x")?;
    let y = decode_field(&key.y, "y")?;
    let mut bytes = Vec::with_capacity(1 + x.len() + y.len());
    bytes.push(0x04);
    bytes.extend_from_slice(&x);
    bytes.extend_from_slice(&y);
    Ok(bytes)
}

fn hmac_sign<M: Mac + KeyInit>(key: &[u8], data: &[u8]) -> Result<Vec<u8>, Error> {
    let mut mac = <M as Mac>::new_from_slice(key).map_err(crypto_err)?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn hmac_verify<M: Mac + KeyInit>(key: &[u8], data: &[u8], sig: &[u8]) -> Result<bool, Error> {
    let mut mac = <M as Mac>::new_from_slice(key).map_err(crypto_err)?;
    mac.update(data);
    Ok(mac.verify_slice(sig).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::CryptographicKey;

    fn credentials(alg: &str) -> SigningCredentials {
        let algorithm = Algorithm::create(alg).unwrap();
        let key = CryptographicKey::generate(algorithm.clone()).unwrap();
        SigningCredentials::new(key.json_web_key().clone(), algorithm)
    }

    #[test]
    fn hmac_and_pkcs1_signatures_are_deterministic() {
        let payload = b"{\"sub\":\"1234567890\"}";
        for alg in ["HS256", "RS256"] {
            let creds = credentials(alg);
            let first = creds.sign(payload).unwrap();
            let second = creds.sign(payload).unwrap();
            assert_eq!(first, second, "{alg} must be deterministic");
            assert!(creds.verify(payload, &first).unwrap());
        }
    }

    #[test]
    fn pss_and_ecdsa_signatures_are_probabilistic() {
        let payload = b"{\"sub\":\"1234567890\"}";
        for alg in ["PS256", "ES256"] {
            let creds = credentials(alg);
            let first = creds.sign(payload).unwrap();
            let second = creds.sign(payload).unwrap();
            assert_ne!(first, second, "{alg} embeds a nonce");
            assert!(creds.verify(payload, &first).unwrap());
            assert!(creds.verify(payload, &second).unwrap());
        }
    }

    #[test]
    fn verification_rejects_tampered_payload() {
        let creds = credentials("ES256");
        let sig = creds.sign(b"payload").unwrap();
        assert!(!creds.verify(b"payload-tampered", &sig).unwrap());
    }

    #[test]
    fn verification_works_with_public_projection_only() {
        let creds = credentials("PS256");
        let sig = creds.sign(b"issued before rollover").unwrap();

        let public_only =
            SigningCredentials::new(creds.key().public_jwk(), creds.algorithm().clone());
        assert!(public_only.verify(b"issued before rollover", &sig).unwrap());
        // 没有私钥就无法再签名
        assert!(public_only.sign(b"new token").is_err());
    }
}
