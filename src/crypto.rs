//! Raw key material generation: RSA and elliptic curve keypairs,
//! random symmetric secrets and unique key identifiers.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, RsaPrivateKey};

use crate::error::Error;
use crate::jwa::{curves, key_types};
use crate::jwk::JsonWebKey;

/// Default RSA modulus size in bits.
pub const DEFAULT_RSA_KEY_SIZE: usize = 2048;

/// Entropy, in bytes, behind every generated key identifier.
const KEY_ID_LENGTH: usize = 16;

/// Mints a random, URL-safe key identifier.
pub fn create_unique_id() -> String {
    let mut data = [0u8; KEY_ID_LENGTH];
    rand::thread_rng().fill_bytes(&mut data);
    URL_SAFE_NO_PAD.encode(data)
}

fn b64(bytes: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

fn b64_uint(value: &BigUint) -> String {
    b64(value.to_bytes_be())
}

/// Generates a fresh RSA keypair and returns it as a private JWK with
/// all CRT parameters populated.
pub fn create_rsa_jwk(bits: usize) -> Result<JsonWebKey, Error> {
    let private = RsaPrivateKey::new(&mut rand::thread_rng(), bits)
        .map_err(|e| Error::Cryptography(e.to_string()))?;

    let primes = private.primes();
    let (p, q) = (&primes[0], &primes[1]);
    let d = private.d();

    // CRT parameters: dp = d mod (p-1), dq = d mod (q-1), and the
    // inverse of q mod p via Fermat (p is prime).
    let one = BigUint::from(1u8);
    let dp = d % &(p - &one);
    let dq = d % &(q - &one);
    let qi = q.modpow(&(p - &BigUint::from(2u8)), p);

    Ok(JsonWebKey {
        kty: key_types::RSA.to_string(),
        kid: Some(create_unique_id()),
        n: Some(b64_uint(private.n())),
        e: Some(b64_uint(private.e())),
        d: Some(b64_uint(d)),
        p: Some(b64_uint(p)),
        q: Some(b64_uint(q)),
        dp: Some(b64_uint(&dp)),
        dq: Some(b64_uint(&dq)),
        qi: Some(b64_uint(&qi)),
        ..JsonWebKey::default()
    })
}

/// Generates a fresh ECDSA keypair on the named curve
/// (RFC 7518 section 6.2.1.1 `crv` values).
pub fn create_ec_jwk(curve: &str) -> Result<JsonWebKey, Error> {
    use p256::elliptic_curve::sec1::ToEncodedPoint;

    let missing = || Error::Cryptography("point at infinity".to_string());

    let (x, y, d) = match curve {
        curves::P256 => {
            let secret = p256::SecretKey::random(&mut rand::thread_rng());
            let point = secret.public_key().to_encoded_point(false);
            (
                b64(point.x().ok_or_else(missing)?),
                b64(point.y().ok_or_else(missing)?),
                b64(secret.to_bytes()),
            )
        }
        curves::P384 => {
            let secret = p384::SecretKey::random(&mut rand::thread_rng());
            let point = secret.public_key().to_encoded_point(false);
            (
                b64(point.x().ok_or_else(missing)?),
                b64(point.y().ok_or_else(missing)?),
                b64(secret.to_bytes()),
            )
        }
        curves::P521 => {
            let secret = p521::SecretKey::random(&mut rand::thread_rng());
            let point = secret.public_key().to_encoded_point(false);
            (
                b64(point.x().ok_or_else(missing)?),
                b64(point.y().ok_or_else(missing)?),
                b64(secret.to_bytes()),
            )
        }
        other => {
            return Err(Error::InvalidOperation(format!(
                "unsupported curve type of {other}"
            )));
        }
    };

    Ok(JsonWebKey {
        kty: key_types::ELLIPTIC_CURVE.to_string(),
        kid: Some(create_unique_id()),
        crv: Some(curve.to_string()),
        x: Some(x),
        y: Some(y),
        d: Some(d),
        ..JsonWebKey::default()
    })
}

/// Generates a random symmetric secret of `length` bytes as an octet JWK.
pub fn create_oct_jwk(length: usize) -> JsonWebKey {
    let mut data = vec![0u8; length];
    rand::thread_rng().fill_bytes(&mut data);

    JsonWebKey {
        kty: key_types::OCTET.to_string(),
        kid: Some(create_unique_id()),
        k: Some(b64(&data)),
        ..JsonWebKey::default()
    }
}
