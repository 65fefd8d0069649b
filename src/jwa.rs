//! JSON Web Algorithm (JWA) policy model.
//!
//! An [`Algorithm`] describes one cryptographic algorithm choice from
//! RFC 7518: its family, whether it signs or encrypts, the curve for
//! elliptic-curve families and the content encryption scheme for JWE,
//! together with the validation rules the RFC imposes on those fields.
// 中文: JSON Web Algorithm (JWA) 策略模型。

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Digital signature algorithm identifiers.
/// <https://datatracker.ietf.org/doc/html/rfc7518#section-3.1>
pub mod signature {
    pub const ECDSA_SHA256: &str = "ES256";
    pub const ECDSA_SHA384: &str = "ES384";
    pub const ECDSA_SHA512: &str = "ES512";
    pub const HMAC_SHA256: &str = "HS256";
    pub const HMAC_SHA384: &str = "HS384";
    pub const HMAC_SHA512: &str = "HS512";
    pub const RSA_SHA256: &str = "RS256";
    pub const RSA_SHA384: &str = "RS384";
    pub const RSA_SHA512: &str = "RS512";
    pub const RSA_SSA_PSS_SHA256: &str = "PS256";
    pub const RSA_SSA_PSS_SHA384: &str = "PS384";
    pub const RSA_SSA_PSS_SHA512: &str = "PS512";
}

/// Key management algorithm identifiers for encrypted keys.
/// <https://datatracker.ietf.org/doc/html/rfc7518#section-4.1>
pub mod key_management {
    pub const AES128_KW: &str = "A128KW";
    pub const AES256_KW: &str = "A256KW";
    pub const RSA_PKCS1: &str = "RSA1_5";
    pub const RSA_OAEP: &str = "RSA-OAEP";
}

/// Content encryption identifiers.
/// <https://datatracker.ietf.org/doc/html/rfc7518#section-5.1>
pub mod content {
    pub const AES128_CBC_HMAC_SHA256: &str = "A128CBC-HS256";
    pub const AES192_CBC_HMAC_SHA384: &str = "A192CBC-HS384";
    pub const AES256_CBC_HMAC_SHA512: &str = "A256CBC-HS512";
    pub const AES128_GCM: &str = "A128GCM";
    pub const AES192_GCM: &str = "A192GCM";
    pub const AES256_GCM: &str = "A256GCM";
}

/// "kty" (key type) parameter values.
/// <https://datatracker.ietf.org/doc/html/rfc7518#section-6.1>
pub mod key_types {
    pub const RSA: &str = "RSA";
    pub const ELLIPTIC_CURVE: &str = "EC";
    pub const OCTET: &str = "oct";
}

/// "crv" parameter values from RFC 7518 section 6.2.1.1.
pub mod curves {
    pub const P256: &str = "P-256";
    pub const P384: &str = "P-384";
    pub const P521: &str = "P-521";
}

/// 算法家族
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlgorithmType {
    Rsa,
    Ecdsa,
    Hmac,
    Aes,
}

/// Whether the algorithm produces signatures or encrypts content.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CryptographyType {
    DigitalSignature,
    Encryption,
}

/// Jws keys carry digital signature algorithms, Jwe keys carry
/// encryption algorithms.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JwtKeyType {
    Jws,
    Jwe,
}

impl JwtKeyType {
    /// The JWK "use" tag for this key type.
    pub fn use_tag(self) -> &'static str {
        match self {
            JwtKeyType::Jws => "sig",
            JwtKeyType::Jwe => "enc",
        }
    }

    /// Parses a JWK "use" tag back into a key type.
    pub fn from_use_tag(tag: &str) -> Option<Self> {
        match tag {
            "sig" => Some(JwtKeyType::Jws),
            "enc" => Some(JwtKeyType::Jwe),
            _ => None,
        }
    }
}

impl std::fmt::Display for JwtKeyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtKeyType::Jws => write!(f, "jws"),
            JwtKeyType::Jwe => write!(f, "jwe"),
        }
    }
}

/// A fully populated algorithm policy.
///
/// Built from a well-known JWA identifier with [`Algorithm::create`], or
/// from a family/purpose pair with [`Algorithm::recommended`], then
/// optionally refined with [`Algorithm::with_curve`] /
/// [`Algorithm::with_content_encryption`]. The constructors infer the
/// family and purpose so the two can never disagree with the identifier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Algorithm {
    alg: String,
    algorithm_type: AlgorithmType,
    cryptography_type: CryptographyType,
    curve: Option<String>,
    content_encryption: Option<String>,
}

impl Algorithm {
    /// Maps a well-known JWA identifier to a policy, inferring family,
    /// purpose and (for ECDSA) the curve.
    ///
    /// # Errors
    /// [`Error::UnsupportedAlgorithm`] for unrecognized identifiers.
    pub fn create(algorithm: &str) -> Result<Self, Error> {
        use self::{key_management as kw, signature as sig};

        let (algorithm_type, cryptography_type, curve) = match algorithm {
            kw::AES128_KW | kw::AES256_KW => {
                (AlgorithmType::Aes, CryptographyType::Encryption, None)
            }
            kw::RSA_PKCS1 | kw::RSA_OAEP => {
                (AlgorithmType::Rsa, CryptographyType::Encryption, None)
            }
            sig::ECDSA_SHA256 => (
                AlgorithmType::Ecdsa,
                CryptographyType::DigitalSignature,
                Some(curves::P256),
            ),
            sig::ECDSA_SHA384 => (
                AlgorithmType::Ecdsa,
                CryptographyType::DigitalSignature,
                Some(curves::P384),
            ),
            sig::ECDSA_SHA512 => (
                AlgorithmType::Ecdsa,
                CryptographyType::DigitalSignature,
                Some(curves::P521),
            ),
            sig::HMAC_SHA256 | sig::HMAC_SHA384 | sig::HMAC_SHA512 => {
                (AlgorithmType::Hmac, CryptographyType::DigitalSignature, None)
            }
            sig::RSA_SHA256 | sig::RSA_SHA384 | sig::RSA_SHA512
            | sig::RSA_SSA_PSS_SHA256 | sig::RSA_SSA_PSS_SHA384 | sig::RSA_SSA_PSS_SHA512 => {
                (AlgorithmType::Rsa, CryptographyType::DigitalSignature, None)
            }
            other => return Err(Error::UnsupportedAlgorithm(other.to_string())),
        };

        Ok(Self {
            alg: algorithm.to_string(),
            algorithm_type,
            cryptography_type,
            curve: curve.map(str::to_string),
            content_encryption: None,
        })
    }

    /// Returns the recommended default policy for a family/purpose pair:
    /// PS256 for RSA signatures, ES256 on P-256 for ECDSA signatures,
    /// HS256 for HMAC, RSA-OAEP + A128CBC-HS256 for RSA encryption and
    /// A128KW + A128CBC-HS256 for AES key wrapping.
    pub fn recommended(
        algorithm_type: AlgorithmType,
        key_type: JwtKeyType,
    ) -> Result<Self, Error> {
        match key_type {
            JwtKeyType::Jws => match algorithm_type {
                AlgorithmType::Rsa => Self::create(signature::RSA_SSA_PSS_SHA256),
                AlgorithmType::Ecdsa => Self::create(signature::ECDSA_SHA256),
                AlgorithmType::Hmac => Self::create(signature::HMAC_SHA256),
                AlgorithmType::Aes => Err(Error::InvalidOperation(format!(
                    "invalid algorithm for Json Web Signature (JWS): {algorithm_type:?}"
                ))),
            },
            JwtKeyType::Jwe => match algorithm_type {
                AlgorithmType::Rsa => Self::create(key_management::RSA_OAEP)?
                    .with_content_encryption(content::AES128_CBC_HMAC_SHA256),
                AlgorithmType::Aes => Self::create(key_management::AES128_KW)?
                    .with_content_encryption(content::AES128_CBC_HMAC_SHA256),
                _ => Err(Error::InvalidOperation(format!(
                    "invalid algorithm for Json Web Encryption (JWE): {algorithm_type:?}"
                ))),
            },
        }
    }

    pub(crate) fn default_jws() -> Self {
        Self {
            alg: signature::RSA_SSA_PSS_SHA256.to_string(),
            algorithm_type: AlgorithmType::Rsa,
            cryptography_type: CryptographyType::DigitalSignature,
            curve: None,
            content_encryption: None,
        }
    }

    pub(crate) fn default_jwe() -> Self {
        Self {
            alg: key_management::RSA_OAEP.to_string(),
            algorithm_type: AlgorithmType::Rsa,
            cryptography_type: CryptographyType::Encryption,
            curve: None,
            content_encryption: Some(content::AES128_CBC_HMAC_SHA256.to_string()),
        }
    }

    /// Overrides the curve. Only elliptic curve families accept curves.
    pub fn with_curve(mut self, curve: &str) -> Result<Self, Error> {
        if self.algorithm_type != AlgorithmType::Ecdsa {
            return Err(Error::InvalidOperation(
                "only Elliptic Curves accept curves".to_string(),
            ));
        }
        self.curve = Some(curve.to_string());
        Ok(self)
    }

    /// Sets the content encryption scheme. Only Json Web Encryption has
    /// an `enc` parameter.
    pub fn with_content_encryption(mut self, enc: &str) -> Result<Self, Error> {
        if self.cryptography_type == CryptographyType::DigitalSignature {
            return Err(Error::InvalidOperation(
                "only Json Web Encryption has enc param".to_string(),
            ));
        }

        match enc {
            content::AES128_CBC_HMAC_SHA256
            | content::AES192_CBC_HMAC_SHA384
            | content::AES256_CBC_HMAC_SHA512
            | content::AES128_GCM
            | content::AES192_GCM
            | content::AES256_GCM => {
                self.content_encryption = Some(enc.to_string());
                Ok(self)
            }
            other => Err(Error::UnsupportedAlgorithm(format!(
                "not supported encryption algorithm {other}"
            ))),
        }
    }

    /// The canonical "kty" tag for this family, used to test whether a
    /// stored key is still compatible with the configured policy.
    pub fn kty(&self) -> &'static str {
        match self.algorithm_type {
            AlgorithmType::Rsa => key_types::RSA,
            AlgorithmType::Ecdsa => key_types::ELLIPTIC_CURVE,
            AlgorithmType::Hmac | AlgorithmType::Aes => key_types::OCTET,
        }
    }

    /// The JWK "use" value derived from the purpose.
    pub fn use_tag(&self) -> &'static str {
        self.jwt_key_type().use_tag()
    }

    pub fn jwt_key_type(&self) -> JwtKeyType {
        match self.cryptography_type {
            CryptographyType::DigitalSignature => JwtKeyType::Jws,
            CryptographyType::Encryption => JwtKeyType::Jwe,
        }
    }

    pub fn alg(&self) -> &str {
        &self.alg
    }

    pub fn algorithm_type(&self) -> AlgorithmType {
        self.algorithm_type
    }

    pub fn cryptography_type(&self) -> CryptographyType {
        self.cryptography_type
    }

    pub fn curve(&self) -> Option<&str> {
        self.curve.as_deref()
    }

    pub fn content_encryption(&self) -> Option<&str> {
        self.content_encryption.as_deref()
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.alg)
    }
}
