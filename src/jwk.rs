//! JSON Web Key model (RFC 7517) and the public key set document.

use serde::{Deserialize, Serialize};

use crate::jwa::key_types;

/// One JSON Web Key, private fields included while the key is active.
///
/// Absent fields are omitted from the serialized form rather than
/// emitted as null, so the same model round-trips both the full
/// private representation persisted by a store and the public
/// projection exposed at a discovery endpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonWebKey {
    /// Key type: "RSA", "EC" or "oct".
    pub kty: String,

    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    // Elliptic curve public coordinates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,

    // RSA public modulus and exponent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    /// Symmetric key value. There is no public-only projection for
    /// octet keys; see [`JsonWebKey::public_jwk`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub k: Option<String>,

    // Private components: ECDSA private scalar / RSA private exponent
    // and CRT parameters. Stripped on revocation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dq: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qi: Option<String>,
}

impl JsonWebKey {
    /// Whether any private component is still present.
    pub fn has_private_key(&self) -> bool {
        self.d.is_some()
            || self.p.is_some()
            || self.q.is_some()
            || self.dp.is_some()
            || self.dq.is_some()
            || self.qi.is_some()
    }

    /// The public projection of this key, fit for a discovery document.
    ///
    /// Keeps only the fields applicable to the key's family (RSA keys
    /// never carry `x`/`y`, EC keys never carry `n`/`e`) and drops every
    /// private component. Octet keys have no public-only form: `k` is
    /// the secret itself and is retained as-is.
    pub fn public_jwk(&self) -> JsonWebKey {
        let mut public = JsonWebKey {
            kty: self.kty.clone(),
            key_use: self.key_use.clone(),
            kid: self.kid.clone(),
            alg: self.alg.clone(),
            ..JsonWebKey::default()
        };

        match self.kty.as_str() {
            key_types::ELLIPTIC_CURVE => {
                public.crv = self.crv.clone();
                public.x = self.x.clone();
                public.y = self.y.clone();
            }
            key_types::RSA => {
                public.n = self.n.clone();
                public.e = self.e.clone();
            }
            key_types::OCTET => {
                public.k = self.k.clone();
            }
            _ => {}
        }

        public
    }
}

/// The discovery document: `{"keys":[...]}`.
/// 中文: 公开发布的密钥集合文档。
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct JsonWebKeySet {
    pub keys: Vec<JsonWebKey>,
}

impl JsonWebKeySet {
    pub fn new(keys: Vec<JsonWebKey>) -> Self {
        Self { keys }
    }
}
