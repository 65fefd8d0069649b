//! Construction-time configuration for the key manager and stores.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::jwa::Algorithm;

/// Options consumed once at construction and never re-read at runtime.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JwksOptions {
    /// Algorithm for signature (JWS) keys.
    pub jws: Algorithm,
    /// Algorithm for encryption (JWE) keys, content scheme included.
    pub jwe: Algorithm,
    /// Days a key stays current before rotation replaces it.
    pub days_until_expire: u32,
    /// How many historical keys to retain and advertise per use.
    pub algorithms_to_keep: usize,
    /// Sliding window of the read-through cache.
    pub cache_time: Duration,
    /// Prefix applied to key file/blob names, so several instances can
    /// share one backing store without colliding.
    pub key_prefix: String,
}

impl Default for JwksOptions {
    fn default() -> Self {
        Self {
            jws: Algorithm::default_jws(),
            jwe: Algorithm::default_jwe(),
            days_until_expire: 90,
            algorithms_to_keep: 2,
            cache_time: Duration::from_secs(15 * 60),
            key_prefix: format!("{}_", machine_name()),
        }
    }
}

fn machine_name() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "jwks".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let options = JwksOptions::default();
        assert_eq!(options.jws.alg(), "PS256");
        assert_eq!(options.jwe.alg(), "RSA-OAEP");
        assert_eq!(options.jwe.content_encryption(), Some("A128CBC-HS256"));
        assert_eq!(options.days_until_expire, 90);
        assert_eq!(options.algorithms_to_keep, 2);
        assert_eq!(options.cache_time, Duration::from_secs(900));
        assert!(options.key_prefix.ends_with('_'));
    }
}
