//! Protects [`AuthProperties`] into the opaque `state` parameter sent through CAS.
//!
//! Wire format: base64url(nonce (12 bytes) || AES-256-GCM ciphertext+tag). The
//! plaintext is JSON holding the properties and an expiry timestamp.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::properties::AuthProperties;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_PURPOSE: &str = "cas-auth.state.v1";

#[derive(Debug, Error)]
pub enum StateError {
    #[error("state is not valid base64url")]
    Encoding,
    #[error("state is too short")]
    Truncated,
    #[error("state failed authentication")]
    Tampered,
    #[error("state encryption failed")]
    Encrypt,
    #[error("state payload is corrupt: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("state expired at {0}")]
    Expired(DateTime<Utc>),
    #[error("state lifetime is out of range")]
    LifetimeOutOfRange,
}

#[derive(Serialize)]
struct SealedProperties<'a> {
    properties: &'a AuthProperties,
    exp: i64,
}

#[derive(Deserialize)]
struct OpenedProperties {
    properties: AuthProperties,
    exp: i64,
}

/// Authenticated encryption of the properties bag, keyed per authentication scheme.
#[derive(Clone)]
pub struct StateCodec {
    cipher: Aes256Gcm,
    lifetime: Duration,
}

impl std::fmt::Debug for StateCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Do not print key material
        f.debug_struct("StateCodec")
            .field("lifetime", &self.lifetime)
            .finish()
    }
}

impl StateCodec {
    /// `secret` is the configured state secret; `scheme` separates keys between
    /// CAS schemes hosted in one process.
    pub fn new(secret: &str, scheme: &str, lifetime: Duration) -> Self {
        let key = derive_key(secret, scheme);
        Self {
            cipher: Aes256Gcm::new((&key).into()),
            lifetime,
        }
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    pub fn protect(&self, properties: &AuthProperties) -> Result<String, StateError> {
        self.seal(properties, Utc::now())
    }

    /// Returns `None` for anything that does not decrypt to unexpired properties.
    pub fn unprotect(&self, protected: &str) -> Option<AuthProperties> {
        match self.open(protected, Utc::now()) {
            Ok(properties) => Some(properties),
            Err(e) => {
                debug!(error = %e, "rejecting protected state");
                None
            }
        }
    }

    fn seal(&self, properties: &AuthProperties, now: DateTime<Utc>) -> Result<String, StateError> {
        let exp = now
            .checked_add_signed(self.lifetime)
            .ok_or(StateError::LifetimeOutOfRange)?;
        let payload = serde_json::to_vec(&SealedProperties {
            properties,
            exp: exp.timestamp(),
        })?;

        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), payload.as_ref())
            .map_err(|_| StateError::Encrypt)?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);

        Ok(URL_SAFE_NO_PAD.encode(blob))
    }

    fn open(&self, protected: &str, now: DateTime<Utc>) -> Result<AuthProperties, StateError> {
        let blob = URL_SAFE_NO_PAD
            .decode(protected)
            .map_err(|_| StateError::Encoding)?;

        if blob.len() < NONCE_LEN + TAG_LEN {
            return Err(StateError::Truncated);
        }

        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| StateError::Tampered)?;

        let opened: OpenedProperties = serde_json::from_slice(&plaintext)?;

        if now.timestamp() > opened.exp {
            let expired_at = DateTime::from_timestamp(opened.exp, 0).unwrap_or(now);
            return Err(StateError::Expired(expired_at));
        }

        Ok(opened.properties)
    }
}

fn derive_key(secret: &str, scheme: &str) -> [u8; 32] {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(KEY_PURPOSE.as_bytes());
    hasher.update([0u8]);
    hasher.update(scheme.as_bytes());
    hasher.update([0u8]);
    hasher.update(secret.as_bytes());
    hasher.finalize().into()
}
