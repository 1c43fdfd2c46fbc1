//! Optional encryption of state at rest.
//!
//! Encrypted state is stored as a JSON envelope:
//!
//! ```json
//! { "encryption": "aes_gcm", "nonce": "<hex>", "payload": "<hex>" }
//! ```
//!
//! The 256-bit key is derived from a passphrase with HKDF-SHA256.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use hkdf::Hkdf;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::StateError;

const ENVELOPE_METHOD: &str = "aes_gcm";
const KEY_SALT: &[u8] = b"mantle-state-encryption-v1";
const KEY_INFO: &[u8] = b"aes-256-gcm state key";
const NONCE_LEN: usize = 12;

/// How state is protected at rest.
#[derive(Clone, Default)]
pub enum Encryption {
    /// State is stored as plain JSON.
    #[default]
    Disabled,
    /// State is encrypted with a key derived from a passphrase.
    Passphrase {
        /// Derived AES-256 key.
        key: [u8; 32],
    },
}

impl std::fmt::Debug for Encryption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disabled => write!(f, "Disabled"),
            Self::Passphrase { .. } => write!(f, "Passphrase {{ key: <redacted> }}"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    encryption: String,
    nonce: String,
    payload: String,
}

impl Encryption {
    /// Derives an encryption key from a passphrase.
    ///
    /// # Errors
    ///
    /// Returns an error if the passphrase is empty.
    pub fn from_passphrase(passphrase: &str) -> Result<Self, StateError> {
        if passphrase.is_empty() {
            return Err(StateError::Encryption {
                message: "the encryption passphrase must not be empty".into(),
            });
        }
        let hkdf = Hkdf::<Sha256>::new(Some(KEY_SALT), passphrase.as_bytes());
        let mut key = [0u8; 32];
        hkdf.expand(KEY_INFO, &mut key).map_err(|e| StateError::Encryption {
            message: format!("key derivation failed: {e}"),
        })?;
        Ok(Self::Passphrase { key })
    }

    /// Returns true if state will be encrypted.
    pub const fn is_enabled(&self) -> bool {
        matches!(self, Self::Passphrase { .. })
    }

    /// Encrypts serialized state. Disabled encryption returns the input.
    ///
    /// # Errors
    ///
    /// Returns an error if the cipher fails.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, StateError> {
        let Self::Passphrase { key } = self else {
            return Ok(plaintext.to_vec());
        };
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| StateError::Encryption {
            message: format!("failed to create cipher: {e}"),
        })?;
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|e| StateError::Encryption {
                message: format!("encryption failed: {e}"),
            })?;
        let envelope = Envelope {
            encryption: ENVELOPE_METHOD.into(),
            nonce: hex::encode(nonce_bytes),
            payload: hex::encode(ciphertext),
        };
        let mut out = serde_json::to_vec_pretty(&envelope).map_err(|source| StateError::Decode {
            origin: "encryption envelope".into(),
            source,
        })?;
        out.push(b'\n');
        Ok(out)
    }

    /// Decrypts stored state.
    ///
    /// Plain JSON is returned unchanged even when encryption is enabled, so
    /// existing unencrypted state can be migrated by the next write.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is an encrypted envelope and no key is
    /// configured, the key is wrong, or the envelope is malformed.
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, StateError> {
        let Some(envelope) = parse_envelope(data) else {
            if self.is_enabled() {
                tracing::warn!("reading unencrypted state with encryption enabled; it will be encrypted on the next write");
            }
            return Ok(data.to_vec());
        };
        let Self::Passphrase { key } = self else {
            return Err(StateError::Encryption {
                message: "the state is encrypted, but no encryption passphrase is configured".into(),
            });
        };
        if envelope.encryption != ENVELOPE_METHOD {
            return Err(StateError::Encryption {
                message: format!("unsupported encryption method {:?}", envelope.encryption),
            });
        }
        let malformed = |what: &str| StateError::Encryption {
            message: format!("malformed encrypted state: invalid {what}"),
        };
        let nonce = hex::decode(&envelope.nonce).map_err(|_| malformed("nonce"))?;
        if nonce.len() != NONCE_LEN {
            return Err(malformed("nonce"));
        }
        let payload = hex::decode(&envelope.payload).map_err(|_| malformed("payload"))?;
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|e| StateError::Encryption {
            message: format!("failed to create cipher: {e}"),
        })?;
        cipher
            .decrypt(Nonce::from_slice(&nonce), payload.as_slice())
            .map_err(|_| StateError::Encryption {
                message: "decryption failed; the passphrase may be wrong".into(),
            })
    }
}

fn parse_envelope(data: &[u8]) -> Option<Envelope> {
    let value: serde_json::Value = serde_json::from_slice(data).ok()?;
    if value.get("encryption").is_none() {
        return None;
    }
    serde_json::from_value(value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_then_decrypt() {
        let enc = Encryption::from_passphrase("correct horse").expect("key");
        let sealed = enc.encrypt(b"{\"version\": 4}").expect("encrypt");
        let text = String::from_utf8(sealed.clone()).expect("utf8");
        assert!(text.contains("\"encryption\": \"aes_gcm\""));
        assert!(!text.contains("version"));
        assert_eq!(enc.decrypt(&sealed).expect("decrypt"), b"{\"version\": 4}");
    }

    #[test]
    fn wrong_passphrase_fails() {
        let sealed = Encryption::from_passphrase("a")
            .expect("key")
            .encrypt(b"{}")
            .expect("encrypt");
        let other = Encryption::from_passphrase("b").expect("key");
        assert!(other.decrypt(&sealed).is_err());
    }

    #[test]
    fn encrypted_state_without_key_fails() {
        let sealed = Encryption::from_passphrase("a")
            .expect("key")
            .encrypt(b"{}")
            .expect("encrypt");
        let err = Encryption::Disabled.decrypt(&sealed).expect_err("should fail");
        assert!(err.to_string().contains("no encryption passphrase"));
    }

    #[test]
    fn plaintext_passes_through() {
        let enc = Encryption::from_passphrase("a").expect("key");
        assert_eq!(enc.decrypt(b"{\"serial\": 1}").expect("decrypt"), b"{\"serial\": 1}");
        assert_eq!(Encryption::Disabled.encrypt(b"x").expect("encrypt"), b"x");
    }

    #[test]
    fn empty_passphrase_rejected() {
        assert!(Encryption::from_passphrase("").is_err());
    }

    #[test]
    fn debug_hides_key() {
        let enc = Encryption::from_passphrase("secret").expect("key");
        assert_eq!(format!("{enc:?}"), "Passphrase { key: <redacted> }");
    }
}
