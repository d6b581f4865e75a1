//! Authenticated encryption for report payloads.
//!
//! Ciphertext layout: `nonce (12 bytes) || AES-256-GCM ciphertext+tag`.

use std::path::Path;

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::{errors::Error, Result};

const NONCE_BYTES: usize = 12;
const KEY_BYTES: usize = 32;
const KEYSET_ALGORITHM: &str = "AES256_GCM";

/// A stateful AEAD primitive.
///
/// Implementations are not required to be `Sync`; the reporter serializes
/// every call behind one mutex.
pub trait Cipher: Send {
    fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>>;
    fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>>;
}

/// On-disk keyset.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Keyset {
    pub algorithm: String,
    pub key: String,
}

impl Keyset {
    pub fn generate() -> Self {
        let key = Aes256Gcm::generate_key(OsRng);
        Self {
            algorithm: KEYSET_ALGORITHM.to_string(),
            key: STANDARD.encode(key),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let keyset: Keyset = serde_json::from_str(&raw).map_err(|e| Error::InvalidKeyset {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        if keyset.algorithm != KEYSET_ALGORITHM {
            return Err(Error::InvalidKeyset {
                path: path.to_path_buf(),
                reason: format!("unsupported algorithm {}", keyset.algorithm),
            });
        }
        Ok(keyset)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    fn key_bytes(&self) -> Result<Vec<u8>> {
        let bytes = STANDARD
            .decode(self.key.trim())
            .map_err(|e| Error::Crypto(format!("keyset key is not base64: {e}")))?;
        if bytes.len() != KEY_BYTES {
            return Err(Error::Crypto(format!(
                "keyset key must be {KEY_BYTES} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(bytes)
    }
}

pub struct AesGcmCipher {
    aead: Aes256Gcm,
    sealed: u64,
}

impl AesGcmCipher {
    pub fn from_keyset(keyset: &Keyset) -> Result<Self> {
        let key = keyset.key_bytes()?;
        let aead = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| Error::Crypto(format!("invalid AES-256-GCM key: {e}")))?;
        Ok(Self { aead, sealed: 0 })
    }

    /// Number of payloads sealed by this instance.
    pub fn sealed(&self) -> u64 {
        self.sealed
    }
}

impl Cipher for AesGcmCipher {
    fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .aead
            .encrypt(&nonce, plaintext)
            .map_err(|_| Error::Crypto("payload encryption failed".to_string()))?;
        self.sealed += 1;

        let mut out = Vec::with_capacity(NONCE_BYTES + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < NONCE_BYTES {
            return Err(Error::Crypto("ciphertext shorter than nonce".to_string()));
        }
        let (nonce, body) = ciphertext.split_at(NONCE_BYTES);
        self.aead
            .decrypt(Nonce::from_slice(nonce), body)
            .map_err(|_| Error::Crypto("payload decryption failed".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sealed_payload_opens_with_same_key() {
        let keyset = Keyset::generate();
        let mut c = AesGcmCipher::from_keyset(&keyset).unwrap();
        let sealed = c.encrypt(b"stack trace").unwrap();
        assert_eq!(c.sealed(), 1);
        assert_ne!(&sealed[NONCE_BYTES..], b"stack trace");
        assert_eq!(c.decrypt(&sealed).unwrap(), b"stack trace");
    }

    #[test]
    fn wrong_key_fails_to_open() {
        let mut a = AesGcmCipher::from_keyset(&Keyset::generate()).unwrap();
        let mut b = AesGcmCipher::from_keyset(&Keyset::generate()).unwrap();
        let sealed = a.encrypt(b"secret").unwrap();
        assert!(matches!(b.decrypt(&sealed), Err(Error::Crypto(_))));
    }

    #[test]
    fn keyset_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keyset.json");
        let keyset = Keyset::generate();
        keyset.save(&path).unwrap();
        let loaded = Keyset::load(&path).unwrap();
        assert_eq!(loaded.key, keyset.key);
    }

    #[test]
    fn keyset_rejects_short_key() {
        let keyset = Keyset {
            algorithm: KEYSET_ALGORITHM.to_string(),
            key: STANDARD.encode([0u8; 16]),
        };
        assert!(matches!(
            AesGcmCipher::from_keyset(&keyset),
            Err(Error::Crypto(_))
        ));
    }

    #[test]
    fn keyset_rejects_unknown_algorithm() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keyset.json");
        std::fs::write(&path, r#"{"algorithm":"ROT13","key":""}"#).unwrap();
        assert!(matches!(
            Keyset::load(&path),
            Err(Error::InvalidKeyset { .. })
        ));
    }
}
