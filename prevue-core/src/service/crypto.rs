//! Access-token encryption using AES-256-GCM
//!
//! Upstream access tokens are encrypted at rest. The stored format is
//! `hex(iv):hex(tag):hex(ciphertext)` with a 16-byte random IV and the
//! 16-byte GCM tag, so rows remain greppable-opaque and portable.

use aes_gcm::{
    aead::{consts::U16, rand_core::RngCore, Aead, KeyInit, OsRng},
    aes::Aes256,
    AesGcm, Key, Nonce,
};
use sha2::{Digest, Sha256};

use crate::{Error, Result};

/// AES-GCM instantiated with a 16-byte nonce to match the stored format.
type TokenAead = AesGcm<Aes256, U16>;

const IV_SIZE: usize = 16;
const TAG_SIZE: usize = 16;

/// Encrypts and decrypts Upstream access tokens.
#[derive(Clone)]
pub struct TokenCipher {
    cipher: TokenAead,
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCipher")
            .field("cipher", &"[REDACTED]")
            .finish()
    }
}

impl TokenCipher {
    /// Build a cipher from arbitrary key material. The material is run
    /// through SHA-256 to produce the 32-byte AES key, so any length of
    /// `DATA_ENCRYPTION_KEY` works (32+ characters recommended).
    #[must_use]
    pub fn from_key_material(material: &str) -> Self {
        let digest = Sha256::digest(material.as_bytes());
        let key = Key::<TokenAead>::from_slice(&digest);
        Self { cipher: TokenAead::new(key) }
    }

    /// Derive a cipher from the machine identity when no key is configured.
    /// Tokens encrypted this way do not survive a hostname change.
    #[must_use]
    pub fn from_machine_identity() -> Self {
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "prevue-host".to_string());
        Self::from_key_material(&format!("prevue-machine:{host}"))
    }

    /// Build from optional configured key material, falling back to the
    /// machine-derived key.
    #[must_use]
    pub fn from_config(encryption_key: Option<&str>) -> Self {
        match encryption_key {
            Some(material) if !material.is_empty() => Self::from_key_material(material),
            _ => {
                tracing::warn!(
                    "DATA_ENCRYPTION_KEY not set; deriving token encryption key from machine identity"
                );
                Self::from_machine_identity()
            }
        }
    }

    /// Encrypt a token. Each call draws a fresh random IV, so two
    /// encryptions of the same plaintext differ.
    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut iv = [0u8; IV_SIZE];
        OsRng.fill_bytes(&mut iv);
        let nonce = Nonce::<U16>::from_slice(&iv);

        let sealed = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| Error::Internal(format!("Token encryption failed: {e}")))?;

        // AEAD output is ciphertext || tag; the stored format keeps them apart.
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_SIZE);
        Ok(format!(
            "{}:{}:{}",
            hex::encode(iv),
            hex::encode(tag),
            hex::encode(ciphertext)
        ))
    }

    /// Decrypt a stored `iv:tag:ciphertext` token.
    pub fn decrypt(&self, stored: &str) -> Result<String> {
        let mut parts = stored.splitn(3, ':');
        let (iv_hex, tag_hex, ct_hex) = match (parts.next(), parts.next(), parts.next()) {
            (Some(a), Some(b), Some(c)) => (a, b, c),
            _ => {
                return Err(Error::Internal(
                    "Encrypted token is not in iv:tag:ciphertext form".to_string(),
                ))
            }
        };

        let iv = decode_hex(iv_hex, "iv")?;
        let tag = decode_hex(tag_hex, "tag")?;
        let ciphertext = decode_hex(ct_hex, "ciphertext")?;
        if iv.len() != IV_SIZE || tag.len() != TAG_SIZE {
            return Err(Error::Internal(
                "Encrypted token has malformed iv or tag".to_string(),
            ));
        }

        let mut sealed = ciphertext;
        sealed.extend_from_slice(&tag);
        let nonce = Nonce::<U16>::from_slice(&iv);

        let plaintext = self
            .cipher
            .decrypt(nonce, sealed.as_ref())
            .map_err(|_| {
                Error::Internal("Token decryption failed (wrong key or corrupted data)".to_string())
            })?;

        String::from_utf8(plaintext)
            .map_err(|_| Error::Internal("Decrypted token is not valid UTF-8".to_string()))
    }
}

fn decode_hex(raw: &str, what: &str) -> Result<Vec<u8>> {
    hex::decode(raw).map_err(|e| Error::Internal(format!("Invalid hex in token {what}: {e}")))
}
