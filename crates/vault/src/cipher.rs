//! Authenticated encryption for secret values and the master key.
//!
//! The [`Cipher`] trait keeps the AEAD backend swappable; each backend has
//! a version tag persisted with the data so a future cipher migration can
//! tell blobs apart. Nonces are returned detached because the secret store
//! persists ciphertext and nonce in separate columns.

#[allow(deprecated)] // upstream generic-array 0.x deprecation
use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};
use rand::RngCore;

use crate::error::VaultError;

/// Output of [`Cipher::seal`]: a fresh random nonce and the ciphertext
/// (authentication tag included).
pub struct Sealed {
    pub nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

/// Authenticated encryption with associated data (AEAD).
pub trait Cipher: Send + Sync {
    /// Unique identifier for this cipher, persisted with wrapped keys.
    fn version_tag(&self) -> u8;

    /// Nonce size in bytes.
    fn nonce_len(&self) -> usize;

    /// Encrypt `plaintext` under `key`, binding `aad` into the tag.
    /// Generates a fresh random nonce per call — never reuse one.
    fn seal(&self, key: &[u8; 32], plaintext: &[u8], aad: &[u8]) -> Result<Sealed, VaultError>;

    /// Decrypt and authenticate. Any tampering with nonce, ciphertext, or
    /// AAD fails the tag check.
    fn open(
        &self,
        key: &[u8; 32],
        nonce: &[u8],
        ciphertext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, VaultError>;
}

/// Version tag for the XChaCha20-Poly1305 cipher.
pub const XCHACHA20_VERSION_TAG: u8 = 0x01;

/// XChaCha20-Poly1305 nonce size (24 bytes).
const NONCE_LEN: usize = 24;

/// Poly1305 tag size.
const TAG_LEN: usize = 16;

/// XChaCha20-Poly1305 AEAD cipher. The 24-byte nonce makes random nonces
/// safe at any realistic volume.
pub struct XChaCha20Poly1305Cipher;

impl Cipher for XChaCha20Poly1305Cipher {
    fn version_tag(&self) -> u8 {
        XCHACHA20_VERSION_TAG
    }

    fn nonce_len(&self) -> usize {
        NONCE_LEN
    }

    #[allow(deprecated)]
    fn seal(&self, key: &[u8; 32], plaintext: &[u8], aad: &[u8]) -> Result<Sealed, VaultError> {
        let cipher = XChaCha20Poly1305::new(key.into());

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = XNonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, Payload {
                msg: plaintext,
                aad,
            })
            .map_err(|e| VaultError::Cipher(e.to_string()))?;

        Ok(Sealed {
            nonce: nonce_bytes.to_vec(),
            ciphertext,
        })
    }

    #[allow(deprecated)]
    fn open(
        &self,
        key: &[u8; 32],
        nonce: &[u8],
        ciphertext: &[u8],
        aad: &[u8],
    ) -> Result<Vec<u8>, VaultError> {
        if nonce.len() != NONCE_LEN {
            return Err(VaultError::Cipher(format!(
                "bad nonce length: {} (expected {NONCE_LEN})",
                nonce.len()
            )));
        }
        if ciphertext.len() < TAG_LEN {
            return Err(VaultError::Cipher("ciphertext too short".to_string()));
        }

        let cipher = XChaCha20Poly1305::new(key.into());
        cipher
            .decrypt(XNonce::from_slice(nonce), Payload {
                msg: ciphertext,
                aad,
            })
            .map_err(|e| VaultError::Cipher(e.to_string()))
    }
}
