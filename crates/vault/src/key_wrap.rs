//! Master-key wrapping under the passphrase-derived KEK.
//!
//! The wrapped key is a single base64 text blob
//! `[version tag | nonce | ciphertext+tag]` stored in `vault_config`.
//! The AAD is fixed to domain-separate key wrapping from value encryption:
//! a ciphertext from one context can never be replayed into the other.

use {base64::Engine, zeroize::Zeroizing};

use crate::{
    cipher::Cipher,
    error::VaultError,
};

/// AAD for master-key wrapping.
const WRAP_AAD: &[u8] = b"agency-vault:master-key";

/// Wrap (encrypt) the master key under the KEK. Returns a base64 blob.
pub fn wrap_master_key<C: Cipher>(
    cipher: &C,
    kek: &[u8; 32],
    master_key: &[u8; 32],
) -> Result<String, VaultError> {
    let sealed = cipher.seal(kek, master_key, WRAP_AAD)?;

    let mut blob = Vec::with_capacity(1 + sealed.nonce.len() + sealed.ciphertext.len());
    blob.push(cipher.version_tag());
    blob.extend_from_slice(&sealed.nonce);
    blob.extend_from_slice(&sealed.ciphertext);

    Ok(base64::engine::general_purpose::STANDARD.encode(blob))
}

/// Unwrap (decrypt) the master key from a stored blob.
///
/// An authentication failure means the KEK is wrong — i.e. the passphrase
/// was wrong — and the caller maps it accordingly. The tag check is the
/// passphrase integrity check; there is no separate comparison to leak
/// timing through.
pub fn unwrap_master_key<C: Cipher>(
    cipher: &C,
    kek: &[u8; 32],
    wrapped_b64: &str,
) -> Result<Zeroizing<[u8; 32]>, VaultError> {
    let blob = base64::engine::general_purpose::STANDARD.decode(wrapped_b64)?;

    let nonce_len = cipher.nonce_len();
    if blob.len() < 1 + nonce_len {
        return Err(VaultError::Cipher("wrapped master key too short".to_string()));
    }

    let version = blob[0];
    if version != cipher.version_tag() {
        return Err(VaultError::Cipher(format!(
            "unsupported cipher version: {version:#04x}, expected {:#04x}",
            cipher.version_tag()
        )));
    }

    let (nonce, ciphertext) = blob[1..].split_at(nonce_len);
    let plaintext = cipher.open(kek, nonce, ciphertext, WRAP_AAD)?;

    if plaintext.len() != 32 {
        return Err(VaultError::Cipher(format!(
            "unwrapped master key has wrong length: {} (expected 32)",
            plaintext.len()
        )));
    }

    let mut master_key = Zeroizing::new([0u8; 32]);
    master_key.copy_from_slice(&plaintext);
    Ok(master_key)
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::cipher::XChaCha20Poly1305Cipher};

    #[test]
    fn round_trip() {
        let cipher = XChaCha20Poly1305Cipher;
        let kek = [0xAA; 32];
        let master_key = [0xBB; 32];

        let wrapped = wrap_master_key(&cipher, &kek, &master_key).unwrap();
        let unwrapped = unwrap_master_key(&cipher, &kek, &wrapped).unwrap();
        assert_eq!(*unwrapped, master_key);
    }

    #[test]
    fn wrong_kek_fails() {
        let cipher = XChaCha20Poly1305Cipher;

        let wrapped = wrap_master_key(&cipher, &[0xAA; 32], &[0xBB; 32]).unwrap();
        assert!(unwrap_master_key(&cipher, &[0xCC; 32], &wrapped).is_err());
    }

    #[test]
    fn tampered_blob_fails() {
        let cipher = XChaCha20Poly1305Cipher;
        let kek = [0xAA; 32];

        let wrapped = wrap_master_key(&cipher, &kek, &[0xBB; 32]).unwrap();
        let mut blob = base64::engine::general_purpose::STANDARD
            .decode(&wrapped)
            .unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0x01;
        let tampered = base64::engine::general_purpose::STANDARD.encode(&blob);

        assert!(unwrap_master_key(&cipher, &kek, &tampered).is_err());
    }

    #[test]
    fn blob_carries_version_tag() {
        let cipher = XChaCha20Poly1305Cipher;

        let wrapped = wrap_master_key(&cipher, &[0xAA; 32], &[0xBB; 32]).unwrap();
        let blob = base64::engine::general_purpose::STANDARD
            .decode(&wrapped)
            .unwrap();
        assert_eq!(blob[0], cipher.version_tag());
    }

    #[test]
    fn truncated_blob_fails() {
        let cipher = XChaCha20Poly1305Cipher;
        let short = base64::engine::general_purpose::STANDARD.encode([0x01u8; 8]);
        assert!(unwrap_master_key(&cipher, &[0xAA; 32], &short).is_err());
    }
}
