//! Argon2id key derivation: passphrase → key-encryption-key.
//!
//! The KEK only ever wraps the master key; it never touches secret values.
//! Parameters are persisted next to the wrapped key so they can be tuned
//! without breaking existing deployments.

use {argon2::Argon2, zeroize::Zeroizing};

use crate::error::VaultError;

/// Argon2id parameters stored alongside the wrapped master key.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub m_cost: u32,
    /// Number of iterations.
    pub t_cost: u32,
    /// Degree of parallelism.
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        // 64 MiB, 3 passes, 4 lanes.
        Self {
            m_cost: 65536,
            t_cost: 3,
            p_cost: 4,
        }
    }
}

impl KdfParams {
    /// Cheap parameters for tests. Useless against brute force.
    pub fn insecure_fast() -> Self {
        Self {
            m_cost: 256,
            t_cost: 1,
            p_cost: 1,
        }
    }
}

/// Derive a 256-bit key from a passphrase and salt using Argon2id.
pub fn derive_key(
    passphrase: &[u8],
    salt: &[u8],
    params: &KdfParams,
) -> Result<Zeroizing<[u8; 32]>, VaultError> {
    let argon2_params = argon2::Params::new(params.m_cost, params.t_cost, params.p_cost, Some(32))
        .map_err(|e| VaultError::Cipher(format!("invalid KDF params: {e}")))?;

    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon2_params,
    );

    let mut kek = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(passphrase, salt, kek.as_mut())
        .map_err(|e| VaultError::Cipher(format!("KDF failed: {e}")))?;

    Ok(kek)
}

/// Generate a random 32-byte salt, base64-encoded for storage.
pub fn generate_salt() -> String {
    use {base64::Engine, rand::RngCore};

    let mut salt = [0u8; 32];
    rand::rng().fill_bytes(&mut salt);
    base64::engine::general_purpose::STANDARD.encode(salt)
}

/// Decode a stored base64 salt.
pub fn decode_salt(b64: &str) -> Result<Vec<u8>, VaultError> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(b64)
        .map_err(VaultError::Base64)
}
