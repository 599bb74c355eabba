//! Encrypted-at-rest credential storage for the agency platform.
//!
//! Secret values are encrypted with XChaCha20-Poly1305 under a random
//! master key; the master key is wrapped with a passphrase-derived KEK
//! (Argon2id) and lives in memory only while the vault is unlocked. On top
//! of the lock/unlock lifecycle sit tag- and grant-based access control,
//! ephemeral session tokens that suspend auto-lock, one-time recovery
//! codes for a destructive break-glass reset, and an append-only audit
//! trail of every sensitive operation.
//!
//! [`SecretVault`] is the facade the request-routing layer calls; it does
//! no authentication itself — callers arrive already resolved to an
//! [`Accessor`] by the identity layer.

mod access;
mod audit;
mod session;
mod store;

pub mod cipher;
pub mod error;
pub mod kdf;
pub mod key_wrap;
pub mod recovery;
pub mod schema;
pub mod service;
pub mod types;
pub mod vault;

pub use {
    cipher::{Cipher, Sealed, XChaCha20Poly1305Cipher},
    error::VaultError,
    kdf::KdfParams,
    schema::init_schema,
    service::SecretVault,
    types::{
        Accessor, AccessorKind, AuditAction, AuditEntry, AuditQuery, GrantSpec, ListFilter,
        NewSecret, Permission, RevealedSecret, Secret, SecretDetails, SecretGrant, SecretPatch,
        SecretStats, SecretTag, SecretType, SessionInfo, StatusReport, TagSpec, TagType,
        VaultState,
    },
    vault::{AUTO_LOCK_TIMEOUT, MIN_PASSPHRASE_LEN, Vault, VaultOptions},
};
