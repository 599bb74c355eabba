//! Vault error types.
//!
//! Every variant is terminal from the caller's point of view except
//! [`VaultError::Locked`], which clears after a successful unlock. The
//! consuming router maps variants onto transport signals roughly as:
//! `NotFound` → not-found, `AccessDenied` → forbidden, `AlreadyInitialized`
//! and `NameAlreadyExists` → conflict, `Locked` → locked,
//! `InvalidPassphrase` → unauthorized, and the validation variants
//! (`WeakPassphrase`, `InvalidName`, `InvalidValue`,
//! `ConfirmationRequired`, `InvalidRecoveryCode`) → bad-request.

/// Errors produced by vault operations.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// The vault has no configuration yet (never initialized).
    #[error("vault is not initialized")]
    Uninitialized,

    /// The vault already has a configuration (master key already exists).
    #[error("vault is already initialized")]
    AlreadyInitialized,

    /// The supplied passphrase does not unwrap the master key.
    #[error("incorrect passphrase")]
    InvalidPassphrase,

    /// The vault is locked — the master key is not in memory.
    #[error("vault is locked")]
    Locked,

    /// The accessor holds no sufficient permission on the target secret.
    #[error("access denied")]
    AccessDenied,

    /// No secret, tag, or grant matches the given reference.
    #[error("not found: {0}")]
    NotFound(String),

    /// A secret with this name already exists.
    #[error("secret name already taken: {0}")]
    NameAlreadyExists(String),

    /// A destructive operation was requested without its confirmation flag.
    #[error("confirmation required: recovery resets the vault and deletes every stored secret")]
    ConfirmationRequired,

    /// The recovery code is unknown or was already consumed. Both cases
    /// produce this same error on purpose.
    #[error("invalid or already used recovery code")]
    InvalidRecoveryCode,

    /// Passphrase fails the length policy (12–256 characters).
    #[error("passphrase must be between 12 and 256 characters")]
    WeakPassphrase,

    /// Secret name fails the naming policy.
    #[error("invalid secret name: {0}")]
    InvalidName(String),

    /// Secret value is empty or exceeds the storable size.
    #[error("secret value must be between 1 byte and 64 KiB")]
    InvalidValue,

    /// The in-memory session registry is at capacity.
    #[error("session token limit reached")]
    TooManySessions,

    /// Encryption or decryption failed (tampered data, wrong key).
    #[error("cipher error: {0}")]
    Cipher(String),

    /// A persisted row holds a value the domain model cannot represent.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// Base64 decoding failed.
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON serialization / deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error wrapper.
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Whether a sqlx error is a UNIQUE-constraint violation.
///
/// Used to turn the atomic insert on `secrets.name` into
/// [`VaultError::NameAlreadyExists`] without a racy existence pre-check.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
