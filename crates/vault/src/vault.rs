//! Vault state machine: initialization, lock/unlock, auto-lock, recovery.
//!
//! The plaintext master key lives in exactly one place — the `RwLock`ed
//! slot owned by [`Vault`] — and only while the vault is unlocked. Every
//! operation that needs the key holds a read guard for its full duration,
//! so a concurrent lock (explicit or auto) cannot pull the key out from
//! under it. `None` in the slot means locked.

use std::{
    sync::{Arc, Mutex as StdMutex, PoisonError},
    time::{Duration, Instant},
};

use {
    sqlx::SqlitePool,
    tokio::sync::{RwLock, RwLockMappedReadGuard, RwLockReadGuard},
    zeroize::Zeroizing,
};

use crate::{
    cipher::{Cipher, XChaCha20Poly1305Cipher},
    error::{VaultError, is_unique_violation},
    kdf::{self, KdfParams},
    key_wrap,
    recovery,
    session::SessionRegistry,
    types::{SessionInfo, StatusReport, VaultState},
};

/// Idle time before the vault locks itself.
pub const AUTO_LOCK_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// How often the background task checks the auto-lock deadline.
const AUTO_LOCK_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Passphrase length policy, enforced on init and recovery.
pub const MIN_PASSPHRASE_LEN: usize = 12;
pub const MAX_PASSPHRASE_LEN: usize = 256;

/// Tunables for a [`Vault`] instance.
#[derive(Debug, Clone)]
pub struct VaultOptions {
    pub kdf: KdfParams,
    pub auto_lock_timeout: Duration,
}

impl Default for VaultOptions {
    fn default() -> Self {
        Self {
            kdf: KdfParams::default(),
            auto_lock_timeout: AUTO_LOCK_TIMEOUT,
        }
    }
}

/// Row from the `vault_config` table.
struct ConfigRow {
    kdf_salt: String,
    kdf_params: String,
    encrypted_master_key: String,
    created_at: String,
}

/// The vault lifecycle owner.
///
/// Generic over [`Cipher`] but defaults to [`XChaCha20Poly1305Cipher`].
/// Also owns the session token registry: tokens must die with the key,
/// and their presence suspends the auto-lock timer.
pub struct Vault<C: Cipher = XChaCha20Poly1305Cipher> {
    pool: SqlitePool,
    cipher: C,
    key: RwLock<Option<Zeroizing<[u8; 32]>>>,
    deadline: StdMutex<Option<Instant>>,
    sessions: SessionRegistry,
    options: VaultOptions,
}

impl Vault<XChaCha20Poly1305Cipher> {
    /// Create a vault with the default XChaCha20-Poly1305 cipher.
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_options(pool, XChaCha20Poly1305Cipher, VaultOptions::default())
    }
}

impl<C: Cipher> Vault<C> {
    /// Create a vault with a custom cipher.
    pub fn with_cipher(pool: SqlitePool, cipher: C) -> Self {
        Self::with_options(pool, cipher, VaultOptions::default())
    }

    /// Create a vault with explicit options (KDF cost, auto-lock timeout).
    pub fn with_options(pool: SqlitePool, cipher: C, options: VaultOptions) -> Self {
        Self {
            pool,
            cipher,
            key: RwLock::new(None),
            deadline: StdMutex::new(None),
            sessions: SessionRegistry::new(),
            options,
        }
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub(crate) fn cipher(&self) -> &C {
        &self.cipher
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Current lifecycle state.
    pub async fn state(&self) -> Result<VaultState, VaultError> {
        if self.load_config().await?.is_none() {
            return Ok(VaultState::Uninitialized);
        }
        if self.key.read().await.is_some() {
            Ok(VaultState::Unlocked)
        } else {
            Ok(VaultState::Locked)
        }
    }

    /// Whether the master key is currently in memory.
    pub async fn is_unlocked(&self) -> bool {
        self.key.read().await.is_some()
    }

    /// Initialize the vault with a passphrase.
    ///
    /// Generates a random master key, wraps it under the passphrase-derived
    /// KEK with a fresh salt, persists the configuration, and leaves the
    /// vault unlocked. Returns the one-time batch of recovery codes —
    /// plaintext is shown here and never again.
    pub async fn initialize(&self, passphrase: &str) -> Result<Vec<String>, VaultError> {
        check_passphrase(passphrase)?;

        if self.load_config().await?.is_some() {
            return Err(VaultError::AlreadyInitialized);
        }

        let mut master_key = Zeroizing::new([0u8; 32]);
        rand::RngCore::fill_bytes(&mut rand::rng(), master_key.as_mut());

        let salt_b64 = kdf::generate_salt();
        let salt = kdf::decode_salt(&salt_b64)?;
        let kek = kdf::derive_key(passphrase.as_bytes(), &salt, &self.options.kdf)?;
        let wrapped = key_wrap::wrap_master_key(&self.cipher, &kek, &master_key)?;
        let params_json = serde_json::to_string(&self.options.kdf)?;

        let inserted = sqlx::query(
            "INSERT INTO vault_config (id, kdf_salt, kdf_params, encrypted_master_key)
             VALUES (1, ?, ?, ?)",
        )
        .bind(&salt_b64)
        .bind(&params_json)
        .bind(&wrapped)
        .execute(&self.pool)
        .await;

        if let Err(e) = inserted {
            if is_unique_violation(&e) {
                return Err(VaultError::AlreadyInitialized);
            }
            return Err(e.into());
        }

        let codes = self.issue_recovery_codes().await?;

        *self.key.write().await = Some(master_key);
        self.touch();

        #[cfg(feature = "tracing")]
        tracing::info!("vault initialized");

        Ok(codes)
    }

    /// Unlock the vault with a passphrase.
    ///
    /// The passphrase check is the authenticated unwrap of the master key:
    /// a wrong passphrase fails the AEAD tag verification, with no separate
    /// comparison to leak timing through. Failure leaves state untouched.
    pub async fn unlock(&self, passphrase: &str) -> Result<(), VaultError> {
        let config = self
            .load_config()
            .await?
            .ok_or(VaultError::Uninitialized)?;

        let salt = kdf::decode_salt(&config.kdf_salt)?;
        let params: KdfParams = serde_json::from_str(&config.kdf_params)?;
        let kek = kdf::derive_key(passphrase.as_bytes(), &salt, &params)?;

        let master_key =
            key_wrap::unwrap_master_key(&self.cipher, &kek, &config.encrypted_master_key)
                .map_err(|_| VaultError::InvalidPassphrase)?;

        *self.key.write().await = Some(master_key);
        self.touch();

        #[cfg(feature = "tracing")]
        tracing::info!("vault unlocked");

        Ok(())
    }

    /// Lock the vault: zero the master key, destroy all session tokens.
    /// Idempotent from any state.
    pub async fn lock(&self) {
        *self.key.write().await = None;
        self.sessions.clear();
        self.clear_deadline();

        #[cfg(feature = "tracing")]
        tracing::info!("vault locked");
    }

    /// Vault status for the dashboard.
    pub async fn status(&self) -> Result<StatusReport, VaultError> {
        let timeout_ms = self.options.auto_lock_timeout.as_millis() as u64;

        let Some(config) = self.load_config().await? else {
            return Ok(StatusReport {
                state: VaultState::Uninitialized,
                secret_count: None,
                created_at: None,
                has_recovery_codes: false,
                auto_lock_in_ms: None,
                auto_lock_timeout_ms: timeout_ms,
                auto_lock_disabled: false,
                active_session_count: 0,
            });
        };

        let unlocked = self.is_unlocked().await;
        let sessions = self.sessions.count();

        let (unused_codes,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM vault_recovery WHERE used = 0")
                .fetch_one(&self.pool)
                .await?;

        let secret_count = if unlocked {
            let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM secrets")
                .fetch_one(&self.pool)
                .await?;
            Some(count)
        } else {
            None
        };

        let auto_lock_disabled = unlocked && sessions > 0;
        let auto_lock_in_ms = if unlocked && sessions == 0 {
            self.deadline_remaining().map(|d| d.as_millis() as u64)
        } else {
            None
        };

        Ok(StatusReport {
            state: if unlocked {
                VaultState::Unlocked
            } else {
                VaultState::Locked
            },
            secret_count,
            created_at: Some(config.created_at),
            has_recovery_codes: unused_codes > 0,
            auto_lock_in_ms,
            auto_lock_timeout_ms: timeout_ms,
            auto_lock_disabled,
            active_session_count: sessions,
        })
    }

    // ── Recovery ─────────────────────────────────────────────────────────────

    /// Issue a fresh batch of recovery codes, invalidating every unused one
    /// from earlier batches. Requires the vault to be unlocked.
    pub async fn generate_recovery_codes(&self) -> Result<Vec<String>, VaultError> {
        if !self.is_unlocked().await {
            return Err(VaultError::Locked);
        }

        sqlx::query("DELETE FROM vault_recovery WHERE used = 0")
            .execute(&self.pool)
            .await?;
        let codes = self.issue_recovery_codes().await?;

        #[cfg(feature = "tracing")]
        tracing::info!("recovery codes regenerated");

        Ok(codes)
    }

    /// Break-glass reset: consume a recovery code and rebuild the vault
    /// around a brand-new master key and passphrase.
    ///
    /// Every stored secret, tag, and grant is deleted — their ciphertexts
    /// are unrecoverable without the lost passphrase — so the call refuses
    /// to run unless `confirm_data_loss` is literally `true`. Unknown and
    /// already-used codes fail identically. Returns the replacement batch
    /// of recovery codes and leaves the vault unlocked.
    pub async fn recover(
        &self,
        code: &str,
        new_passphrase: &str,
        confirm_data_loss: bool,
    ) -> Result<Vec<String>, VaultError> {
        if !confirm_data_loss {
            return Err(VaultError::ConfirmationRequired);
        }
        check_passphrase(new_passphrase)?;

        let hash = recovery::hash_code(code);
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM vault_recovery WHERE code_hash = ? AND used = 0")
                .bind(&hash)
                .fetch_optional(&self.pool)
                .await?;
        let code_id = row.ok_or(VaultError::InvalidRecoveryCode)?.0;

        // Single-use flip: the guarded UPDATE makes a concurrent double
        // spend of the same code impossible.
        let marked = sqlx::query(
            "UPDATE vault_recovery SET used = 1, used_at = datetime('now')
             WHERE id = ? AND used = 0",
        )
        .bind(code_id)
        .execute(&self.pool)
        .await?;
        if marked.rows_affected() == 0 {
            return Err(VaultError::InvalidRecoveryCode);
        }

        // Hold the write half of the key slot across the reset so no
        // reader can decrypt against a half-replaced vault.
        let mut slot = self.key.write().await;

        for statement in [
            "DELETE FROM secret_tags",
            "DELETE FROM secret_grants",
            "DELETE FROM secrets",
            "DELETE FROM vault_config",
            "DELETE FROM vault_recovery WHERE used = 0",
        ] {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        let mut master_key = Zeroizing::new([0u8; 32]);
        rand::RngCore::fill_bytes(&mut rand::rng(), master_key.as_mut());

        let salt_b64 = kdf::generate_salt();
        let salt = kdf::decode_salt(&salt_b64)?;
        let kek = kdf::derive_key(new_passphrase.as_bytes(), &salt, &self.options.kdf)?;
        let wrapped = key_wrap::wrap_master_key(&self.cipher, &kek, &master_key)?;
        let params_json = serde_json::to_string(&self.options.kdf)?;

        sqlx::query(
            "INSERT INTO vault_config (id, kdf_salt, kdf_params, encrypted_master_key)
             VALUES (1, ?, ?, ?)",
        )
        .bind(&salt_b64)
        .bind(&params_json)
        .bind(&wrapped)
        .execute(&self.pool)
        .await?;

        let codes = self.issue_recovery_codes().await?;

        *slot = Some(master_key);
        drop(slot);

        // Tokens minted against the old vault don't outlive it.
        self.sessions.clear();
        self.touch();

        #[cfg(feature = "tracing")]
        tracing::warn!("vault reset via recovery code; all stored secrets deleted");

        Ok(codes)
    }

    async fn issue_recovery_codes(&self) -> Result<Vec<String>, VaultError> {
        let codes = recovery::generate_batch();
        for code in &codes {
            sqlx::query("INSERT INTO vault_recovery (code_hash) VALUES (?)")
                .bind(recovery::hash_code(code))
                .execute(&self.pool)
                .await?;
        }
        Ok(codes)
    }

    // ── Master key access ────────────────────────────────────────────────────

    /// Borrow the master key for the duration of one operation.
    ///
    /// The returned guard pins the vault unlocked: `lock()` blocks until it
    /// drops. Also refreshes the auto-lock deadline.
    pub(crate) async fn unlocked_key(
        &self,
    ) -> Result<RwLockMappedReadGuard<'_, [u8; 32]>, VaultError> {
        let guard = self.key.read().await;
        match RwLockReadGuard::try_map(guard, |slot| slot.as_ref().map(|k| &**k)) {
            Ok(key) => {
                self.touch();
                Ok(key)
            },
            Err(_) => Err(VaultError::Locked),
        }
    }

    // ── Auto-lock ────────────────────────────────────────────────────────────

    /// Push the auto-lock deadline back to now + timeout.
    pub(crate) fn touch(&self) {
        let mut deadline = self
            .deadline
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *deadline = Some(Instant::now() + self.options.auto_lock_timeout);
    }

    fn clear_deadline(&self) {
        let mut deadline = self
            .deadline
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *deadline = None;
    }

    fn deadline_remaining(&self) -> Option<Duration> {
        let deadline = self
            .deadline
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    fn deadline_passed(&self) -> bool {
        let deadline = self
            .deadline
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        matches!(*deadline, Some(d) if Instant::now() >= d)
    }

    /// Lock the vault if the idle deadline has passed and no session token
    /// suspends the timer. Returns whether a lock happened.
    pub async fn lock_if_idle(&self) -> bool {
        if self.sessions.count() > 0 || !self.deadline_passed() {
            return false;
        }

        let mut slot = self.key.write().await;
        // Re-check under the write lock; an unlock or a fresh session may
        // have raced in.
        if slot.is_none() || self.sessions.count() > 0 || !self.deadline_passed() {
            return false;
        }

        *slot = None;
        drop(slot);
        self.clear_deadline();

        #[cfg(feature = "tracing")]
        tracing::info!("vault auto-locked after inactivity");

        true
    }

    /// Spawn the background auto-lock task. The task runs until aborted;
    /// it is the only path that locks the vault without an explicit caller
    /// request, and it goes through the same key-slot write lock.
    pub fn spawn_auto_lock(self: &Arc<Self>) -> tokio::task::JoinHandle<()>
    where
        C: 'static,
    {
        let vault = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(AUTO_LOCK_POLL_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                vault.lock_if_idle().await;
            }
        })
    }

    // ── Session tokens ───────────────────────────────────────────────────────

    /// Mint a session token for an automated caller. Requires the vault to
    /// be unlocked; while the token lives, auto-lock is suspended.
    pub async fn create_session(&self, name: Option<String>) -> Result<String, VaultError> {
        if !self.is_unlocked().await {
            return Err(VaultError::Locked);
        }
        let token = self.sessions.generate(name)?;

        #[cfg(feature = "tracing")]
        tracing::info!(count = self.sessions.count(), "session token issued");

        Ok(token)
    }

    /// O(1) validity check; alters nothing.
    pub fn validate_session(&self, token: &str) -> bool {
        self.sessions.validate(token)
    }

    /// Revoke one token. Returns whether it existed.
    pub fn revoke_session(&self, token: &str) -> bool {
        self.sessions.revoke(token)
    }

    /// Live sessions — names and creation times only.
    pub fn list_sessions(&self) -> Vec<SessionInfo> {
        self.sessions.list()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.count()
    }

    // ── Persistence ──────────────────────────────────────────────────────────

    async fn load_config(&self) -> Result<Option<ConfigRow>, VaultError> {
        let row: Option<(String, String, String, String)> = sqlx::query_as(
            "SELECT kdf_salt, kdf_params, encrypted_master_key, created_at
             FROM vault_config WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(
            |(kdf_salt, kdf_params, encrypted_master_key, created_at)| ConfigRow {
                kdf_salt,
                kdf_params,
                encrypted_master_key,
                created_at,
            },
        ))
    }
}

fn check_passphrase(passphrase: &str) -> Result<(), VaultError> {
    let len = passphrase.chars().count();
    if !(MIN_PASSPHRASE_LEN..=MAX_PASSPHRASE_LEN).contains(&len) {
        return Err(VaultError::WeakPassphrase);
    }
    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::schema};

    async fn test_vault() -> Vault<XChaCha20Poly1305Cipher> {
        test_vault_with_timeout(Duration::from_secs(1800)).await
    }

    async fn test_vault_with_timeout(timeout: Duration) -> Vault<XChaCha20Poly1305Cipher> {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        schema::init_schema(&pool).await.unwrap();
        Vault::with_options(pool, XChaCha20Poly1305Cipher, VaultOptions {
            kdf: KdfParams::insecure_fast(),
            auto_lock_timeout: timeout,
        })
    }

    #[tokio::test]
    async fn starts_uninitialized() {
        let vault = test_vault().await;
        assert_eq!(vault.state().await.unwrap(), VaultState::Uninitialized);
        assert!(matches!(
            vault.unlock("whatever-passphrase").await,
            Err(VaultError::Uninitialized)
        ));
    }

    #[tokio::test]
    async fn initialize_unlocks_and_returns_codes() {
        let vault = test_vault().await;
        let codes = vault.initialize("correct-horse-battery").await.unwrap();
        assert_eq!(codes.len(), recovery::BATCH_SIZE);
        assert_eq!(vault.state().await.unwrap(), VaultState::Unlocked);
    }

    #[tokio::test]
    async fn double_initialize_fails() {
        let vault = test_vault().await;
        vault.initialize("correct-horse-battery").await.unwrap();
        assert!(matches!(
            vault.initialize("another-passphrase").await,
            Err(VaultError::AlreadyInitialized)
        ));
    }

    #[tokio::test]
    async fn short_passphrase_rejected() {
        let vault = test_vault().await;
        assert!(matches!(
            vault.initialize("tooshort").await,
            Err(VaultError::WeakPassphrase)
        ));
        assert_eq!(vault.state().await.unwrap(), VaultState::Uninitialized);
    }

    #[tokio::test]
    async fn lock_then_unlock() {
        let vault = test_vault().await;
        vault.initialize("correct-horse-battery").await.unwrap();

        vault.lock().await;
        assert_eq!(vault.state().await.unwrap(), VaultState::Locked);

        vault.unlock("correct-horse-battery").await.unwrap();
        assert_eq!(vault.state().await.unwrap(), VaultState::Unlocked);
    }

    #[tokio::test]
    async fn wrong_passphrase_leaves_vault_locked() {
        let vault = test_vault().await;
        vault.initialize("correct-horse-battery").await.unwrap();
        vault.lock().await;

        assert!(matches!(
            vault.unlock("wrong-passphrase-here").await,
            Err(VaultError::InvalidPassphrase)
        ));
        assert_eq!(vault.state().await.unwrap(), VaultState::Locked);
    }

    #[tokio::test]
    async fn lock_is_idempotent() {
        let vault = test_vault().await;
        vault.lock().await;
        vault.lock().await;
        assert_eq!(vault.state().await.unwrap(), VaultState::Uninitialized);
    }

    #[tokio::test]
    async fn regenerate_requires_unlocked() {
        let vault = test_vault().await;
        vault.initialize("correct-horse-battery").await.unwrap();
        vault.lock().await;
        assert!(matches!(
            vault.generate_recovery_codes().await,
            Err(VaultError::Locked)
        ));
    }

    #[tokio::test]
    async fn regenerate_invalidates_previous_batch() {
        let vault = test_vault().await;
        let old_codes = vault.initialize("correct-horse-battery").await.unwrap();
        let new_codes = vault.generate_recovery_codes().await.unwrap();
        assert_eq!(new_codes.len(), recovery::BATCH_SIZE);

        let result = vault
            .recover(&old_codes[0], "brand-new-passphrase", true)
            .await;
        assert!(matches!(result, Err(VaultError::InvalidRecoveryCode)));

        vault
            .recover(&new_codes[0], "brand-new-passphrase", true)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn recovery_requires_confirmation() {
        let vault = test_vault().await;
        let codes = vault.initialize("correct-horse-battery").await.unwrap();

        assert!(matches!(
            vault.recover(&codes[0], "brand-new-passphrase", false).await,
            Err(VaultError::ConfirmationRequired)
        ));
        // The code survives an unconfirmed attempt.
        vault
            .recover(&codes[0], "brand-new-passphrase", true)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn recovery_code_is_single_use() {
        let vault = test_vault().await;
        let codes = vault.initialize("correct-horse-battery").await.unwrap();

        vault
            .recover(&codes[0], "brand-new-passphrase", true)
            .await
            .unwrap();
        assert!(matches!(
            vault.recover(&codes[0], "yet-another-passphrase", true).await,
            Err(VaultError::InvalidRecoveryCode)
        ));
    }

    #[tokio::test]
    async fn recovery_invalidates_rest_of_batch() {
        let vault = test_vault().await;
        let codes = vault.initialize("correct-horse-battery").await.unwrap();

        vault
            .recover(&codes[0], "brand-new-passphrase", true)
            .await
            .unwrap();
        assert!(matches!(
            vault.recover(&codes[1], "yet-another-passphrase", true).await,
            Err(VaultError::InvalidRecoveryCode)
        ));
    }

    #[tokio::test]
    async fn recovery_replaces_passphrase() {
        let vault = test_vault().await;
        let codes = vault.initialize("correct-horse-battery").await.unwrap();

        vault
            .recover(&codes[0], "brand-new-passphrase", true)
            .await
            .unwrap();
        assert_eq!(vault.state().await.unwrap(), VaultState::Unlocked);

        vault.lock().await;
        assert!(matches!(
            vault.unlock("correct-horse-battery").await,
            Err(VaultError::InvalidPassphrase)
        ));
        vault.unlock("brand-new-passphrase").await.unwrap();
    }

    #[tokio::test]
    async fn unknown_recovery_code_fails() {
        let vault = test_vault().await;
        vault.initialize("correct-horse-battery").await.unwrap();
        assert!(matches!(
            vault
                .recover("AAAA-BBBB-CCCC-DDDD-EEEE-FFFF-0000-1111", "brand-new-passphrase", true)
                .await,
            Err(VaultError::InvalidRecoveryCode)
        ));
    }

    #[tokio::test]
    async fn auto_lock_fires_after_deadline() {
        let vault = test_vault_with_timeout(Duration::ZERO).await;
        vault.initialize("correct-horse-battery").await.unwrap();

        assert!(vault.lock_if_idle().await);
        assert_eq!(vault.state().await.unwrap(), VaultState::Locked);
    }

    #[tokio::test]
    async fn auto_lock_suspended_by_session_token() {
        let vault = test_vault_with_timeout(Duration::ZERO).await;
        vault.initialize("correct-horse-battery").await.unwrap();

        let token = vault.create_session(Some("ci".into())).await.unwrap();
        assert!(!vault.lock_if_idle().await);
        assert_eq!(vault.state().await.unwrap(), VaultState::Unlocked);

        vault.revoke_session(&token);
        assert!(vault.lock_if_idle().await);
    }

    #[tokio::test]
    async fn auto_lock_not_before_deadline() {
        let vault = test_vault().await;
        vault.initialize("correct-horse-battery").await.unwrap();
        assert!(!vault.lock_if_idle().await);
    }

    #[tokio::test]
    async fn sessions_die_with_lock() {
        let vault = test_vault().await;
        vault.initialize("correct-horse-battery").await.unwrap();

        let token = vault.create_session(None).await.unwrap();
        assert!(vault.validate_session(&token));

        vault.lock().await;
        assert!(!vault.validate_session(&token));
        assert_eq!(vault.session_count(), 0);
    }

    #[tokio::test]
    async fn session_requires_unlocked() {
        let vault = test_vault().await;
        vault.initialize("correct-horse-battery").await.unwrap();
        vault.lock().await;
        assert!(matches!(
            vault.create_session(None).await,
            Err(VaultError::Locked)
        ));
    }

    #[tokio::test]
    async fn status_reports_lifecycle() {
        let vault = test_vault().await;

        let report = vault.status().await.unwrap();
        assert_eq!(report.state, VaultState::Uninitialized);
        assert!(!report.has_recovery_codes);

        vault.initialize("correct-horse-battery").await.unwrap();
        let report = vault.status().await.unwrap();
        assert_eq!(report.state, VaultState::Unlocked);
        assert_eq!(report.secret_count, Some(0));
        assert!(report.has_recovery_codes);
        assert!(report.auto_lock_in_ms.is_some());
        assert!(!report.auto_lock_disabled);

        vault.create_session(None).await.unwrap();
        let report = vault.status().await.unwrap();
        assert!(report.auto_lock_disabled);
        assert_eq!(report.active_session_count, 1);
        assert!(report.auto_lock_in_ms.is_none());

        vault.lock().await;
        let report = vault.status().await.unwrap();
        assert_eq!(report.state, VaultState::Locked);
        assert_eq!(report.secret_count, None);
        assert_eq!(report.active_session_count, 0);
    }
}
