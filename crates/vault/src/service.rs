//! The secret vault facade.
//!
//! [`SecretVault`] is the typed surface the routing layer calls into. Every
//! operation runs the same gauntlet: vault state machine first (locked
//! vaults refuse key work), then access control for the accessor, then the
//! data operation, and finally the audit append — which completes before
//! the response is handed back.

use std::sync::Arc;

use {sqlx::SqlitePool, uuid::Uuid};

use crate::{
    access::AccessControl,
    audit::{AuditEvent, AuditLog},
    cipher::{Cipher, XChaCha20Poly1305Cipher},
    error::VaultError,
    schema,
    store::{NewSecretRow, SecretStore},
    types::{
        Accessor, AccessorKind, AuditAction, AuditEntry, AuditQuery, GrantSpec, ListFilter,
        NewSecret, Permission, RevealedSecret, Secret, SecretDetails, SecretGrant, SecretPatch,
        SecretStats, SecretTag, SessionInfo, StatusReport, TagSpec, TagType,
    },
    vault::{Vault, VaultOptions},
};

/// Secret name policy: 1–100 chars, alphanumeric plus dash/underscore.
const MAX_NAME_LEN: usize = 100;

/// Secret value policy: 1 byte – 64 KiB.
const MAX_VALUE_LEN: usize = 65536;

/// Encrypted-at-rest credential storage with access control and a full
/// audit trail.
pub struct SecretVault<C: Cipher = XChaCha20Poly1305Cipher> {
    vault: Arc<Vault<C>>,
    store: SecretStore,
    access: AccessControl,
    audit: AuditLog,
}

impl SecretVault<XChaCha20Poly1305Cipher> {
    /// Open a vault on the given pool with the default cipher, creating the
    /// schema if needed.
    pub async fn open(pool: SqlitePool) -> Result<Self, VaultError> {
        schema::init_schema(&pool).await?;
        Ok(Self::assemble(Arc::new(Vault::new(pool))))
    }
}

impl<C: Cipher> SecretVault<C> {
    /// Open a vault with an explicit cipher and options.
    pub async fn with_options(
        pool: SqlitePool,
        cipher: C,
        options: VaultOptions,
    ) -> Result<Self, VaultError> {
        schema::init_schema(&pool).await?;
        Ok(Self::assemble(Arc::new(Vault::with_options(
            pool, cipher, options,
        ))))
    }

    fn assemble(vault: Arc<Vault<C>>) -> Self {
        let pool = vault.pool().clone();
        Self {
            store: SecretStore::new(pool.clone()),
            access: AccessControl::new(pool.clone()),
            audit: AuditLog::new(pool),
            vault,
        }
    }

    /// The underlying state machine, for callers that need direct access
    /// (e.g. to share it with other subsystems).
    pub fn vault(&self) -> &Arc<Vault<C>> {
        &self.vault
    }

    // ── Vault lifecycle ──────────────────────────────────────────────────────

    pub async fn status(&self) -> Result<StatusReport, VaultError> {
        self.vault.status().await
    }

    /// Initialize the vault; returns the one-time recovery codes.
    pub async fn init(&self, passphrase: &str) -> Result<Vec<String>, VaultError> {
        self.vault.initialize(passphrase).await
    }

    pub async fn unlock(&self, passphrase: &str) -> Result<(), VaultError> {
        self.vault.unlock(passphrase).await
    }

    pub async fn lock(&self) {
        self.vault.lock().await;
    }

    pub async fn generate_recovery_codes(&self) -> Result<Vec<String>, VaultError> {
        self.vault.generate_recovery_codes().await
    }

    /// Break-glass reset. Destroys all stored secrets; see
    /// [`Vault::recover`].
    pub async fn recover(
        &self,
        code: &str,
        new_passphrase: &str,
        confirm_data_loss: bool,
    ) -> Result<Vec<String>, VaultError> {
        self.vault
            .recover(code, new_passphrase, confirm_data_loss)
            .await
    }

    /// Start the background auto-lock task.
    pub fn spawn_auto_lock(&self) -> tokio::task::JoinHandle<()>
    where
        C: 'static,
    {
        self.vault.spawn_auto_lock()
    }

    // ── Session tokens ───────────────────────────────────────────────────────

    pub async fn create_session(&self, name: Option<String>) -> Result<String, VaultError> {
        self.vault.create_session(name).await
    }

    pub fn validate_session(&self, token: &str) -> bool {
        self.vault.validate_session(token)
    }

    pub fn revoke_session(&self, token: &str) -> bool {
        self.vault.revoke_session(token)
    }

    pub fn list_sessions(&self) -> Vec<SessionInfo> {
        self.vault.list_sessions()
    }

    // ── Secrets ──────────────────────────────────────────────────────────────

    /// Create a secret. The value is encrypted under the master key before
    /// it touches the store; the response carries metadata only.
    pub async fn create_secret(
        &self,
        req: NewSecret,
        accessor: &Accessor,
    ) -> Result<Secret, VaultError> {
        check_name(&req.name)?;
        check_value(&req.value)?;

        let owner = req.owner.clone().unwrap_or_else(|| accessor.clone());
        let id = Uuid::new_v4().to_string();

        let sealed = {
            let key = self.vault.unlocked_key().await?;
            self.vault
                .cipher()
                .seal(&key, req.value.as_bytes(), value_aad(&id).as_bytes())?
        };

        let secret = self
            .store
            .insert(NewSecretRow {
                id: &id,
                name: &req.name,
                secret_type: req.secret_type,
                iv: &sealed.nonce,
                ciphertext: &sealed.ciphertext,
                owner_type: owner.kind,
                owner_name: &owner.name,
                service_name: req.service_name.as_deref(),
                description: req.description.as_deref(),
                expires_at: req.expires_at.as_deref(),
            })
            .await?;

        self.record(&secret, accessor, AuditAction::Create, None)
            .await?;

        #[cfg(feature = "tracing")]
        tracing::info!(name = %secret.name, owner = %owner, "secret created");

        Ok(secret)
    }

    /// Metadata, tags, and grants of one secret — never the value.
    pub async fn get_secret(
        &self,
        secret_ref: &str,
        accessor: &Accessor,
        tool_context: Option<&str>,
    ) -> Result<SecretDetails, VaultError> {
        let secret = self.store.get(secret_ref).await?;
        self.require(&secret, accessor, tool_context, Permission::Read)
            .await?;

        let tags = self.access.tags(&secret.id).await?;
        let grants = self.access.grants(&secret.id).await?;

        self.record(&secret, accessor, AuditAction::Read, tool_context)
            .await?;

        Ok(SecretDetails {
            secret,
            tags,
            grants,
        })
    }

    /// Decrypt and return a secret's value. Always audited, whatever the
    /// caller: revealing a value is never silent.
    pub async fn fetch_value(
        &self,
        secret_ref: &str,
        accessor: &Accessor,
        tool_context: Option<&str>,
    ) -> Result<RevealedSecret, VaultError> {
        let secret = self.store.get(secret_ref).await?;
        self.require(&secret, accessor, tool_context, Permission::Read)
            .await?;

        let value = {
            let key = self.vault.unlocked_key().await?;
            let parts = self.store.encrypted_parts(&secret.id).await?;
            let plaintext = self.vault.cipher().open(
                &key,
                &parts.iv,
                &parts.ciphertext,
                value_aad(&secret.id).as_bytes(),
            )?;
            String::from_utf8(plaintext).map_err(|e| VaultError::Cipher(e.to_string()))?
        };

        self.record(&secret, accessor, AuditAction::Fetch, tool_context)
            .await?;

        #[cfg(feature = "tracing")]
        tracing::info!(name = %secret.name, accessor = %accessor, tool = tool_context, "secret value fetched");

        Ok(RevealedSecret { secret, value })
    }

    /// Patch non-value metadata. Requires write permission.
    pub async fn update_secret(
        &self,
        secret_ref: &str,
        patch: &SecretPatch,
        accessor: &Accessor,
        tool_context: Option<&str>,
    ) -> Result<Secret, VaultError> {
        let secret = self.store.get(secret_ref).await?;
        self.require(&secret, accessor, tool_context, Permission::Write)
            .await?;

        self.store.update_metadata(&secret.id, patch).await?;
        let updated = self.store.get(&secret.id).await?;

        self.record(&updated, accessor, AuditAction::Update, tool_context)
            .await?;

        Ok(updated)
    }

    /// Re-encrypt a secret under a new value with a fresh nonce. The old
    /// ciphertext is discarded; no value history is kept.
    pub async fn rotate_secret(
        &self,
        secret_ref: &str,
        new_value: &str,
        accessor: &Accessor,
        tool_context: Option<&str>,
    ) -> Result<Secret, VaultError> {
        check_value(new_value)?;

        let secret = self.store.get(secret_ref).await?;
        self.require(&secret, accessor, tool_context, Permission::Write)
            .await?;

        {
            let key = self.vault.unlocked_key().await?;
            let sealed = self.vault.cipher().seal(
                &key,
                new_value.as_bytes(),
                value_aad(&secret.id).as_bytes(),
            )?;
            self.store
                .replace_value(&secret.id, &sealed.nonce, &sealed.ciphertext)
                .await?;
        }

        self.record(&secret, accessor, AuditAction::Rotate, tool_context)
            .await?;

        #[cfg(feature = "tracing")]
        tracing::info!(name = %secret.name, accessor = %accessor, "secret rotated");

        self.store.get(&secret.id).await
    }

    /// Delete a secret and its tags and grants. Requires admin (the owner
    /// always qualifies). The audit entry is written first so the deletion
    /// itself is on record.
    pub async fn delete_secret(
        &self,
        secret_ref: &str,
        accessor: &Accessor,
        tool_context: Option<&str>,
    ) -> Result<(), VaultError> {
        let secret = self.store.get(secret_ref).await?;
        self.require(&secret, accessor, tool_context, Permission::Admin)
            .await?;

        self.record(&secret, accessor, AuditAction::Delete, tool_context)
            .await?;
        self.store.delete(&secret.id).await?;

        #[cfg(feature = "tracing")]
        tracing::info!(name = %secret.name, accessor = %accessor, "secret deleted");

        Ok(())
    }

    /// List secrets matching the filter, restricted to what the accessor
    /// may read. Inaccessible secrets are omitted, not reported as denied.
    pub async fn list_secrets(
        &self,
        filter: &ListFilter,
        accessor: &Accessor,
        tool_context: Option<&str>,
    ) -> Result<Vec<Secret>, VaultError> {
        let candidates = self.store.list(filter).await?;
        self.visible_to(candidates, accessor, tool_context).await
    }

    /// Secrets carrying a given tag, restricted to what the accessor may
    /// read.
    pub async fn find_by_tag(
        &self,
        tag_type: TagType,
        tag_value: &str,
        accessor: &Accessor,
        tool_context: Option<&str>,
    ) -> Result<Vec<Secret>, VaultError> {
        let candidates = self.store.find_by_tag(tag_type.as_str(), tag_value).await?;
        self.visible_to(candidates, accessor, tool_context).await
    }

    /// Aggregate counts. A reporting view: no permission required and no
    /// secret contents involved.
    pub async fn stats(&self) -> Result<SecretStats, VaultError> {
        self.store.stats().await
    }

    // ── Tags ─────────────────────────────────────────────────────────────────

    pub async fn tags(
        &self,
        secret_ref: &str,
        accessor: &Accessor,
        tool_context: Option<&str>,
    ) -> Result<Vec<SecretTag>, VaultError> {
        let secret = self.store.get(secret_ref).await?;
        self.require(&secret, accessor, tool_context, Permission::Read)
            .await?;
        self.access.tags(&secret.id).await
    }

    /// Attach (or re-permission) a tag. Requires admin.
    pub async fn add_tag(
        &self,
        secret_ref: &str,
        spec: &TagSpec,
        accessor: &Accessor,
        tool_context: Option<&str>,
    ) -> Result<SecretTag, VaultError> {
        let secret = self.store.get(secret_ref).await?;
        self.require(&secret, accessor, tool_context, Permission::Admin)
            .await?;

        let tag = self.access.upsert_tag(&secret.id, spec).await?;
        self.record(&secret, accessor, AuditAction::Grant, tool_context)
            .await?;
        Ok(tag)
    }

    /// Detach a tag. Requires admin.
    pub async fn remove_tag(
        &self,
        secret_ref: &str,
        tag_type: TagType,
        tag_value: &str,
        accessor: &Accessor,
        tool_context: Option<&str>,
    ) -> Result<(), VaultError> {
        let secret = self.store.get(secret_ref).await?;
        self.require(&secret, accessor, tool_context, Permission::Admin)
            .await?;

        let removed = self
            .access
            .remove_tag(&secret.id, tag_type.as_str(), tag_value)
            .await?;
        if !removed {
            return Err(VaultError::NotFound(format!(
                "tag {}:{tag_value} on {}",
                tag_type.as_str(),
                secret.name
            )));
        }

        self.record(&secret, accessor, AuditAction::Revoke, tool_context)
            .await?;
        Ok(())
    }

    // ── Grants ───────────────────────────────────────────────────────────────

    pub async fn grants(
        &self,
        secret_ref: &str,
        accessor: &Accessor,
        tool_context: Option<&str>,
    ) -> Result<Vec<SecretGrant>, VaultError> {
        let secret = self.store.get(secret_ref).await?;
        self.require(&secret, accessor, tool_context, Permission::Read)
            .await?;
        self.access.grants(&secret.id).await
    }

    /// Grant access to a named accessor. Requires admin; re-granting an
    /// existing grantee replaces the grant.
    pub async fn grant_access(
        &self,
        secret_ref: &str,
        spec: &GrantSpec,
        accessor: &Accessor,
        tool_context: Option<&str>,
    ) -> Result<SecretGrant, VaultError> {
        let secret = self.store.get(secret_ref).await?;
        self.require(&secret, accessor, tool_context, Permission::Admin)
            .await?;

        let grant = self
            .access
            .upsert_grant(&secret.id, spec, &accessor.to_string())
            .await?;
        self.record(&secret, accessor, AuditAction::Grant, tool_context)
            .await?;

        #[cfg(feature = "tracing")]
        tracing::info!(
            name = %secret.name,
            grantee = %format!("{}:{}", spec.grantee_type.as_str(), spec.grantee_name),
            permission = spec.permission.as_str(),
            "access granted"
        );

        Ok(grant)
    }

    /// Revoke a grant. Requires admin.
    pub async fn revoke_access(
        &self,
        secret_ref: &str,
        grantee_type: AccessorKind,
        grantee_name: &str,
        accessor: &Accessor,
        tool_context: Option<&str>,
    ) -> Result<(), VaultError> {
        let secret = self.store.get(secret_ref).await?;
        self.require(&secret, accessor, tool_context, Permission::Admin)
            .await?;

        let removed = self
            .access
            .remove_grant(&secret.id, grantee_type, grantee_name)
            .await?;
        if !removed {
            return Err(VaultError::NotFound(format!(
                "grant for {}:{grantee_name} on {}",
                grantee_type.as_str(),
                secret.name
            )));
        }

        self.record(&secret, accessor, AuditAction::Revoke, tool_context)
            .await?;
        Ok(())
    }

    // ── Audit ────────────────────────────────────────────────────────────────

    /// Full audit history of one secret. Requires read on the secret.
    pub async fn secret_audit(
        &self,
        secret_ref: &str,
        accessor: &Accessor,
        tool_context: Option<&str>,
    ) -> Result<Vec<AuditEntry>, VaultError> {
        let secret = self.store.get(secret_ref).await?;
        self.require(&secret, accessor, tool_context, Permission::Read)
            .await?;
        self.audit.for_secret(&secret.id).await
    }

    /// Global audit query. When the filter names a secret that still
    /// exists, read permission on it is required; history of deleted
    /// secrets stays queryable.
    pub async fn audit_log(
        &self,
        query: &AuditQuery,
        accessor: &Accessor,
        tool_context: Option<&str>,
    ) -> Result<(Vec<AuditEntry>, i64), VaultError> {
        if let Some(secret_id) = &query.secret_id {
            if let Some(secret) = self.store.find(secret_id).await? {
                self.require(&secret, accessor, tool_context, Permission::Read)
                    .await?;
            }
        }
        self.audit.query(query).await
    }

    // ── Internals ────────────────────────────────────────────────────────────

    async fn require(
        &self,
        secret: &Secret,
        accessor: &Accessor,
        tool_context: Option<&str>,
        needed: Permission,
    ) -> Result<(), VaultError> {
        let held = self
            .access
            .effective_permission(secret, accessor, tool_context)
            .await?;
        match held {
            Some(permission) if permission >= needed => Ok(()),
            _ => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    name = %secret.name,
                    accessor = %accessor,
                    needed = needed.as_str(),
                    "access denied"
                );
                Err(VaultError::AccessDenied)
            },
        }
    }

    async fn visible_to(
        &self,
        candidates: Vec<Secret>,
        accessor: &Accessor,
        tool_context: Option<&str>,
    ) -> Result<Vec<Secret>, VaultError> {
        let mut visible = Vec::with_capacity(candidates.len());
        for secret in candidates {
            let held = self
                .access
                .effective_permission(&secret, accessor, tool_context)
                .await?;
            if held.is_some() {
                visible.push(secret);
            }
        }
        Ok(visible)
    }

    async fn record(
        &self,
        secret: &Secret,
        accessor: &Accessor,
        action: AuditAction,
        tool_context: Option<&str>,
    ) -> Result<(), VaultError> {
        self.audit
            .append(AuditEvent {
                secret_id: &secret.id,
                secret_name: &secret.name,
                accessor,
                action,
                tool_context,
                ip_address: None,
            })
            .await
    }
}

fn value_aad(secret_id: &str) -> String {
    format!("secret:{secret_id}")
}

fn check_name(name: &str) -> Result<(), VaultError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(VaultError::InvalidName(name.to_string()))
    }
}

fn check_value(value: &str) -> Result<(), VaultError> {
    if value.is_empty() || value.len() > MAX_VALUE_LEN {
        return Err(VaultError::InvalidValue);
    }
    Ok(())
}
