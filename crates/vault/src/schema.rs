//! SQLite schema for the vault.
//!
//! Two logical tables of record (secret metadata+ciphertext, audit log),
//! the single-row vault configuration, recovery-code hashes, and the
//! tag/grant access-control tables. Session tokens and the auto-lock
//! deadline deliberately have no table: they are process-memory state.

use sqlx::SqlitePool;

use crate::error::VaultError;

/// Create all vault tables and indexes. Idempotent; call at startup.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), VaultError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS vault_config (
            id                   INTEGER PRIMARY KEY CHECK (id = 1),
            version              INTEGER NOT NULL DEFAULT 1,
            kdf_salt             TEXT NOT NULL,
            kdf_params           TEXT NOT NULL,
            encrypted_master_key TEXT NOT NULL,
            created_at           TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS secrets (
            id              TEXT PRIMARY KEY,
            name            TEXT NOT NULL UNIQUE,
            secret_type     TEXT NOT NULL DEFAULT 'generic',
            encrypted_value BLOB NOT NULL,
            iv              BLOB NOT NULL,
            owner_type      TEXT NOT NULL,
            owner_name      TEXT NOT NULL,
            service_name    TEXT,
            description     TEXT,
            expires_at      TEXT,
            created_at      TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at      TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS secret_tags (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            secret_id  TEXT NOT NULL REFERENCES secrets(id) ON DELETE CASCADE,
            tag_type   TEXT NOT NULL,
            tag_value  TEXT NOT NULL,
            permission TEXT NOT NULL DEFAULT 'read',
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(secret_id, tag_type, tag_value)
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS secret_grants (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            secret_id    TEXT NOT NULL REFERENCES secrets(id) ON DELETE CASCADE,
            grantee_type TEXT NOT NULL,
            grantee_name TEXT NOT NULL,
            permission   TEXT NOT NULL DEFAULT 'read',
            granted_by   TEXT NOT NULL,
            granted_at   TEXT NOT NULL DEFAULT (datetime('now')),
            expires_at   TEXT,
            UNIQUE(secret_id, grantee_type, grantee_name)
        )",
    )
    .execute(pool)
    .await?;

    // secret_name is denormalized on purpose: audit history must survive
    // deletion of the secret it describes.
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS secret_audit_log (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            secret_id     TEXT NOT NULL,
            secret_name   TEXT NOT NULL,
            accessor_type TEXT NOT NULL,
            accessor_name TEXT NOT NULL,
            action        TEXT NOT NULL,
            tool_context  TEXT,
            ip_address    TEXT,
            timestamp     TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS vault_recovery (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            code_hash  TEXT NOT NULL,
            used       INTEGER NOT NULL DEFAULT 0,
            used_at    TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .execute(pool)
    .await?;

    for statement in [
        "CREATE INDEX IF NOT EXISTS idx_secrets_owner ON secrets(owner_name)",
        "CREATE INDEX IF NOT EXISTS idx_secrets_service ON secrets(service_name)",
        "CREATE INDEX IF NOT EXISTS idx_secrets_type ON secrets(secret_type)",
        "CREATE INDEX IF NOT EXISTS idx_tags_secret ON secret_tags(secret_id)",
        "CREATE INDEX IF NOT EXISTS idx_tags_value ON secret_tags(tag_type, tag_value)",
        "CREATE INDEX IF NOT EXISTS idx_grants_secret ON secret_grants(secret_id)",
        "CREATE INDEX IF NOT EXISTS idx_grants_grantee ON secret_grants(grantee_type, grantee_name)",
        "CREATE INDEX IF NOT EXISTS idx_audit_secret ON secret_audit_log(secret_id)",
        "CREATE INDEX IF NOT EXISTS idx_audit_accessor ON secret_audit_log(accessor_name)",
        "CREATE INDEX IF NOT EXISTS idx_audit_timestamp ON secret_audit_log(timestamp)",
        "CREATE INDEX IF NOT EXISTS idx_recovery_hash ON vault_recovery(code_hash)",
    ] {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}
