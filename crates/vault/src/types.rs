//! Domain types shared across the vault: accessors, secrets, tags, grants,
//! audit entries, and the request/response shapes of the public operations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::VaultError;

// ── Enums ────────────────────────────────────────────────────────────────────

/// Kind of secret being stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SecretType {
    ApiKey,
    Token,
    Password,
    Certificate,
    SshKey,
    EnvVar,
    #[default]
    Generic,
}

impl SecretType {
    pub const ALL: [Self; 7] = [
        Self::ApiKey,
        Self::Token,
        Self::Password,
        Self::Certificate,
        Self::SshKey,
        Self::EnvVar,
        Self::Generic,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ApiKey => "api_key",
            Self::Token => "token",
            Self::Password => "password",
            Self::Certificate => "certificate",
            Self::SshKey => "ssh_key",
            Self::EnvVar => "env_var",
            Self::Generic => "generic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

/// Classification axis for tags attached to a secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TagType {
    Tool,
    LocalTool,
    Env,
    Service,
}

impl TagType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tool => "tool",
            Self::LocalTool => "local-tool",
            Self::Env => "env",
            Self::Service => "service",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tool" => Some(Self::Tool),
            "local-tool" => Some(Self::LocalTool),
            "env" => Some(Self::Env),
            "service" => Some(Self::Service),
            _ => None,
        }
    }
}

/// Permission level on a secret. `Ord` follows the escalation order, so
/// "at least write" is `perm >= Permission::Write`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    #[default]
    Read,
    Write,
    Admin,
}

impl Permission {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "read" => Some(Self::Read),
            "write" => Some(Self::Write),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// Action recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Create,
    Read,
    Update,
    Delete,
    Rotate,
    Grant,
    Revoke,
    Fetch,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Rotate => "rotate",
            Self::Grant => "grant",
            Self::Revoke => "revoke",
            Self::Fetch => "fetch",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(Self::Create),
            "read" => Some(Self::Read),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            "rotate" => Some(Self::Rotate),
            "grant" => Some(Self::Grant),
            "revoke" => Some(Self::Revoke),
            "fetch" => Some(Self::Fetch),
            _ => None,
        }
    }
}

/// Kind of identity performing an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessorKind {
    Principal,
    Agent,
    System,
}

impl AccessorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Principal => "principal",
            Self::Agent => "agent",
            Self::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "principal" => Some(Self::Principal),
            "agent" => Some(Self::Agent),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

/// Vault lifecycle state exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VaultState {
    /// No configuration exists — the vault has never been set up.
    Uninitialized,
    /// Configuration exists but the master key is not in memory.
    Locked,
    /// Master key is held in memory.
    Unlocked,
}

// ── Identity ─────────────────────────────────────────────────────────────────

/// The `(kind, name)` identity performing an operation, resolved by the
/// external routing layer before any vault call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accessor {
    pub kind: AccessorKind,
    pub name: String,
}

impl Accessor {
    pub fn new(kind: AccessorKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    pub fn principal(name: impl Into<String>) -> Self {
        Self::new(AccessorKind::Principal, name)
    }

    pub fn agent(name: impl Into<String>) -> Self {
        Self::new(AccessorKind::Agent, name)
    }

    pub fn system(name: impl Into<String>) -> Self {
        Self::new(AccessorKind::System, name)
    }
}

impl std::fmt::Display for Accessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.name)
    }
}

// ── Records ──────────────────────────────────────────────────────────────────

/// Secret metadata. The encrypted value and its nonce never leave the store
/// through this type; only [`RevealedSecret`] carries a plaintext value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Secret {
    pub id: String,
    pub name: String,
    pub secret_type: SecretType,
    pub owner_type: AccessorKind,
    pub owner_name: String,
    pub service_name: Option<String>,
    pub description: Option<String>,
    pub expires_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Secret {
    /// The owner as an [`Accessor`], for permission checks.
    pub fn owner(&self) -> Accessor {
        Accessor::new(self.owner_type, self.owner_name.clone())
    }
}

/// A secret together with its tags and grants.
#[derive(Debug, Clone, Serialize)]
pub struct SecretDetails {
    #[serde(flatten)]
    pub secret: Secret,
    pub tags: Vec<SecretTag>,
    pub grants: Vec<SecretGrant>,
}

/// A secret with its decrypted value, returned only by the fetch operation.
#[derive(Debug, Serialize)]
pub struct RevealedSecret {
    #[serde(flatten)]
    pub secret: Secret,
    pub value: String,
}

/// Tag attached to a secret. Grants the given permission to any accessor
/// whose request carries a matching claim (e.g. a tool context).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretTag {
    pub id: i64,
    pub secret_id: String,
    pub tag_type: TagType,
    pub tag_value: String,
    pub permission: Permission,
    pub created_at: String,
}

/// Explicit, individually named access grant on a secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretGrant {
    pub id: i64,
    pub secret_id: String,
    pub grantee_type: AccessorKind,
    pub grantee_name: String,
    pub permission: Permission,
    pub granted_by: String,
    pub granted_at: String,
    pub expires_at: Option<String>,
}

/// One immutable audit log entry. `secret_name` is denormalized at write
/// time so history survives secret deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub secret_id: String,
    pub secret_name: String,
    pub accessor_type: AccessorKind,
    pub accessor_name: String,
    pub action: AuditAction,
    pub tool_context: Option<String>,
    pub ip_address: Option<String>,
    pub timestamp: String,
}

/// A live session token, as listed to callers: the raw token is never
/// included.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub name: Option<String>,
    pub created_at: String,
}

// ── Requests ─────────────────────────────────────────────────────────────────

/// Input for creating a secret.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewSecret {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub secret_type: SecretType,
    pub service_name: Option<String>,
    pub description: Option<String>,
    pub expires_at: Option<String>,
    /// Defaults to the calling accessor when absent.
    pub owner: Option<Accessor>,
}

/// Metadata-only patch. The value itself changes exclusively through
/// rotation. `expires_at` distinguishes "leave alone" (`None`) from
/// "clear" (`Some(None)`).
#[derive(Debug, Clone, Default)]
pub struct SecretPatch {
    pub service_name: Option<String>,
    pub description: Option<String>,
    pub expires_at: Option<Option<String>>,
}

impl SecretPatch {
    pub fn is_empty(&self) -> bool {
        self.service_name.is_none() && self.description.is_none() && self.expires_at.is_none()
    }
}

/// Tag to attach to a secret.
#[derive(Debug, Clone, Deserialize)]
pub struct TagSpec {
    pub tag_type: TagType,
    pub tag_value: String,
    #[serde(default)]
    pub permission: Permission,
}

/// Grant to attach to a secret.
#[derive(Debug, Clone, Deserialize)]
pub struct GrantSpec {
    pub grantee_type: AccessorKind,
    pub grantee_name: String,
    #[serde(default)]
    pub permission: Permission,
    pub expires_at: Option<String>,
}

/// Filters for listing secrets.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListFilter {
    pub secret_type: Option<SecretType>,
    pub service_name: Option<String>,
    pub owner: Option<String>,
    /// Only secrets carrying a `tool` tag with this value.
    pub tool: Option<String>,
    /// Only secrets carrying an `env` tag with this value.
    pub env: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Filters for the global audit query.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditQuery {
    pub secret_id: Option<String>,
    pub accessor_name: Option<String>,
    pub action: Option<AuditAction>,
    /// Inclusive lower bound, RFC 3339 / SQLite datetime text.
    pub since: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

// ── Reports ──────────────────────────────────────────────────────────────────

/// Vault status surfaced to the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub state: VaultState,
    pub secret_count: Option<i64>,
    pub created_at: Option<String>,
    pub has_recovery_codes: bool,
    /// Milliseconds until auto-lock; absent while locked or suspended.
    pub auto_lock_in_ms: Option<u64>,
    pub auto_lock_timeout_ms: u64,
    /// True while live session tokens suspend the auto-lock timer.
    pub auto_lock_disabled: bool,
    pub active_session_count: usize,
}

/// Aggregate reporting view over stored secrets.
#[derive(Debug, Clone, Serialize)]
pub struct SecretStats {
    pub total: i64,
    pub by_type: BTreeMap<String, i64>,
    /// Expiring within the next 30 days (but not yet expired).
    pub expiring_soon: i64,
    pub expired: i64,
}

// ── Parsing helpers ──────────────────────────────────────────────────────────

pub(crate) fn parse_or_corrupt<T>(
    parsed: Option<T>,
    what: &str,
    raw: &str,
) -> Result<T, VaultError> {
    parsed.ok_or_else(|| VaultError::Corrupt(format!("unknown {what}: {raw}")))
}
