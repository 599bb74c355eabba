//! Access control: tags, grants, and effective-permission resolution.
//!
//! Resolution order for `(secret, accessor)`, first match wins:
//!
//! 1. the accessor owns the secret → admin;
//! 2. a non-expired grant names the accessor → the grant's permission;
//! 3. a `tool` / `local-tool` tag matches the request's tool context →
//!    the tag's permission (the strongest one, if several match);
//! 4. otherwise no access.
//!
//! `env` and `service` tags classify secrets for search; they carry no
//! identity claim a request could present, so they never grant access.

use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use crate::{
    error::VaultError,
    types::{
        Accessor, AccessorKind, GrantSpec, Permission, Secret, SecretGrant, SecretTag, TagSpec,
        TagType, parse_or_corrupt,
    },
};

/// Tag and grant store plus the permission resolver.
#[derive(Clone)]
pub(crate) struct AccessControl {
    pool: SqlitePool,
}

impl AccessControl {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ── Resolution ───────────────────────────────────────────────────────────

    /// The strongest permission the accessor holds on this secret, or
    /// `None` for no access at all.
    pub async fn effective_permission(
        &self,
        secret: &Secret,
        accessor: &Accessor,
        tool_context: Option<&str>,
    ) -> Result<Option<Permission>, VaultError> {
        // Owners hold implicit admin over their own secrets.
        if secret.owner() == *accessor {
            return Ok(Some(Permission::Admin));
        }

        let grant: Option<(String,)> = sqlx::query_as(
            "SELECT permission FROM secret_grants
             WHERE secret_id = ? AND grantee_type = ? AND grantee_name = ?
               AND (expires_at IS NULL OR datetime(expires_at) > datetime('now'))",
        )
        .bind(&secret.id)
        .bind(accessor.kind.as_str())
        .bind(&accessor.name)
        .fetch_optional(&self.pool)
        .await?;

        if let Some((permission,)) = grant {
            return Ok(Some(parse_or_corrupt(
                Permission::parse(&permission),
                "permission",
                &permission,
            )?));
        }

        if let Some(tool) = tool_context {
            let rows: Vec<(String,)> = sqlx::query_as(
                "SELECT permission FROM secret_tags
                 WHERE secret_id = ? AND tag_type IN ('tool', 'local-tool') AND tag_value = ?",
            )
            .bind(&secret.id)
            .bind(tool)
            .fetch_all(&self.pool)
            .await?;

            let mut strongest: Option<Permission> = None;
            for (permission,) in rows {
                let parsed =
                    parse_or_corrupt(Permission::parse(&permission), "permission", &permission)?;
                strongest = Some(strongest.map_or(parsed, |s| s.max(parsed)));
            }
            if strongest.is_some() {
                return Ok(strongest);
            }
        }

        Ok(None)
    }

    // ── Tags ─────────────────────────────────────────────────────────────────

    /// Attach a tag, replacing the permission if the pair already exists.
    pub async fn upsert_tag(
        &self,
        secret_id: &str,
        spec: &TagSpec,
    ) -> Result<SecretTag, VaultError> {
        sqlx::query(
            "INSERT INTO secret_tags (secret_id, tag_type, tag_value, permission)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(secret_id, tag_type, tag_value)
             DO UPDATE SET permission = excluded.permission",
        )
        .bind(secret_id)
        .bind(spec.tag_type.as_str())
        .bind(&spec.tag_value)
        .bind(spec.permission.as_str())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            "SELECT id, secret_id, tag_type, tag_value, permission, created_at
             FROM secret_tags WHERE secret_id = ? AND tag_type = ? AND tag_value = ?",
        )
        .bind(secret_id)
        .bind(spec.tag_type.as_str())
        .bind(&spec.tag_value)
        .fetch_one(&self.pool)
        .await?;

        tag_from_row(&row)
    }

    /// Detach a tag. Returns whether it existed.
    pub async fn remove_tag(
        &self,
        secret_id: &str,
        tag_type: &str,
        tag_value: &str,
    ) -> Result<bool, VaultError> {
        let result = sqlx::query(
            "DELETE FROM secret_tags WHERE secret_id = ? AND tag_type = ? AND tag_value = ?",
        )
        .bind(secret_id)
        .bind(tag_type)
        .bind(tag_value)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn tags(&self, secret_id: &str) -> Result<Vec<SecretTag>, VaultError> {
        let rows = sqlx::query(
            "SELECT id, secret_id, tag_type, tag_value, permission, created_at
             FROM secret_tags WHERE secret_id = ? ORDER BY tag_type, tag_value",
        )
        .bind(secret_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(tag_from_row).collect()
    }

    // ── Grants ───────────────────────────────────────────────────────────────

    /// Add a grant, replacing permission / grantor / expiry if the grantee
    /// already holds one on this secret.
    pub async fn upsert_grant(
        &self,
        secret_id: &str,
        spec: &GrantSpec,
        granted_by: &str,
    ) -> Result<SecretGrant, VaultError> {
        sqlx::query(
            "INSERT INTO secret_grants
                 (secret_id, grantee_type, grantee_name, permission, granted_by, expires_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(secret_id, grantee_type, grantee_name)
             DO UPDATE SET permission = excluded.permission,
                           granted_by = excluded.granted_by,
                           granted_at = datetime('now'),
                           expires_at = excluded.expires_at",
        )
        .bind(secret_id)
        .bind(spec.grantee_type.as_str())
        .bind(&spec.grantee_name)
        .bind(spec.permission.as_str())
        .bind(granted_by)
        .bind(&spec.expires_at)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            "SELECT id, secret_id, grantee_type, grantee_name, permission,
                    granted_by, granted_at, expires_at
             FROM secret_grants WHERE secret_id = ? AND grantee_type = ? AND grantee_name = ?",
        )
        .bind(secret_id)
        .bind(spec.grantee_type.as_str())
        .bind(&spec.grantee_name)
        .fetch_one(&self.pool)
        .await?;

        grant_from_row(&row)
    }

    /// Remove a grant. Returns whether it existed.
    pub async fn remove_grant(
        &self,
        secret_id: &str,
        grantee_type: AccessorKind,
        grantee_name: &str,
    ) -> Result<bool, VaultError> {
        let result = sqlx::query(
            "DELETE FROM secret_grants
             WHERE secret_id = ? AND grantee_type = ? AND grantee_name = ?",
        )
        .bind(secret_id)
        .bind(grantee_type.as_str())
        .bind(grantee_name)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn grants(&self, secret_id: &str) -> Result<Vec<SecretGrant>, VaultError> {
        let rows = sqlx::query(
            "SELECT id, secret_id, grantee_type, grantee_name, permission,
                    granted_by, granted_at, expires_at
             FROM secret_grants WHERE secret_id = ? ORDER BY grantee_type, grantee_name",
        )
        .bind(secret_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(grant_from_row).collect()
    }
}

fn tag_from_row(row: &SqliteRow) -> Result<SecretTag, VaultError> {
    let tag_type: String = row.get("tag_type");
    let permission: String = row.get("permission");

    Ok(SecretTag {
        id: row.get("id"),
        secret_id: row.get("secret_id"),
        tag_type: parse_or_corrupt(TagType::parse(&tag_type), "tag type", &tag_type)?,
        tag_value: row.get("tag_value"),
        permission: parse_or_corrupt(Permission::parse(&permission), "permission", &permission)?,
        created_at: row.get("created_at"),
    })
}

fn grant_from_row(row: &SqliteRow) -> Result<SecretGrant, VaultError> {
    let grantee_type: String = row.get("grantee_type");
    let permission: String = row.get("permission");

    Ok(SecretGrant {
        id: row.get("id"),
        secret_id: row.get("secret_id"),
        grantee_type: parse_or_corrupt(
            AccessorKind::parse(&grantee_type),
            "grantee type",
            &grantee_type,
        )?,
        grantee_name: row.get("grantee_name"),
        permission: parse_or_corrupt(Permission::parse(&permission), "permission", &permission)?,
        granted_by: row.get("granted_by"),
        granted_at: row.get("granted_at"),
        expires_at: row.get("expires_at"),
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            schema,
            store::{NewSecretRow, SecretStore},
            types::SecretType,
        },
    };

    async fn setup() -> (AccessControl, Secret) {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        schema::init_schema(&pool).await.unwrap();

        let store = SecretStore::new(pool.clone());
        let secret = store
            .insert(NewSecretRow {
                id: "id-1",
                name: "gh-token",
                secret_type: SecretType::ApiKey,
                iv: &[0u8; 24],
                ciphertext: &[1u8; 32],
                owner_type: AccessorKind::Principal,
                owner_name: "jordan",
                service_name: None,
                description: None,
                expires_at: None,
            })
            .await
            .unwrap();

        (AccessControl::new(pool), secret)
    }

    #[tokio::test]
    async fn owner_is_admin() {
        let (access, secret) = setup().await;
        let perm = access
            .effective_permission(&secret, &Accessor::principal("jordan"), None)
            .await
            .unwrap();
        assert_eq!(perm, Some(Permission::Admin));
    }

    #[tokio::test]
    async fn stranger_has_no_access() {
        let (access, secret) = setup().await;
        let perm = access
            .effective_permission(&secret, &Accessor::agent("housekeeping"), None)
            .await
            .unwrap();
        assert_eq!(perm, None);
    }

    #[tokio::test]
    async fn grant_confers_its_permission() {
        let (access, secret) = setup().await;
        access
            .upsert_grant(
                &secret.id,
                &GrantSpec {
                    grantee_type: AccessorKind::Agent,
                    grantee_name: "housekeeping".into(),
                    permission: Permission::Read,
                    expires_at: None,
                },
                "principal:jordan",
            )
            .await
            .unwrap();

        let perm = access
            .effective_permission(&secret, &Accessor::agent("housekeeping"), None)
            .await
            .unwrap();
        assert_eq!(perm, Some(Permission::Read));

        // Same name, different kind — no match.
        let perm = access
            .effective_permission(&secret, &Accessor::principal("housekeeping"), None)
            .await
            .unwrap();
        assert_eq!(perm, None);
    }

    #[tokio::test]
    async fn grant_upsert_replaces_permission() {
        let (access, secret) = setup().await;
        let spec = GrantSpec {
            grantee_type: AccessorKind::Agent,
            grantee_name: "housekeeping".into(),
            permission: Permission::Read,
            expires_at: None,
        };
        access
            .upsert_grant(&secret.id, &spec, "principal:jordan")
            .await
            .unwrap();
        access
            .upsert_grant(
                &secret.id,
                &GrantSpec {
                    permission: Permission::Write,
                    ..spec
                },
                "principal:jordan",
            )
            .await
            .unwrap();

        let grants = access.grants(&secret.id).await.unwrap();
        assert_eq!(grants.len(), 1);
        assert_eq!(grants[0].permission, Permission::Write);
    }

    #[tokio::test]
    async fn expired_grant_is_ignored() {
        let (access, secret) = setup().await;
        access
            .upsert_grant(
                &secret.id,
                &GrantSpec {
                    grantee_type: AccessorKind::Agent,
                    grantee_name: "housekeeping".into(),
                    permission: Permission::Admin,
                    expires_at: Some("2020-01-01T00:00:00Z".into()),
                },
                "principal:jordan",
            )
            .await
            .unwrap();

        let perm = access
            .effective_permission(&secret, &Accessor::agent("housekeeping"), None)
            .await
            .unwrap();
        assert_eq!(perm, None);
    }

    #[tokio::test]
    async fn revoked_grant_is_gone() {
        let (access, secret) = setup().await;
        access
            .upsert_grant(
                &secret.id,
                &GrantSpec {
                    grantee_type: AccessorKind::Agent,
                    grantee_name: "housekeeping".into(),
                    permission: Permission::Read,
                    expires_at: None,
                },
                "principal:jordan",
            )
            .await
            .unwrap();

        assert!(access
            .remove_grant(&secret.id, AccessorKind::Agent, "housekeeping")
            .await
            .unwrap());
        assert!(!access
            .remove_grant(&secret.id, AccessorKind::Agent, "housekeeping")
            .await
            .unwrap());

        let perm = access
            .effective_permission(&secret, &Accessor::agent("housekeeping"), None)
            .await
            .unwrap();
        assert_eq!(perm, None);
    }

    #[tokio::test]
    async fn tool_tag_matches_tool_context() {
        let (access, secret) = setup().await;
        access
            .upsert_tag(&secret.id, &TagSpec {
                tag_type: TagType::Tool,
                tag_value: "deployer".into(),
                permission: Permission::Read,
            })
            .await
            .unwrap();

        let caller = Accessor::agent("housekeeping");
        let perm = access
            .effective_permission(&secret, &caller, Some("deployer"))
            .await
            .unwrap();
        assert_eq!(perm, Some(Permission::Read));

        // No claim, no access.
        let perm = access
            .effective_permission(&secret, &caller, None)
            .await
            .unwrap();
        assert_eq!(perm, None);

        // Wrong claim, no access.
        let perm = access
            .effective_permission(&secret, &caller, Some("other-tool"))
            .await
            .unwrap();
        assert_eq!(perm, None);
    }

    #[tokio::test]
    async fn env_tag_grants_nothing() {
        let (access, secret) = setup().await;
        access
            .upsert_tag(&secret.id, &TagSpec {
                tag_type: TagType::Env,
                tag_value: "production".into(),
                permission: Permission::Read,
            })
            .await
            .unwrap();

        let perm = access
            .effective_permission(&secret, &Accessor::agent("housekeeping"), Some("production"))
            .await
            .unwrap();
        assert_eq!(perm, None);
    }

    #[tokio::test]
    async fn grant_wins_over_tag() {
        let (access, secret) = setup().await;
        access
            .upsert_grant(
                &secret.id,
                &GrantSpec {
                    grantee_type: AccessorKind::Agent,
                    grantee_name: "housekeeping".into(),
                    permission: Permission::Read,
                    expires_at: None,
                },
                "principal:jordan",
            )
            .await
            .unwrap();
        access
            .upsert_tag(&secret.id, &TagSpec {
                tag_type: TagType::Tool,
                tag_value: "deployer".into(),
                permission: Permission::Admin,
            })
            .await
            .unwrap();

        // First match wins: the explicit grant, not the stronger tag.
        let perm = access
            .effective_permission(&secret, &Accessor::agent("housekeeping"), Some("deployer"))
            .await
            .unwrap();
        assert_eq!(perm, Some(Permission::Read));
    }

    #[tokio::test]
    async fn strongest_matching_tag_wins() {
        let (access, secret) = setup().await;
        access
            .upsert_tag(&secret.id, &TagSpec {
                tag_type: TagType::Tool,
                tag_value: "deployer".into(),
                permission: Permission::Read,
            })
            .await
            .unwrap();
        access
            .upsert_tag(&secret.id, &TagSpec {
                tag_type: TagType::LocalTool,
                tag_value: "deployer".into(),
                permission: Permission::Write,
            })
            .await
            .unwrap();

        let perm = access
            .effective_permission(&secret, &Accessor::agent("housekeeping"), Some("deployer"))
            .await
            .unwrap();
        assert_eq!(perm, Some(Permission::Write));
    }

    #[tokio::test]
    async fn tag_upsert_and_remove() {
        let (access, secret) = setup().await;
        access
            .upsert_tag(&secret.id, &TagSpec {
                tag_type: TagType::Tool,
                tag_value: "deployer".into(),
                permission: Permission::Read,
            })
            .await
            .unwrap();
        let tag = access
            .upsert_tag(&secret.id, &TagSpec {
                tag_type: TagType::Tool,
                tag_value: "deployer".into(),
                permission: Permission::Write,
            })
            .await
            .unwrap();
        assert_eq!(tag.permission, Permission::Write);
        assert_eq!(access.tags(&secret.id).await.unwrap().len(), 1);

        assert!(access
            .remove_tag(&secret.id, "tool", "deployer")
            .await
            .unwrap());
        assert!(!access
            .remove_tag(&secret.id, "tool", "deployer")
            .await
            .unwrap());
        assert!(access.tags(&secret.id).await.unwrap().is_empty());
    }
}
