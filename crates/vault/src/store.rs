//! SQL access to secret records.
//!
//! Pure persistence: ciphertext goes in and out as opaque bytes, key
//! handling and encryption stay with the callers. Every per-secret lookup
//! accepts either the opaque id or the unique name.

use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use crate::{
    error::{VaultError, is_unique_violation},
    types::{
        AccessorKind, ListFilter, Secret, SecretPatch, SecretStats, SecretType, parse_or_corrupt,
    },
};

const DEFAULT_LIST_LIMIT: u32 = 50;
const MAX_LIST_LIMIT: u32 = 100;

const METADATA_COLUMNS: &str = "id, name, secret_type, owner_type, owner_name, \
     service_name, description, expires_at, created_at, updated_at";

/// Ciphertext and nonce of one stored secret value.
pub(crate) struct EncryptedParts {
    pub iv: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

/// Fields of a secret about to be inserted.
pub(crate) struct NewSecretRow<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub secret_type: SecretType,
    pub iv: &'a [u8],
    pub ciphertext: &'a [u8],
    pub owner_type: AccessorKind,
    pub owner_name: &'a str,
    pub service_name: Option<&'a str>,
    pub description: Option<&'a str>,
    pub expires_at: Option<&'a str>,
}

/// Secret row store.
#[derive(Clone)]
pub(crate) struct SecretStore {
    pool: SqlitePool,
}

impl SecretStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new secret. Name uniqueness is enforced by the UNIQUE
    /// constraint in the same statement — there is no separate existence
    /// check to race against.
    pub async fn insert(&self, row: NewSecretRow<'_>) -> Result<Secret, VaultError> {
        let inserted = sqlx::query(
            "INSERT INTO secrets (id, name, secret_type, encrypted_value, iv,
                                  owner_type, owner_name, service_name, description, expires_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(row.id)
        .bind(row.name)
        .bind(row.secret_type.as_str())
        .bind(row.ciphertext)
        .bind(row.iv)
        .bind(row.owner_type.as_str())
        .bind(row.owner_name)
        .bind(row.service_name)
        .bind(row.description)
        .bind(row.expires_at)
        .execute(&self.pool)
        .await;

        if let Err(e) = inserted {
            if is_unique_violation(&e) {
                return Err(VaultError::NameAlreadyExists(row.name.to_string()));
            }
            return Err(e.into());
        }

        self.get(row.id).await
    }

    /// Look up a secret's metadata by id or name.
    pub async fn find(&self, secret_ref: &str) -> Result<Option<Secret>, VaultError> {
        let sql = format!("SELECT {METADATA_COLUMNS} FROM secrets WHERE id = ? OR name = ?");
        let row = sqlx::query(&sql)
            .bind(secret_ref)
            .bind(secret_ref)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| secret_from_row(&r)).transpose()
    }

    /// Like [`find`](Self::find), but an unknown reference is an error.
    pub async fn get(&self, secret_ref: &str) -> Result<Secret, VaultError> {
        self.find(secret_ref)
            .await?
            .ok_or_else(|| VaultError::NotFound(secret_ref.to_string()))
    }

    /// Load the ciphertext and nonce of a secret's value.
    pub async fn encrypted_parts(&self, id: &str) -> Result<EncryptedParts, VaultError> {
        let row = sqlx::query("SELECT encrypted_value, iv FROM secrets WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| VaultError::NotFound(id.to_string()))?;

        Ok(EncryptedParts {
            ciphertext: row.get("encrypted_value"),
            iv: row.get("iv"),
        })
    }

    /// Patch metadata fields. The value itself only changes via
    /// [`replace_value`](Self::replace_value).
    pub async fn update_metadata(&self, id: &str, patch: &SecretPatch) -> Result<(), VaultError> {
        let mut sets = vec!["updated_at = datetime('now')".to_string()];
        let mut params: Vec<Option<String>> = Vec::new();

        if let Some(service_name) = &patch.service_name {
            sets.push("service_name = ?".to_string());
            params.push(Some(service_name.clone()));
        }
        if let Some(description) = &patch.description {
            sets.push("description = ?".to_string());
            params.push(Some(description.clone()));
        }
        if let Some(expires_at) = &patch.expires_at {
            sets.push("expires_at = ?".to_string());
            params.push(expires_at.clone());
        }

        let sql = format!("UPDATE secrets SET {} WHERE id = ?", sets.join(", "));
        let mut query = sqlx::query(&sql);
        for param in &params {
            query = query.bind(param);
        }
        query.bind(id).execute(&self.pool).await?;
        Ok(())
    }

    /// Swap in a freshly encrypted value. The previous ciphertext is gone;
    /// no value history is kept.
    pub async fn replace_value(
        &self,
        id: &str,
        iv: &[u8],
        ciphertext: &[u8],
    ) -> Result<(), VaultError> {
        sqlx::query(
            "UPDATE secrets SET encrypted_value = ?, iv = ?, updated_at = datetime('now')
             WHERE id = ?",
        )
        .bind(ciphertext)
        .bind(iv)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Delete a secret and its tags and grants. Frees the name for reuse.
    pub async fn delete(&self, id: &str) -> Result<(), VaultError> {
        sqlx::query("DELETE FROM secret_tags WHERE secret_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM secret_grants WHERE secret_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM secrets WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// List secrets matching the filter, newest first. Access filtering is
    /// the caller's job.
    pub async fn list(&self, filter: &ListFilter) -> Result<Vec<Secret>, VaultError> {
        let mut conditions: Vec<&'static str> = Vec::new();
        let mut params: Vec<String> = Vec::new();

        if let Some(secret_type) = filter.secret_type {
            conditions.push("s.secret_type = ?");
            params.push(secret_type.as_str().to_string());
        }
        if let Some(service_name) = &filter.service_name {
            conditions.push("s.service_name = ?");
            params.push(service_name.clone());
        }
        if let Some(owner) = &filter.owner {
            conditions.push("s.owner_name = ?");
            params.push(owner.clone());
        }
        if let Some(tool) = &filter.tool {
            conditions.push(
                "EXISTS (SELECT 1 FROM secret_tags t
                         WHERE t.secret_id = s.id AND t.tag_type = 'tool' AND t.tag_value = ?)",
            );
            params.push(tool.clone());
        }
        if let Some(env) = &filter.env {
            conditions.push(
                "EXISTS (SELECT 1 FROM secret_tags t
                         WHERE t.secret_id = s.id AND t.tag_type = 'env' AND t.tag_value = ?)",
            );
            params.push(env.clone());
        }

        let mut sql = format!(
            "SELECT {} FROM secrets s",
            METADATA_COLUMNS
                .split(", ")
                .map(|c| format!("s.{c}"))
                .collect::<Vec<_>>()
                .join(", ")
        );
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY s.created_at DESC, s.name LIMIT ? OFFSET ?");

        let limit = filter
            .limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT);
        let offset = filter.offset.unwrap_or(0);

        let mut query = sqlx::query(&sql);
        for param in &params {
            query = query.bind(param);
        }
        let rows = query
            .bind(i64::from(limit))
            .bind(i64::from(offset))
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(secret_from_row).collect()
    }

    /// All secrets carrying a given tag. Access filtering is the caller's
    /// job.
    pub async fn find_by_tag(
        &self,
        tag_type: &str,
        tag_value: &str,
    ) -> Result<Vec<Secret>, VaultError> {
        let sql = format!(
            "SELECT {} FROM secrets s
             JOIN secret_tags t ON t.secret_id = s.id
             WHERE t.tag_type = ? AND t.tag_value = ?
             ORDER BY s.name",
            METADATA_COLUMNS
                .split(", ")
                .map(|c| format!("s.{c}"))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let rows = sqlx::query(&sql)
            .bind(tag_type)
            .bind(tag_value)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(secret_from_row).collect()
    }

    /// Aggregate counts: per type, expiring within 30 days, already expired.
    pub async fn stats(&self) -> Result<SecretStats, VaultError> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM secrets")
            .fetch_one(&self.pool)
            .await?;

        let mut by_type = std::collections::BTreeMap::new();
        for secret_type in SecretType::ALL {
            by_type.insert(secret_type.as_str().to_string(), 0i64);
        }
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT secret_type, COUNT(*) FROM secrets GROUP BY secret_type")
                .fetch_all(&self.pool)
                .await?;
        for (secret_type, count) in rows {
            by_type.insert(secret_type, count);
        }

        let (expiring_soon,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM secrets
             WHERE expires_at IS NOT NULL
               AND datetime(expires_at) > datetime('now')
               AND datetime(expires_at) <= datetime('now', '+30 days')",
        )
        .fetch_one(&self.pool)
        .await?;

        let (expired,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM secrets
             WHERE expires_at IS NOT NULL AND datetime(expires_at) <= datetime('now')",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(SecretStats {
            total,
            by_type,
            expiring_soon,
            expired,
        })
    }
}

fn secret_from_row(row: &SqliteRow) -> Result<Secret, VaultError> {
    let secret_type: String = row.get("secret_type");
    let owner_type: String = row.get("owner_type");

    Ok(Secret {
        id: row.get("id"),
        name: row.get("name"),
        secret_type: parse_or_corrupt(SecretType::parse(&secret_type), "secret type", &secret_type)?,
        owner_type: parse_or_corrupt(AccessorKind::parse(&owner_type), "owner type", &owner_type)?,
        owner_name: row.get("owner_name"),
        service_name: row.get("service_name"),
        description: row.get("description"),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::schema};

    async fn test_store() -> SecretStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        schema::init_schema(&pool).await.unwrap();
        SecretStore::new(pool)
    }

    fn row<'a>(id: &'a str, name: &'a str) -> NewSecretRow<'a> {
        NewSecretRow {
            id,
            name,
            secret_type: SecretType::ApiKey,
            iv: &[0u8; 24],
            ciphertext: &[1u8; 32],
            owner_type: AccessorKind::Principal,
            owner_name: "jordan",
            service_name: None,
            description: None,
            expires_at: None,
        }
    }

    #[tokio::test]
    async fn insert_and_find_by_id_or_name() {
        let store = test_store().await;
        let secret = store.insert(row("id-1", "gh-token")).await.unwrap();
        assert_eq!(secret.name, "gh-token");
        assert_eq!(secret.secret_type, SecretType::ApiKey);

        assert!(store.find("id-1").await.unwrap().is_some());
        assert!(store.find("gh-token").await.unwrap().is_some());
        assert!(store.find("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_name_is_a_conflict() {
        let store = test_store().await;
        store.insert(row("id-1", "gh-token")).await.unwrap();

        let result = store.insert(row("id-2", "gh-token")).await;
        assert!(matches!(result, Err(VaultError::NameAlreadyExists(n)) if n == "gh-token"));

        // The original row is untouched.
        let secret = store.get("gh-token").await.unwrap();
        assert_eq!(secret.id, "id-1");
    }

    #[tokio::test]
    async fn delete_frees_the_name() {
        let store = test_store().await;
        store.insert(row("id-1", "gh-token")).await.unwrap();
        store.delete("id-1").await.unwrap();
        assert!(store.find("gh-token").await.unwrap().is_none());

        store.insert(row("id-2", "gh-token")).await.unwrap();
        assert_eq!(store.get("gh-token").await.unwrap().id, "id-2");
    }

    #[tokio::test]
    async fn metadata_patch() {
        let store = test_store().await;
        store.insert(row("id-1", "gh-token")).await.unwrap();

        store
            .update_metadata("id-1", &SecretPatch {
                service_name: Some("GitHub".into()),
                description: Some("deploy token".into()),
                expires_at: Some(Some("2027-01-01T00:00:00Z".into())),
            })
            .await
            .unwrap();

        let secret = store.get("id-1").await.unwrap();
        assert_eq!(secret.service_name.as_deref(), Some("GitHub"));
        assert_eq!(secret.description.as_deref(), Some("deploy token"));
        assert!(secret.expires_at.is_some());

        // Some(None) clears the expiry; None leaves fields alone.
        store
            .update_metadata("id-1", &SecretPatch {
                expires_at: Some(None),
                ..SecretPatch::default()
            })
            .await
            .unwrap();
        let secret = store.get("id-1").await.unwrap();
        assert!(secret.expires_at.is_none());
        assert_eq!(secret.service_name.as_deref(), Some("GitHub"));
    }

    #[tokio::test]
    async fn replace_value_discards_old_ciphertext() {
        let store = test_store().await;
        store.insert(row("id-1", "gh-token")).await.unwrap();

        store
            .replace_value("id-1", &[9u8; 24], &[7u8; 40])
            .await
            .unwrap();

        let parts = store.encrypted_parts("id-1").await.unwrap();
        assert_eq!(parts.iv, vec![9u8; 24]);
        assert_eq!(parts.ciphertext, vec![7u8; 40]);
    }

    #[tokio::test]
    async fn list_filters() {
        let store = test_store().await;
        store.insert(row("id-1", "gh-token")).await.unwrap();
        store
            .insert(NewSecretRow {
                secret_type: SecretType::Password,
                owner_name: "quinn",
                service_name: Some("AWS"),
                ..row("id-2", "db-password")
            })
            .await
            .unwrap();

        let all = store.list(&ListFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let by_type = store
            .list(&ListFilter {
                secret_type: Some(SecretType::Password),
                ..ListFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(by_type.len(), 1);
        assert_eq!(by_type[0].name, "db-password");

        let by_owner = store
            .list(&ListFilter {
                owner: Some("jordan".into()),
                ..ListFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(by_owner.len(), 1);
        assert_eq!(by_owner[0].name, "gh-token");

        let by_service = store
            .list(&ListFilter {
                service_name: Some("AWS".into()),
                ..ListFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(by_service.len(), 1);
    }

    #[tokio::test]
    async fn list_by_tag_filter_and_join() {
        let store = test_store().await;
        store.insert(row("id-1", "gh-token")).await.unwrap();
        store.insert(row("id-2", "npm-token")).await.unwrap();

        sqlx::query(
            "INSERT INTO secret_tags (secret_id, tag_type, tag_value, permission)
             VALUES ('id-1', 'tool', 'deployer', 'read')",
        )
        .execute(&store.pool)
        .await
        .unwrap();

        let tagged = store
            .list(&ListFilter {
                tool: Some("deployer".into()),
                ..ListFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].id, "id-1");

        let joined = store.find_by_tag("tool", "deployer").await.unwrap();
        assert_eq!(joined.len(), 1);
        assert!(store.find_by_tag("tool", "other").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stats_windows() {
        let store = test_store().await;
        store.insert(row("id-1", "gh-token")).await.unwrap();
        store
            .insert(NewSecretRow {
                expires_at: Some("2020-01-01T00:00:00Z"),
                ..row("id-2", "stale-token")
            })
            .await
            .unwrap();
        store
            .insert(NewSecretRow {
                secret_type: SecretType::Password,
                expires_at: Some("2099-01-01T00:00:00Z"),
                ..row("id-3", "far-future")
            })
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.by_type["api_key"], 2);
        assert_eq!(stats.by_type["password"], 1);
        assert_eq!(stats.by_type["ssh_key"], 0);
        assert_eq!(stats.expired, 1);
        assert_eq!(stats.expiring_soon, 0);
    }
}
