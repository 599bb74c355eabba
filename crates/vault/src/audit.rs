//! Append-only audit trail.
//!
//! Every state-changing or value-revealing operation lands here before its
//! response returns to the caller. The vault exposes no update or delete on
//! this table — history only grows.

use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use crate::{
    error::VaultError,
    types::{Accessor, AccessorKind, AuditAction, AuditEntry, AuditQuery, parse_or_corrupt},
};

const DEFAULT_QUERY_LIMIT: u32 = 100;
const MAX_QUERY_LIMIT: u32 = 1000;

/// One operation about to be recorded.
pub(crate) struct AuditEvent<'a> {
    pub secret_id: &'a str,
    pub secret_name: &'a str,
    pub accessor: &'a Accessor,
    pub action: AuditAction,
    pub tool_context: Option<&'a str>,
    pub ip_address: Option<&'a str>,
}

/// Audit log writer and query surface.
#[derive(Clone)]
pub(crate) struct AuditLog {
    pool: SqlitePool,
}

impl AuditLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append one entry. The secret's name is copied into the row so the
    /// entry outlives the secret.
    pub async fn append(&self, event: AuditEvent<'_>) -> Result<(), VaultError> {
        sqlx::query(
            "INSERT INTO secret_audit_log
                 (secret_id, secret_name, accessor_type, accessor_name, action,
                  tool_context, ip_address)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(event.secret_id)
        .bind(event.secret_name)
        .bind(event.accessor.kind.as_str())
        .bind(&event.accessor.name)
        .bind(event.action.as_str())
        .bind(event.tool_context)
        .bind(event.ip_address)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Full history of one secret, newest first.
    pub async fn for_secret(&self, secret_id: &str) -> Result<Vec<AuditEntry>, VaultError> {
        let rows = sqlx::query(
            "SELECT id, secret_id, secret_name, accessor_type, accessor_name, action,
                    tool_context, ip_address, timestamp
             FROM secret_audit_log WHERE secret_id = ?
             ORDER BY timestamp DESC, id DESC",
        )
        .bind(secret_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }

    /// Global query with filters and pagination. Returns the page and the
    /// total match count.
    pub async fn query(&self, query: &AuditQuery) -> Result<(Vec<AuditEntry>, i64), VaultError> {
        let mut conditions: Vec<&'static str> = Vec::new();
        let mut params: Vec<String> = Vec::new();

        if let Some(secret_id) = &query.secret_id {
            conditions.push("secret_id = ?");
            params.push(secret_id.clone());
        }
        if let Some(accessor_name) = &query.accessor_name {
            conditions.push("accessor_name = ?");
            params.push(accessor_name.clone());
        }
        if let Some(action) = query.action {
            conditions.push("action = ?");
            params.push(action.as_str().to_string());
        }
        if let Some(since) = &query.since {
            conditions.push("datetime(timestamp) >= datetime(?)");
            params.push(since.clone());
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) FROM secret_audit_log{where_clause}");
        let mut count_query = sqlx::query_as::<_, (i64,)>(&count_sql);
        for param in &params {
            count_query = count_query.bind(param);
        }
        let (total,) = count_query.fetch_one(&self.pool).await?;

        let limit = query
            .limit
            .unwrap_or(DEFAULT_QUERY_LIMIT)
            .clamp(1, MAX_QUERY_LIMIT);
        let offset = query.offset.unwrap_or(0);

        let page_sql = format!(
            "SELECT id, secret_id, secret_name, accessor_type, accessor_name, action,
                    tool_context, ip_address, timestamp
             FROM secret_audit_log{where_clause}
             ORDER BY timestamp DESC, id DESC LIMIT ? OFFSET ?"
        );
        let mut page_query = sqlx::query(&page_sql);
        for param in &params {
            page_query = page_query.bind(param);
        }
        let rows = page_query
            .bind(i64::from(limit))
            .bind(i64::from(offset))
            .fetch_all(&self.pool)
            .await?;

        let entries = rows
            .iter()
            .map(entry_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((entries, total))
    }
}

fn entry_from_row(row: &SqliteRow) -> Result<AuditEntry, VaultError> {
    let accessor_type: String = row.get("accessor_type");
    let action: String = row.get("action");

    Ok(AuditEntry {
        id: row.get("id"),
        secret_id: row.get("secret_id"),
        secret_name: row.get("secret_name"),
        accessor_type: parse_or_corrupt(
            AccessorKind::parse(&accessor_type),
            "accessor type",
            &accessor_type,
        )?,
        accessor_name: row.get("accessor_name"),
        action: parse_or_corrupt(AuditAction::parse(&action), "audit action", &action)?,
        tool_context: row.get("tool_context"),
        ip_address: row.get("ip_address"),
        timestamp: row.get("timestamp"),
    })
}
