use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use warden_application::AuditLogRepository;
use warden_core::{AppError, AppResult};
use warden_domain::{
    AuditAction, AuditChanges, AuditLogEntry, AuditLogQuery, AuditSeverity, AuditStatus,
};

/// PostgreSQL-backed audit trail.
#[derive(Clone)]
pub struct PostgresAuditLogRepository {
    pool: PgPool,
}

impl PostgresAuditLogRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct AuditLogRow {
    id: Uuid,
    timestamp: DateTime<Utc>,
    user_id: String,
    action: String,
    resource_type: String,
    resource_id: Option<String>,
    resource_name: Option<String>,
    details: Option<Value>,
    status: String,
    severity: String,
    changes: Option<Value>,
    ip_address: Option<String>,
    user_agent: Option<String>,
}

impl TryFrom<AuditLogRow> for AuditLogEntry {
    type Error = AppError;

    fn try_from(row: AuditLogRow) -> Result<Self, Self::Error> {
        let changes = row
            .changes
            .map(serde_json::from_value::<AuditChanges>)
            .transpose()
            .map_err(|error| {
                AppError::Internal(format!("failed to decode audit entry changes: {error}"))
            })?;

        Ok(Self {
            id: row.id,
            timestamp: row.timestamp,
            user_id: row.user_id,
            action: AuditAction::from_str(&row.action)?,
            resource_type: row.resource_type,
            resource_id: row.resource_id,
            resource_name: row.resource_name,
            details: row.details,
            status: AuditStatus::from_str(&row.status)?,
            severity: AuditSeverity::from_str(&row.severity)?,
            changes,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
        })
    }
}

#[async_trait]
impl AuditLogRepository for PostgresAuditLogRepository {
    async fn append_entry(&self, entry: AuditLogEntry) -> AppResult<()> {
        let changes = entry
            .changes
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|error| {
                AppError::Internal(format!("failed to encode audit entry changes: {error}"))
            })?;

        sqlx::query(
            r#"
            INSERT INTO audit_log_entries (
                id,
                timestamp,
                user_id,
                action,
                resource_type,
                resource_id,
                resource_name,
                details,
                status,
                severity,
                changes,
                ip_address,
                user_agent
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(entry.id)
        .bind(entry.timestamp)
        .bind(entry.user_id.as_str())
        .bind(entry.action.as_str())
        .bind(entry.resource_type.as_str())
        .bind(entry.resource_id.as_deref())
        .bind(entry.resource_name.as_deref())
        .bind(entry.details.clone())
        .bind(entry.status.as_str())
        .bind(entry.severity.as_str())
        .bind(changes)
        .bind(entry.ip_address.as_deref())
        .bind(entry.user_agent.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to append audit entry: {error}")))?;

        Ok(())
    }

    async fn query_entries(&self, query: &AuditLogQuery) -> AppResult<Vec<AuditLogEntry>> {
        let limit = query
            .limit
            .map(|limit| i64::try_from(limit).unwrap_or(i64::MAX));
        let offset = i64::try_from(query.offset).unwrap_or(i64::MAX);

        let rows = sqlx::query_as::<_, AuditLogRow>(
            r#"
            SELECT
                id,
                timestamp,
                user_id,
                action,
                resource_type,
                resource_id,
                resource_name,
                details,
                status,
                severity,
                changes,
                ip_address,
                user_agent
            FROM audit_log_entries
            WHERE ($1::TEXT IS NULL OR user_id = $1)
                AND ($2::TEXT IS NULL OR action = $2)
                AND ($3::TEXT IS NULL OR resource_type = $3)
                AND ($4::TEXT IS NULL OR resource_id = $4)
                AND ($5::TEXT IS NULL OR status = $5)
                AND ($6::TEXT IS NULL OR severity = $6)
                AND ($7::TIMESTAMPTZ IS NULL OR timestamp >= $7)
                AND ($8::TIMESTAMPTZ IS NULL OR timestamp <= $8)
            ORDER BY timestamp DESC, sequence DESC
            LIMIT $9
            OFFSET $10
            "#,
        )
        .bind(query.user_id.as_deref())
        .bind(query.action.map(|action| action.as_str()))
        .bind(query.resource_type.as_deref())
        .bind(query.resource_id.as_deref())
        .bind(query.status.map(|status| status.as_str()))
        .bind(query.severity.map(|severity| severity.as_str()))
        .bind(query.start_date)
        .bind(query.end_date)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to query audit entries: {error}")))?;

        rows.into_iter().map(AuditLogEntry::try_from).collect()
    }

    async fn purge_entries_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM audit_log_entries
            WHERE timestamp < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to purge audit entries: {error}")))?;

        Ok(result.rows_affected())
    }

    async fn count_entries(&self) -> AppResult<u64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM audit_log_entries")
            .fetch_one(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to count audit entries: {error}"))
            })?;

        Ok(u64::try_from(count).unwrap_or_default())
    }
}
