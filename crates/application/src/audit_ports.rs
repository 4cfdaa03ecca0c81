use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use warden_core::{AppError, AppResult, RequestContext};
use warden_domain::{AuditAction, AuditChanges, AuditLogEntry, AuditLogQuery, AuditSeverity, AuditStatus};

/// Repository port for the append-only audit trail.
#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    /// Persists one entry.
    async fn append_entry(&self, entry: AuditLogEntry) -> AppResult<()>;

    /// Returns entries matching every populated filter, newest first, with
    /// insertion order breaking timestamp ties and pagination applied.
    async fn query_entries(&self, query: &AuditLogQuery) -> AppResult<Vec<AuditLogEntry>>;

    /// Deletes entries recorded strictly before `cutoff`.
    async fn purge_entries_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64>;

    /// Returns the number of stored entries.
    async fn count_entries(&self) -> AppResult<u64>;
}

/// Port receiving entries that could not be persisted.
#[async_trait]
pub trait AuditFailureSink: Send + Sync {
    /// Records an entry whose append failed.
    async fn record_failure(&self, entry: AuditLogEntry, error: AppError);
}

/// Caller-supplied part of an audit entry.
#[derive(Debug, Clone)]
pub struct AuditLogInput {
    /// Acting principal.
    pub user_id: String,
    /// Audited action.
    pub action: AuditAction,
    /// Type of the affected resource.
    pub resource_type: String,
    /// Affected resource id.
    pub resource_id: Option<String>,
    /// Human-readable resource name.
    pub resource_name: Option<String>,
    /// Free-form structured details.
    pub details: Option<Value>,
    /// Outcome, `success` unless set.
    pub status: AuditStatus,
    /// Severity override; derived from the action when absent.
    pub severity: Option<AuditSeverity>,
    /// Optional before/after diff.
    pub changes: Option<AuditChanges>,
    /// Client metadata.
    pub context: RequestContext,
}

impl AuditLogInput {
    /// Creates a successful entry with no optional fields.
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        action: AuditAction,
        resource_type: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            action,
            resource_type: resource_type.into(),
            resource_id: None,
            resource_name: None,
            details: None,
            status: AuditStatus::Success,
            severity: None,
            changes: None,
            context: RequestContext::internal(),
        }
    }

    /// Sets the affected resource id.
    #[must_use]
    pub fn resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    /// Sets the human-readable resource name.
    #[must_use]
    pub fn resource_name(mut self, resource_name: impl Into<String>) -> Self {
        self.resource_name = Some(resource_name.into());
        self
    }

    /// Attaches structured details.
    #[must_use]
    pub fn details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Sets the outcome.
    #[must_use]
    pub fn status(mut self, status: AuditStatus) -> Self {
        self.status = status;
        self
    }

    /// Overrides the derived severity.
    #[must_use]
    pub fn severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Attaches a before/after diff.
    #[must_use]
    pub fn changes(mut self, before: Value, after: Value) -> Self {
        self.changes = Some(AuditChanges { before, after });
        self
    }

    /// Attaches client metadata.
    #[must_use]
    pub fn context(mut self, context: RequestContext) -> Self {
        self.context = context;
        self
    }
}
