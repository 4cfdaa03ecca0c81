//! Queryable, append-only record of security-relevant events.
//!
//! Writing never fails the caller: an entry that cannot be persisted is
//! handed to the [`AuditFailureSink`] and counted in
//! `audit_log_write_failures_total`.

use std::sync::Arc;

use chrono::Duration;
use tracing::{error, info};
use uuid::Uuid;

use warden_core::{AppError, AppResult, Clock};
use warden_domain::AuditLogEntry;

use crate::{AuditFailureSink, AuditLogInput, AuditLogRepository};

/// Application service for the audit trail.
#[derive(Clone)]
pub struct AuditLogService {
    repository: Arc<dyn AuditLogRepository>,
    failure_sink: Arc<dyn AuditFailureSink>,
    clock: Arc<dyn Clock>,
}

impl AuditLogService {
    /// Creates a service from its ports.
    #[must_use]
    pub fn new(
        repository: Arc<dyn AuditLogRepository>,
        failure_sink: Arc<dyn AuditFailureSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            failure_sink,
            clock,
        }
    }

    /// Appends an entry stamped with a fresh id and the current time.
    ///
    /// Returns the entry that was built, whether or not it was persisted.
    pub async fn log(&self, input: AuditLogInput) -> AuditLogEntry {
        let entry = AuditLogEntry {
            id: Uuid::new_v4(),
            timestamp: self.clock.now(),
            severity: input
                .severity
                .unwrap_or_else(|| input.action.default_severity()),
            user_id: input.user_id,
            action: input.action,
            resource_type: input.resource_type,
            resource_id: input.resource_id,
            resource_name: input.resource_name,
            details: input.details,
            status: input.status,
            changes: input.changes,
            ip_address: input.context.ip_address().map(str::to_owned),
            user_agent: input.context.user_agent().map(str::to_owned),
        };

        if let Err(append_error) = self.repository.append_entry(entry.clone()).await {
            metrics::counter!("audit_log_write_failures_total").increment(1);
            error!(
                entry_id = %entry.id,
                action = entry.action.as_str(),
                user_id = %entry.user_id,
                error = %append_error,
                "failed to persist audit entry"
            );
            self.failure_sink
                .record_failure(entry.clone(), append_error)
                .await;
        }

        entry
    }

    /// Removes entries older than `older_than_days` and returns how many were dropped.
    pub async fn clear_old_logs(&self, older_than_days: u32) -> AppResult<u64> {
        let cutoff = self
            .clock
            .now()
            .checked_sub_signed(Duration::days(i64::from(older_than_days)))
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "retention of {older_than_days} days reaches before the earliest timestamp"
                ))
            })?;
        let removed = self.repository.purge_entries_before(cutoff).await?;

        if removed > 0 {
            metrics::counter!("audit_log_entries_pruned_total", "reason" => "retention")
                .increment(removed);
        }
        info!(
            removed,
            older_than_days,
            cutoff = %cutoff,
            "cleared audit entries past retention"
        );

        Ok(removed)
    }

    /// Returns the number of stored entries.
    pub async fn entry_count(&self) -> AppResult<u64> {
        self.repository.count_entries().await
    }
}

mod export;
mod queries;

pub use export::ExportFormat;
