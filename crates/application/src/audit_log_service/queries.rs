use chrono::{DateTime, Duration, Utc};

use warden_core::AppResult;
use warden_domain::{AuditAction, AuditLogEntry, AuditLogQuery, AuditSeverity, AuditStats, AuditStatus};

use super::AuditLogService;

impl AuditLogService {
    /// Returns entries matching `query`, newest first.
    pub async fn query(&self, query: &AuditLogQuery) -> AppResult<Vec<AuditLogEntry>> {
        self.repository.query_entries(query).await
    }

    /// Returns entries produced by one principal.
    pub async fn user_logs(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> AppResult<Vec<AuditLogEntry>> {
        self.query(&AuditLogQuery {
            user_id: Some(user_id.to_owned()),
            limit,
            ..AuditLogQuery::default()
        })
        .await
    }

    /// Returns entries touching a resource type, optionally narrowed to one id.
    pub async fn resource_logs(
        &self,
        resource_type: &str,
        resource_id: Option<&str>,
        limit: Option<usize>,
    ) -> AppResult<Vec<AuditLogEntry>> {
        self.query(&AuditLogQuery {
            resource_type: Some(resource_type.to_owned()),
            resource_id: resource_id.map(str::to_owned),
            limit,
            ..AuditLogQuery::default()
        })
        .await
    }

    /// Returns failed logins for `user_id` within the last `hours`.
    pub async fn failed_login_attempts(
        &self,
        user_id: &str,
        hours: u32,
    ) -> AppResult<Vec<AuditLogEntry>> {
        self.query(&AuditLogQuery {
            user_id: Some(user_id.to_owned()),
            action: Some(AuditAction::Login),
            status: Some(AuditStatus::Failure),
            start_date: self.window_start(hours),
            ..AuditLogQuery::default()
        })
        .await
    }

    /// Returns access-denied events within the last `hours`.
    pub async fn access_denied_events(&self, hours: u32) -> AppResult<Vec<AuditLogEntry>> {
        self.query(&AuditLogQuery {
            action: Some(AuditAction::AccessDenied),
            status: Some(AuditStatus::Failure),
            start_date: self.window_start(hours),
            ..AuditLogQuery::default()
        })
        .await
    }

    /// Returns critical-severity entries within the last `hours`.
    pub async fn critical_events(&self, hours: u32) -> AppResult<Vec<AuditLogEntry>> {
        self.query(&AuditLogQuery {
            severity: Some(AuditSeverity::Critical),
            start_date: self.window_start(hours),
            ..AuditLogQuery::default()
        })
        .await
    }

    /// Aggregates entries between the optional inclusive bounds.
    pub async fn stats(
        &self,
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
    ) -> AppResult<AuditStats> {
        let entries = self
            .query(&AuditLogQuery {
                start_date,
                end_date,
                ..AuditLogQuery::default()
            })
            .await?;

        Ok(AuditStats::from_entries(&entries))
    }

    /// Lower bound of a trailing window; `None` when the window reaches past
    /// the earliest representable instant, which leaves it unbounded.
    fn window_start(&self, hours: u32) -> Option<DateTime<Utc>> {
        self.clock
            .now()
            .checked_sub_signed(Duration::hours(i64::from(hours)))
    }
}
