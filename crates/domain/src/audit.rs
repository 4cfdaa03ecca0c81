//! Audit trail vocabulary, entries and query filters.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;
use warden_core::AppError;

/// Stable audit actions emitted by the core and its callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Sign-in attempt.
    Login,
    /// Sign-out.
    Logout,
    /// File uploaded.
    FileUpload,
    /// File downloaded.
    FileDownload,
    /// File deleted.
    FileDelete,
    /// File shared.
    FileShare,
    /// Personal settings changed.
    SettingsChange,
    /// Password changed.
    PasswordChange,
    /// Second factor enabled.
    MfaEnabled,
    /// Second factor disabled.
    MfaDisabled,
    /// Second-factor verification attempt.
    MfaVerified,
    /// Backup codes replaced.
    BackupCodesRegenerated,
    /// Device remembered.
    DeviceTrusted,
    /// Device trust revoked.
    DeviceRevoked,
    /// Custom, denied or resource permissions changed.
    PermissionsModified,
    /// Role assigned to a principal.
    RoleAssigned,
    /// Role removed from a principal.
    RoleRemoved,
    /// Role registered or created.
    RoleCreated,
    /// Permission request submitted.
    PermissionRequested,
    /// Permission check refused.
    AccessDenied,
    /// Administrative operation.
    AdminAction,
    /// Key material rotated.
    KeyRotation,
    /// Security alert raised.
    SecurityAlert,
    /// Data exported.
    DataExport,
}

impl AuditAction {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Logout => "logout",
            Self::FileUpload => "file_upload",
            Self::FileDownload => "file_download",
            Self::FileDelete => "file_delete",
            Self::FileShare => "file_share",
            Self::SettingsChange => "settings_change",
            Self::PasswordChange => "password_change",
            Self::MfaEnabled => "mfa_enabled",
            Self::MfaDisabled => "mfa_disabled",
            Self::MfaVerified => "mfa_verified",
            Self::BackupCodesRegenerated => "backup_codes_regenerated",
            Self::DeviceTrusted => "device_trusted",
            Self::DeviceRevoked => "device_revoked",
            Self::PermissionsModified => "permissions_modified",
            Self::RoleAssigned => "role_assigned",
            Self::RoleRemoved => "role_removed",
            Self::RoleCreated => "role_created",
            Self::PermissionRequested => "permission_requested",
            Self::AccessDenied => "access_denied",
            Self::AdminAction => "admin_action",
            Self::KeyRotation => "key_rotation",
            Self::SecurityAlert => "security_alert",
            Self::DataExport => "data_export",
        }
    }

    /// Returns all known actions.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[AuditAction] = &[
            AuditAction::Login,
            AuditAction::Logout,
            AuditAction::FileUpload,
            AuditAction::FileDownload,
            AuditAction::FileDelete,
            AuditAction::FileShare,
            AuditAction::SettingsChange,
            AuditAction::PasswordChange,
            AuditAction::MfaEnabled,
            AuditAction::MfaDisabled,
            AuditAction::MfaVerified,
            AuditAction::BackupCodesRegenerated,
            AuditAction::DeviceTrusted,
            AuditAction::DeviceRevoked,
            AuditAction::PermissionsModified,
            AuditAction::RoleAssigned,
            AuditAction::RoleRemoved,
            AuditAction::RoleCreated,
            AuditAction::PermissionRequested,
            AuditAction::AccessDenied,
            AuditAction::AdminAction,
            AuditAction::KeyRotation,
            AuditAction::SecurityAlert,
            AuditAction::DataExport,
        ];

        ALL
    }

    /// Severity assigned when the caller does not override it.
    #[must_use]
    pub fn default_severity(&self) -> AuditSeverity {
        match self {
            Self::AdminAction | Self::KeyRotation | Self::SecurityAlert => AuditSeverity::Critical,
            Self::MfaDisabled
            | Self::PasswordChange
            | Self::PermissionsModified
            | Self::RoleAssigned
            | Self::RoleRemoved
            | Self::RoleCreated => AuditSeverity::High,
            Self::FileDelete | Self::FileShare | Self::SettingsChange | Self::DataExport => {
                AuditSeverity::Medium
            }
            _ => AuditSeverity::Low,
        }
    }
}

impl FromStr for AuditAction {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|action| action.as_str() == value)
            .ok_or_else(|| AppError::Validation(format!("unknown audit action '{value}'")))
    }
}

/// Coarse urgency classification used for triage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    /// Routine activity.
    Low,
    /// Notable activity.
    Medium,
    /// Security-relevant change.
    High,
    /// Requires immediate attention.
    Critical,
}

impl AuditSeverity {
    /// Returns a stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl FromStr for AuditSeverity {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(AppError::Validation(format!(
                "unknown audit severity '{value}'"
            ))),
        }
    }
}

/// Outcome of the audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    /// Action succeeded.
    Success,
    /// Action failed.
    Failure,
    /// Action succeeded with caveats.
    Warning,
}

impl AuditStatus {
    /// Returns a stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Warning => "warning",
        }
    }
}

impl FromStr for AuditStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            "warning" => Ok(Self::Warning),
            _ => Err(AppError::Validation(format!(
                "unknown audit status '{value}'"
            ))),
        }
    }
}

/// Before/after snapshot attached to an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditChanges {
    /// State before the action.
    pub before: Value,
    /// State after the action.
    pub after: Value,
}

/// Immutable audit fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    /// Generated entry id.
    pub id: Uuid,
    /// Time the entry was recorded.
    pub timestamp: DateTime<Utc>,
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
    /// Outcome.
    pub status: AuditStatus,
    /// Urgency classification.
    pub severity: AuditSeverity,
    /// Optional before/after diff.
    pub changes: Option<AuditChanges>,
    /// Client IP address.
    pub ip_address: Option<String>,
    /// Client user agent.
    pub user_agent: Option<String>,
}

/// Filters for audit queries; every populated field must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditLogQuery {
    /// Acting principal.
    pub user_id: Option<String>,
    /// Audited action.
    pub action: Option<AuditAction>,
    /// Resource type.
    pub resource_type: Option<String>,
    /// Resource id.
    pub resource_id: Option<String>,
    /// Outcome.
    pub status: Option<AuditStatus>,
    /// Exact severity.
    pub severity: Option<AuditSeverity>,
    /// Inclusive lower time bound.
    pub start_date: Option<DateTime<Utc>>,
    /// Inclusive upper time bound.
    pub end_date: Option<DateTime<Utc>>,
    /// Entries skipped after sorting.
    pub offset: usize,
    /// Maximum entries returned after sorting.
    pub limit: Option<usize>,
}

impl AuditLogQuery {
    /// Returns whether `entry` satisfies every populated filter.
    #[must_use]
    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        self.user_id
            .as_deref()
            .is_none_or(|user_id| entry.user_id == user_id)
            && self.action.is_none_or(|action| entry.action == action)
            && self
                .resource_type
                .as_deref()
                .is_none_or(|resource_type| entry.resource_type == resource_type)
            && self
                .resource_id
                .as_deref()
                .is_none_or(|resource_id| entry.resource_id.as_deref() == Some(resource_id))
            && self.status.is_none_or(|status| entry.status == status)
            && self.severity.is_none_or(|severity| entry.severity == severity)
            && self.start_date.is_none_or(|start| entry.timestamp >= start)
            && self.end_date.is_none_or(|end| entry.timestamp <= end)
    }

    /// Applies offset and limit to entries that are already sorted.
    #[must_use]
    pub fn paginate(&self, entries: Vec<AuditLogEntry>) -> Vec<AuditLogEntry> {
        let page = entries.into_iter().skip(self.offset);
        match self.limit {
            Some(limit) => page.take(limit).collect(),
            None => page.collect(),
        }
    }
}

/// Aggregate counts over a window of entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditStats {
    /// Entries in the window.
    pub total_entries: usize,
    /// Counts per action.
    pub by_action: BTreeMap<String, usize>,
    /// Counts per acting principal.
    pub by_user: BTreeMap<String, usize>,
    /// Counts per severity.
    pub by_severity: BTreeMap<String, usize>,
    /// Entries with failure status.
    pub total_failures: usize,
    /// Entries with critical severity.
    pub total_critical: usize,
}

impl AuditStats {
    /// Folds entries into aggregate counts.
    #[must_use]
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a AuditLogEntry>) -> Self {
        entries.into_iter().fold(Self::default(), |mut stats, entry| {
            stats.total_entries += 1;
            *stats
                .by_action
                .entry(entry.action.as_str().to_owned())
                .or_default() += 1;
            *stats.by_user.entry(entry.user_id.clone()).or_default() += 1;
            *stats
                .by_severity
                .entry(entry.severity.as_str().to_owned())
                .or_default() += 1;
            if entry.status == AuditStatus::Failure {
                stats.total_failures += 1;
            }
            if entry.severity == AuditSeverity::Critical {
                stats.total_critical += 1;
            }
            stats
        })
    }
}
