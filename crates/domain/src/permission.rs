use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use warden_core::AppError;

/// Permissions enforced by access checks.
///
/// The vocabulary is closed; transport values outside it are rejected when
/// parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Permission {
    /// Allows reading files.
    FileRead,
    /// Allows modifying existing files.
    FileWrite,
    /// Allows uploading new files.
    FileUpload,
    /// Allows deleting files.
    FileDelete,
    /// Allows sharing files with other principals.
    FileShare,
    /// Allows tagging people in photos.
    PhotoTag,
    /// Allows sending chat messages.
    ChatSend,
    /// Allows moderating chat rooms.
    ChatModerate,
    /// Allows editing the caller's own profile.
    ProfileEdit,
    /// Allows changing personal settings.
    SettingsManage,
    /// Allows viewing other user accounts.
    UserView,
    /// Allows creating, suspending and deleting users.
    AdminManageUsers,
    /// Allows defining roles and assigning them.
    AdminManageRoles,
    /// Allows reading the audit trail.
    AdminViewAuditLogs,
    /// Allows changing system-wide settings.
    AdminSystemSettings,
    /// Marks the holder as required to enroll a second factor.
    SecurityMfaEnforce,
    /// Allows rotating signing and encryption keys.
    SecurityManageKeys,
}

impl Permission {
    /// Returns a stable storage value for this permission.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileRead => "file.read",
            Self::FileWrite => "file.write",
            Self::FileUpload => "file.upload",
            Self::FileDelete => "file.delete",
            Self::FileShare => "file.share",
            Self::PhotoTag => "photo.tag",
            Self::ChatSend => "chat.send",
            Self::ChatModerate => "chat.moderate",
            Self::ProfileEdit => "profile.edit",
            Self::SettingsManage => "settings.manage",
            Self::UserView => "user.view",
            Self::AdminManageUsers => "admin.manage_users",
            Self::AdminManageRoles => "admin.manage_roles",
            Self::AdminViewAuditLogs => "admin.view_audit_logs",
            Self::AdminSystemSettings => "admin.system_settings",
            Self::SecurityMfaEnforce => "security.mfa_enforce",
            Self::SecurityManageKeys => "security.manage_keys",
        }
    }

    /// Returns all known permissions.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[Permission] = &[
            Permission::FileRead,
            Permission::FileWrite,
            Permission::FileUpload,
            Permission::FileDelete,
            Permission::FileShare,
            Permission::PhotoTag,
            Permission::ChatSend,
            Permission::ChatModerate,
            Permission::ProfileEdit,
            Permission::SettingsManage,
            Permission::UserView,
            Permission::AdminManageUsers,
            Permission::AdminManageRoles,
            Permission::AdminViewAuditLogs,
            Permission::AdminSystemSettings,
            Permission::SecurityMfaEnforce,
            Permission::SecurityManageKeys,
        ];

        ALL
    }

    /// Parses a transport value into a permission.
    pub fn from_transport(value: &str) -> Result<Self, AppError> {
        Self::from_str(value)
    }

    /// Parses a batch of transport values, failing on the first unknown token.
    pub fn parse_all<I, S>(values: I) -> Result<Vec<Self>, AppError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        values
            .into_iter()
            .map(|value| Self::from_str(value.as_ref()))
            .collect()
    }
}

impl FromStr for Permission {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|permission| permission.as_str() == value)
            .ok_or_else(|| AppError::InvalidPermission(format!("unknown permission '{value}'")))
    }
}

impl TryFrom<String> for Permission {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str(value.as_str())
    }
}

impl From<Permission> for String {
    fn from(value: Permission) -> Self {
        value.as_str().to_owned()
    }
}

impl Display for Permission {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}
