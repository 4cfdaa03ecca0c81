use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use warden_core::{AppError, AppResult};

use crate::Permission;

/// Identifier of a role, e.g. `admin` or `content-moderator`.
///
/// Lowercase ASCII letters, digits, `-` and `_` only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoleId(String);

impl RoleId {
    /// Built-in administrator role.
    pub const ADMIN: &'static str = "admin";
    /// Built-in moderator role.
    pub const MODERATOR: &'static str = "moderator";
    /// Built-in standard user role.
    pub const USER: &'static str = "user";
    /// Built-in guest role.
    pub const GUEST: &'static str = "guest";

    /// Creates a validated role identifier.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(AppError::Validation("role id must not be empty".to_owned()));
        }

        if value.len() > 64 {
            return Err(AppError::Validation(format!(
                "role id '{value}' must not exceed 64 characters"
            )));
        }

        let valid = value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
        if !valid {
            return Err(AppError::Validation(format!(
                "role id '{value}' may only contain lowercase letters, digits, '-' and '_'"
            )));
        }

        Ok(Self(value))
    }

    /// Returns the identifier string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<String> for RoleId {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RoleId> for String {
    fn from(value: RoleId) -> Self {
        value.0
    }
}

impl Display for RoleId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Named bundle of permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDefinition {
    /// Stable role identifier.
    pub role_id: RoleId,
    /// Human-readable name.
    pub display_name: String,
    /// Free-form description.
    pub description: String,
    /// Permissions granted by the role.
    pub permissions: BTreeSet<Permission>,
    /// Roles a holder of this role may grant to others.
    pub assignable_roles: BTreeSet<RoleId>,
    /// Privilege rank, 0 is the most privileged.
    pub hierarchy_level: u8,
    /// Indicates a role seeded at startup.
    pub is_system: bool,
}

impl RoleDefinition {
    /// Returns whether the role grants `permission`.
    #[must_use]
    pub fn grants(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }

    /// Returns whether a holder of this role may assign `role_id`.
    #[must_use]
    pub fn can_assign(&self, role_id: &RoleId) -> bool {
        self.assignable_roles.contains(role_id)
    }

    /// Compares everything except the system flag.
    ///
    /// Used to accept repeated registration of an identical role.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.role_id == other.role_id
            && self.display_name == other.display_name
            && self.description == other.description
            && self.permissions == other.permissions
            && self.assignable_roles == other.assignable_roles
            && self.hierarchy_level == other.hierarchy_level
    }
}

/// Returns the roles seeded at startup.
#[must_use]
pub fn builtin_roles() -> Vec<RoleDefinition> {
    use Permission::*;

    let builtin = |id: &'static str,
                   display_name: &str,
                   description: &str,
                   permissions: &[Permission],
                   assignable: &[&'static str],
                   hierarchy_level: u8| RoleDefinition {
        role_id: RoleId(id.to_owned()),
        display_name: display_name.to_owned(),
        description: description.to_owned(),
        permissions: permissions.iter().copied().collect(),
        assignable_roles: assignable
            .iter()
            .map(|role| RoleId((*role).to_owned()))
            .collect(),
        hierarchy_level,
        is_system: true,
    };

    vec![
        builtin(
            RoleId::ADMIN,
            "Administrator",
            "Full access to every resource and security setting",
            Permission::all(),
            &[RoleId::ADMIN, RoleId::MODERATOR, RoleId::USER, RoleId::GUEST],
            0,
        ),
        builtin(
            RoleId::MODERATOR,
            "Moderator",
            "Moderates shared content and reviews user activity",
            &[
                FileRead,
                FileWrite,
                FileUpload,
                FileDelete,
                FileShare,
                PhotoTag,
                ChatSend,
                ChatModerate,
                ProfileEdit,
                SettingsManage,
                UserView,
                AdminViewAuditLogs,
            ],
            &[RoleId::USER, RoleId::GUEST],
            1,
        ),
        builtin(
            RoleId::USER,
            "User",
            "Standard account with access to personal files",
            &[
                FileRead,
                FileWrite,
                FileUpload,
                FileShare,
                PhotoTag,
                ChatSend,
                ProfileEdit,
                SettingsManage,
            ],
            &[],
            2,
        ),
        builtin(
            RoleId::GUEST,
            "Guest",
            "Read-only access to shared files",
            &[FileRead],
            &[],
            3,
        ),
    ]
}
