//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod access;
mod audit;
mod mfa;
mod permission;
mod role;

pub use access::{
    BindingMutation, DenialReason, GrantSource, PermissionDecision, PermissionRequest, PermissionRequestStatus,
    ResourcePermission, RoleGrant, UserRoleBinding, resolve_permission,
};
pub use audit::{
    AuditAction, AuditChanges, AuditLogEntry, AuditLogQuery, AuditSeverity, AuditStats,
    AuditStatus,
};
pub use mfa::{
    BACKUP_CODE_ALPHABET, BACKUP_CODE_COUNT, BACKUP_CODE_LENGTH, DeviceTrust, MfaConfig,
    MfaMethod, MfaState, MfaVerification, TOTP_DIGITS, TOTP_SECRET_BYTES, TOTP_SKEW_STEPS,
    TOTP_STEP_SECONDS, normalize_backup_code,
};
pub use permission::Permission;
pub use role::{RoleDefinition, RoleId, builtin_roles};
