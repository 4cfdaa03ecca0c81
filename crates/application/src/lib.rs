//! Application services and ports.

#![forbid(unsafe_code)]

mod audit_log_service;
mod audit_ports;
mod mfa_service;
mod rbac_ports;
mod rbac_service;

pub use audit_log_service::{AuditLogService, ExportFormat};
pub use audit_ports::{AuditFailureSink, AuditLogInput, AuditLogRepository};
pub use mfa_service::{
    MfaRepository, MfaService, MfaSettings, MfaStatus, SecretEncryptor, TotpProvider, TotpSetup,
    derive_device_id,
};
pub use rbac_ports::{PermissionRequestFilter, RbacRepository, RoleRegistration};
pub use rbac_service::{CustomRoleInput, RbacService, ResourceRef, RoleInput};
