use chrono::{DateTime, Utc};
use tracing::info;

use warden_core::{AppError, AppResult};
use warden_domain::{AuditAction, BindingMutation, Permission, RoleGrant, RoleId, UserRoleBinding};

use super::RbacService;

impl RbacService {
    /// Adds `role_id` to the principal's binding, creating it when missing.
    ///
    /// `expires_at` becomes the binding expiry: once it passes, custom grants
    /// lapse with the role.
    ///
    /// Returns `false` when the role is already actively held. Entitlement of
    /// `assigned_by` is not checked here; see [`RbacService::can_user_assign`].
    pub async fn assign_role(
        &self,
        user_id: &str,
        role_id: &RoleId,
        assigned_by: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> AppResult<bool> {
        if self.repository.find_role(role_id).await?.is_none() {
            return Err(AppError::NotFound(format!("role '{role_id}' does not exist")));
        }

        let grant = RoleGrant {
            role_id: role_id.clone(),
            assigned_at: self.clock.now(),
            assigned_by: assigned_by.to_owned(),
            expires_at,
        };
        let changed = self
            .mutate_and_audit(
                assigned_by,
                user_id,
                BindingMutation::AssignRole(grant),
                AuditAction::RoleAssigned,
            )
            .await?;

        if changed {
            info!(user_id, role_id = %role_id, assigned_by, "assigned role");
        }
        Ok(changed)
    }

    /// Removes `role_id` from the principal's binding.
    pub async fn remove_role(&self, actor: &str, user_id: &str, role_id: &RoleId) -> AppResult<bool> {
        let changed = self
            .mutate_and_audit(
                actor,
                user_id,
                BindingMutation::RemoveRole(role_id.clone()),
                AuditAction::RoleRemoved,
            )
            .await?;

        if changed {
            info!(user_id, role_id = %role_id, actor, "removed role");
        }
        Ok(changed)
    }

    /// Adds or refreshes a custom grant.
    pub async fn grant_permission(
        &self,
        actor: &str,
        user_id: &str,
        permission: Permission,
        expires_at: Option<DateTime<Utc>>,
    ) -> AppResult<bool> {
        self.mutate_and_audit(
            actor,
            user_id,
            BindingMutation::GrantPermission {
                permission,
                expires_at,
            },
            AuditAction::PermissionsModified,
        )
        .await
    }

    /// Drops a custom grant.
    pub async fn revoke_permission(
        &self,
        actor: &str,
        user_id: &str,
        permission: Permission,
    ) -> AppResult<bool> {
        self.mutate_and_audit(
            actor,
            user_id,
            BindingMutation::RevokePermission(permission),
            AuditAction::PermissionsModified,
        )
        .await
    }

    /// Adds or refreshes a denial, which overrides every grant source.
    pub async fn deny_permission(
        &self,
        actor: &str,
        user_id: &str,
        permission: Permission,
        expires_at: Option<DateTime<Utc>>,
    ) -> AppResult<bool> {
        self.mutate_and_audit(
            actor,
            user_id,
            BindingMutation::DenyPermission {
                permission,
                expires_at,
            },
            AuditAction::PermissionsModified,
        )
        .await
    }

    /// Drops a denial.
    pub async fn remove_denial(
        &self,
        actor: &str,
        user_id: &str,
        permission: Permission,
    ) -> AppResult<bool> {
        self.mutate_and_audit(
            actor,
            user_id,
            BindingMutation::RemoveDenial(permission),
            AuditAction::PermissionsModified,
        )
        .await
    }

    /// Sets or clears the binding-wide expiry.
    pub async fn set_binding_expiry(
        &self,
        actor: &str,
        user_id: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> AppResult<bool> {
        self.mutate_and_audit(
            actor,
            user_id,
            BindingMutation::SetExpiry(expires_at),
            AuditAction::PermissionsModified,
        )
        .await
    }

    /// Returns the stored binding, if the principal was ever granted anything.
    pub async fn get_user_binding(&self, user_id: &str) -> AppResult<Option<UserRoleBinding>> {
        self.repository.find_binding(user_id).await
    }
}
