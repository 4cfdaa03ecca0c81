use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;

use serde_json::json;
use tracing::{error, warn};

use warden_core::{AppError, AppResult, RequestContext};
use warden_domain::{
    AuditAction, AuditStatus, DenialReason, Permission, PermissionDecision, resolve_permission,
};

use crate::AuditLogInput;

use super::RbacService;

/// Resource a permission check is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceRef<'a> {
    /// Resource type label, e.g. `file`.
    pub resource_type: &'a str,
    /// Resource identifier.
    pub resource_id: &'a str,
}

impl RbacService {
    /// Resolves one permission check and reports which source decided it.
    pub async fn check_permission(
        &self,
        user_id: &str,
        permission: Permission,
        resource_id: Option<&str>,
    ) -> AppResult<PermissionDecision> {
        let now = self.clock.now();
        let binding = self.repository.find_binding(user_id).await?;
        let roles = match &binding {
            Some(binding) => self.role_catalog_for(binding).await?,
            None => HashMap::new(),
        };
        let resource_grant = match resource_id {
            Some(resource_id) => {
                self.repository
                    .find_resource_permission(resource_id, user_id)
                    .await?
            }
            None => None,
        };

        Ok(resolve_permission(
            binding.as_ref(),
            &roles,
            resource_grant.as_ref(),
            permission,
            now,
        ))
    }

    /// Returns whether `user_id` holds `permission`, optionally on one resource.
    ///
    /// Never fails; lookup errors resolve to `false`.
    pub async fn has_permission(
        &self,
        user_id: &str,
        permission: Permission,
        resource_id: Option<&str>,
    ) -> bool {
        match self.check_permission(user_id, permission, resource_id).await {
            Ok(decision) => decision.is_granted(),
            Err(check_error) => {
                error!(
                    user_id,
                    permission = permission.as_str(),
                    error = %check_error,
                    "permission check failed; denying"
                );
                false
            }
        }
    }

    /// Like [`RbacService::has_permission`] for a raw token; unknown tokens are denied.
    pub async fn has_permission_token(
        &self,
        user_id: &str,
        token: &str,
        resource_id: Option<&str>,
    ) -> bool {
        match Permission::from_str(token) {
            Ok(permission) => self.has_permission(user_id, permission, resource_id).await,
            Err(_) => false,
        }
    }

    /// Returns role plus custom permissions minus denials.
    ///
    /// Never fails; lookup errors resolve to the empty set.
    pub async fn effective_permissions(&self, user_id: &str) -> BTreeSet<Permission> {
        match self.load_effective_permissions(user_id).await {
            Ok(permissions) => permissions,
            Err(load_error) => {
                error!(user_id, error = %load_error, "failed to compute effective permissions");
                BTreeSet::new()
            }
        }
    }

    /// Fails with `Forbidden` unless the check passes, auditing the denial.
    pub async fn require_permission(
        &self,
        user_id: &str,
        permission: Permission,
        resource: Option<ResourceRef<'_>>,
        context: &RequestContext,
    ) -> AppResult<()> {
        let resource_id = resource.map(|resource| resource.resource_id);
        let reason = match self.check_permission(user_id, permission, resource_id).await {
            Ok(PermissionDecision::Granted(_)) => return Ok(()),
            Ok(PermissionDecision::Denied(reason)) => reason,
            Err(check_error) => {
                error!(
                    user_id,
                    permission = permission.as_str(),
                    error = %check_error,
                    "permission check failed; denying"
                );
                DenialReason::NotGranted
            }
        };

        metrics::counter!("rbac_access_denied_total").increment(1);
        warn!(
            user_id,
            permission = permission.as_str(),
            resource_id = resource_id.unwrap_or_default(),
            reason = reason.as_str(),
            "access denied"
        );

        let mut input = AuditLogInput::new(
            user_id,
            AuditAction::AccessDenied,
            resource.map_or("permission", |resource| resource.resource_type),
        )
        .status(AuditStatus::Failure)
        .details(json!({
            "permission": permission.as_str(),
            "reason": reason.as_str(),
        }))
        .context(context.clone());
        if let Some(resource_id) = resource_id {
            input = input.resource_id(resource_id);
        }
        self.audit_log.log(input).await;

        Err(AppError::Forbidden("not authorized".to_owned()))
    }

    async fn load_effective_permissions(&self, user_id: &str) -> AppResult<BTreeSet<Permission>> {
        let Some(binding) = self.repository.find_binding(user_id).await? else {
            return Ok(BTreeSet::new());
        };
        let roles = self.role_catalog_for(&binding).await?;

        Ok(binding.effective_permissions(&roles, self.clock.now()))
    }
}
