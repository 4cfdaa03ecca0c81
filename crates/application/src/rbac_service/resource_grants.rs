use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde_json::json;

use warden_core::{AppError, AppResult};
use warden_domain::{AuditAction, Permission, ResourcePermission};

use crate::AuditLogInput;

use super::RbacService;

impl RbacService {
    /// Grants `permissions` on one resource, replacing any earlier grant for the pair.
    pub async fn grant_resource_permission(
        &self,
        user_id: &str,
        resource_id: &str,
        resource_type: &str,
        permissions: &[String],
        granted_by: &str,
        expires_at: Option<DateTime<Utc>>,
    ) -> AppResult<ResourcePermission> {
        if resource_id.trim().is_empty() {
            return Err(AppError::Validation(
                "resource id must not be empty".to_owned(),
            ));
        }

        let permissions: BTreeSet<Permission> =
            Permission::parse_all(permissions)?.into_iter().collect();
        let grant = ResourcePermission {
            user_id: user_id.to_owned(),
            resource_id: resource_id.to_owned(),
            resource_type: resource_type.to_owned(),
            permissions,
            granted_by: granted_by.to_owned(),
            granted_at: self.clock.now(),
            expires_at,
        };

        self.repository
            .upsert_resource_permission(grant.clone())
            .await?;
        self.audit_log
            .log(
                AuditLogInput::new(granted_by, AuditAction::PermissionsModified, resource_type)
                    .resource_id(resource_id)
                    .details(json!({
                        "operation": "grant_resource_permission",
                        "userId": user_id,
                        "permissions": grant.permissions,
                        "expiresAt": expires_at,
                    })),
            )
            .await;

        Ok(grant)
    }

    /// Removes the grant for `(resource_id, user_id)`.
    pub async fn revoke_resource_permission(
        &self,
        actor: &str,
        user_id: &str,
        resource_id: &str,
    ) -> AppResult<bool> {
        let Some(existing) = self
            .repository
            .find_resource_permission(resource_id, user_id)
            .await?
        else {
            return Ok(false);
        };

        let removed = self
            .repository
            .remove_resource_permission(resource_id, user_id)
            .await?;
        if removed {
            self.audit_log
                .log(
                    AuditLogInput::new(
                        actor,
                        AuditAction::PermissionsModified,
                        existing.resource_type.as_str(),
                    )
                    .resource_id(resource_id)
                    .details(json!({
                        "operation": "revoke_resource_permission",
                        "userId": user_id,
                    }))
                    .changes(
                        json!({ "permissions": existing.permissions }),
                        json!({ "permissions": [] }),
                    ),
                )
                .await;
        }

        Ok(removed)
    }

    /// Returns every grant on one resource, including expired ones.
    pub async fn resource_permissions(&self, resource_id: &str) -> AppResult<Vec<ResourcePermission>> {
        self.repository.list_resource_permissions(resource_id).await
    }
}
