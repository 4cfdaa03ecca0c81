use serde_json::json;
use tracing::info;
use uuid::Uuid;

use warden_core::{AppError, AppResult};
use warden_domain::{
    AuditAction, BindingMutation, Permission, PermissionRequest, PermissionRequestStatus,
};

use crate::{AuditLogInput, PermissionRequestFilter};

use super::RbacService;

impl RbacService {
    /// Files a pending request for `permission`, optionally about one resource.
    pub async fn request_permission(
        &self,
        user_id: &str,
        permission: Permission,
        resource_type: Option<&str>,
        resource_id: Option<&str>,
        reason: &str,
    ) -> AppResult<PermissionRequest> {
        let request = PermissionRequest {
            request_id: Uuid::new_v4(),
            user_id: user_id.to_owned(),
            permission,
            resource_type: resource_type.map(str::to_owned),
            resource_id: resource_id.map(str::to_owned),
            reason: reason.to_owned(),
            status: PermissionRequestStatus::Pending,
            requested_at: self.clock.now(),
            approved_by: None,
            approved_at: None,
        };

        self.repository
            .insert_permission_request(request.clone())
            .await?;
        self.audit_log
            .log(
                AuditLogInput::new(user_id, AuditAction::PermissionRequested, "permission_request")
                    .resource_id(request.request_id.to_string())
                    .details(json!({
                        "permission": permission.as_str(),
                        "resourceType": resource_type,
                        "resourceId": resource_id,
                        "reason": reason,
                    })),
            )
            .await;

        Ok(request)
    }

    /// Approves a pending request and grants its permission as a custom grant.
    ///
    /// The grant is written first; a request stays pending when it fails.
    pub async fn approve_permission_request(
        &self,
        request_id: Uuid,
        approver: &str,
    ) -> AppResult<PermissionRequest> {
        let pending = self
            .repository
            .find_permission_request(request_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("permission request '{request_id}' does not exist"))
            })?;
        if pending.status != PermissionRequestStatus::Pending {
            return Err(AppError::Conflict(format!(
                "permission request '{request_id}' is already {}",
                pending.status.as_str()
            )));
        }

        self.mutate_and_audit(
            approver,
            &pending.user_id,
            BindingMutation::GrantPermission {
                permission: pending.permission,
                expires_at: None,
            },
            AuditAction::PermissionsModified,
        )
        .await?;

        let request = self
            .repository
            .decide_permission_request(
                request_id,
                PermissionRequestStatus::Approved,
                approver,
                self.clock.now(),
            )
            .await?;
        info!(
            request_id = %request_id,
            user_id = %request.user_id,
            permission = request.permission.as_str(),
            approver,
            "approved permission request"
        );

        Ok(request)
    }

    /// Rejects a pending request.
    pub async fn deny_permission_request(
        &self,
        request_id: Uuid,
        approver: &str,
    ) -> AppResult<PermissionRequest> {
        let request = self
            .repository
            .decide_permission_request(
                request_id,
                PermissionRequestStatus::Denied,
                approver,
                self.clock.now(),
            )
            .await?;

        self.audit_log
            .log(
                AuditLogInput::new(approver, AuditAction::PermissionsModified, "permission_request")
                    .resource_id(request_id.to_string())
                    .details(json!({
                        "operation": "deny_permission_request",
                        "userId": request.user_id,
                        "permission": request.permission.as_str(),
                    })),
            )
            .await;

        Ok(request)
    }

    /// Returns every request still awaiting a decision, oldest first.
    pub async fn pending_permission_requests(&self) -> AppResult<Vec<PermissionRequest>> {
        self.repository
            .list_permission_requests(&PermissionRequestFilter {
                user_id: None,
                status: Some(PermissionRequestStatus::Pending),
            })
            .await
    }

    /// Returns every request filed by one principal, oldest first.
    pub async fn permission_requests_for_user(
        &self,
        user_id: &str,
    ) -> AppResult<Vec<PermissionRequest>> {
        self.repository
            .list_permission_requests(&PermissionRequestFilter {
                user_id: Some(user_id.to_owned()),
                status: None,
            })
            .await
    }
}
