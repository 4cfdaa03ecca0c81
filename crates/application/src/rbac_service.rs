//! Role-based access control: role registry, bindings, resource grants,
//! permission requests and permission resolution.
//!
//! Authorization queries are total: port failures are logged and resolve to
//! "no access". Every mutation takes an actor and is written to the audit log.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;

use warden_core::{AppResult, Clock};
use warden_domain::{AuditAction, BindingMutation, RoleDefinition, RoleId, UserRoleBinding};

use crate::{AuditLogInput, AuditLogService, RbacRepository};

/// Application service for authorization decisions and the role graph.
#[derive(Clone)]
pub struct RbacService {
    repository: Arc<dyn RbacRepository>,
    audit_log: AuditLogService,
    clock: Arc<dyn Clock>,
}

impl RbacService {
    /// Creates a service from its ports.
    #[must_use]
    pub fn new(
        repository: Arc<dyn RbacRepository>,
        audit_log: AuditLogService,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            audit_log,
            clock,
        }
    }

    /// Returns the definitions of the roles held by `binding`, keyed by id.
    async fn role_catalog_for(
        &self,
        binding: &UserRoleBinding,
    ) -> AppResult<HashMap<RoleId, RoleDefinition>> {
        let role_ids: Vec<RoleId> = binding.roles.keys().cloned().collect();
        if role_ids.is_empty() {
            return Ok(HashMap::new());
        }

        Ok(self
            .repository
            .find_roles(&role_ids)
            .await?
            .into_iter()
            .map(|role| (role.role_id.clone(), role))
            .collect())
    }

    /// Applies a binding mutation and audits it when something changed.
    async fn mutate_and_audit(
        &self,
        actor: &str,
        user_id: &str,
        mutation: BindingMutation,
        action: AuditAction,
    ) -> AppResult<bool> {
        let details = mutation_details(&mutation);
        let changed = self
            .repository
            .mutate_binding(user_id, actor, mutation, self.clock.now())
            .await?;

        if changed {
            self.audit_log
                .log(
                    AuditLogInput::new(actor, action, "user")
                        .resource_id(user_id)
                        .details(details),
                )
                .await;
        }

        Ok(changed)
    }
}

fn mutation_details(mutation: &BindingMutation) -> serde_json::Value {
    match mutation {
        BindingMutation::AssignRole(grant) => json!({
            "operation": "assign_role",
            "role": grant.role_id.as_str(),
            "expiresAt": grant.expires_at,
        }),
        BindingMutation::RemoveRole(role_id) => json!({
            "operation": "remove_role",
            "role": role_id.as_str(),
        }),
        BindingMutation::GrantPermission {
            permission,
            expires_at,
        } => json!({
            "operation": "grant_permission",
            "permission": permission.as_str(),
            "expiresAt": expires_at,
        }),
        BindingMutation::RevokePermission(permission) => json!({
            "operation": "revoke_permission",
            "permission": permission.as_str(),
        }),
        BindingMutation::DenyPermission {
            permission,
            expires_at,
        } => json!({
            "operation": "deny_permission",
            "permission": permission.as_str(),
            "expiresAt": expires_at,
        }),
        BindingMutation::RemoveDenial(permission) => json!({
            "operation": "remove_denial",
            "permission": permission.as_str(),
        }),
        BindingMutation::SetExpiry(expires_at) => json!({
            "operation": "set_binding_expiry",
            "expiresAt": expires_at,
        }),
    }
}

mod grants;
mod requests;
mod resolution;
mod resource_grants;
mod roles;

pub use resolution::ResourceRef;
pub use roles::{CustomRoleInput, RoleInput};
