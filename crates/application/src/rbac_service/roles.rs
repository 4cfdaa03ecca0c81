use std::collections::BTreeSet;

use serde_json::json;
use tracing::{error, info};

use warden_core::{AppError, AppResult};
use warden_domain::{AuditAction, Permission, RoleDefinition, RoleId, builtin_roles};

use crate::{AuditLogInput, RoleRegistration};

use super::RbacService;

/// Role definition supplied at the string boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleInput {
    /// Role identifier.
    pub role_id: String,
    /// Display name.
    pub display_name: String,
    /// Description.
    pub description: String,
    /// Permission tokens.
    pub permissions: Vec<String>,
    /// Ids of roles holders of this role may assign.
    pub assignable_roles: Vec<String>,
    /// Hierarchy level, 0 being most privileged.
    pub hierarchy_level: u8,
}

/// Custom role supplied at the string boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomRoleInput {
    /// Role identifier.
    pub name: String,
    /// Display name.
    pub display_name: String,
    /// Description.
    pub description: String,
    /// Permission tokens.
    pub permissions: Vec<String>,
    /// Hierarchy level, 0 being most privileged.
    pub hierarchy_level: u8,
}

impl RoleInput {
    fn into_definition(self, is_system: bool) -> AppResult<RoleDefinition> {
        let permissions: BTreeSet<Permission> =
            Permission::parse_all(&self.permissions)?.into_iter().collect();
        let assignable_roles = self
            .assignable_roles
            .into_iter()
            .map(RoleId::new)
            .collect::<AppResult<BTreeSet<_>>>()?;

        Ok(RoleDefinition {
            role_id: RoleId::new(self.role_id)?,
            display_name: self.display_name,
            description: self.description,
            permissions,
            assignable_roles,
            hierarchy_level: self.hierarchy_level,
            is_system,
        })
    }
}

impl RbacService {
    /// Registers a role; identical re-registration is accepted.
    pub async fn register_role(
        &self,
        actor: &str,
        input: RoleInput,
    ) -> AppResult<RoleRegistration> {
        let role = input.into_definition(false)?;
        self.store_role(actor, role).await
    }

    /// Creates a runtime role that may not assign other roles.
    ///
    /// Fails with `DuplicateRole` when the id is already taken.
    pub async fn create_custom_role(
        &self,
        actor: &str,
        input: CustomRoleInput,
    ) -> AppResult<RoleDefinition> {
        let role = RoleInput {
            role_id: input.name,
            display_name: input.display_name,
            description: input.description,
            permissions: input.permissions,
            assignable_roles: Vec::new(),
            hierarchy_level: input.hierarchy_level,
        }
        .into_definition(false)?;

        match self.store_role(actor, role.clone()).await? {
            RoleRegistration::Created => Ok(role),
            RoleRegistration::Unchanged => Err(AppError::DuplicateRole(format!(
                "role '{}' already exists",
                role.role_id
            ))),
        }
    }

    /// Registers the four built-in roles; safe to call on every boot.
    pub async fn seed_builtin_roles(&self) -> AppResult<()> {
        for role in builtin_roles() {
            let role_id = role.role_id.clone();
            let registration = self.repository.register_role(role).await?;
            if registration == RoleRegistration::Created {
                info!(role_id = %role_id, "seeded built-in role");
            }
        }

        Ok(())
    }

    /// Returns one role definition.
    pub async fn get_role(&self, role_id: &RoleId) -> AppResult<Option<RoleDefinition>> {
        self.repository.find_role(role_id).await
    }

    /// Returns every role ordered by hierarchy level.
    pub async fn list_roles(&self) -> AppResult<Vec<RoleDefinition>> {
        self.repository.list_roles().await
    }

    /// Returns whether any of `assigner_roles` may assign `role_id`.
    pub async fn can_assign(&self, assigner_roles: &[RoleId], role_id: &RoleId) -> bool {
        match self.repository.find_roles(assigner_roles).await {
            Ok(roles) => roles.iter().any(|role| role.can_assign(role_id)),
            Err(lookup_error) => {
                error!(role_id = %role_id, error = %lookup_error, "failed to resolve assigner roles");
                false
            }
        }
    }

    /// Returns whether the active roles of `assigner_user_id` may assign `role_id`.
    pub async fn can_user_assign(&self, assigner_user_id: &str, role_id: &RoleId) -> bool {
        let binding = match self.repository.find_binding(assigner_user_id).await {
            Ok(Some(binding)) => binding,
            Ok(None) => return false,
            Err(lookup_error) => {
                error!(
                    user_id = %assigner_user_id,
                    error = %lookup_error,
                    "failed to load assigner binding"
                );
                return false;
            }
        };

        let now = self.clock.now();
        if binding.is_expired(now) {
            return false;
        }

        let held: Vec<RoleId> = binding.active_role_ids(now).cloned().collect();
        self.can_assign(&held, role_id).await
    }

    async fn store_role(&self, actor: &str, role: RoleDefinition) -> AppResult<RoleRegistration> {
        let registration = self.repository.register_role(role.clone()).await?;

        if registration == RoleRegistration::Created {
            info!(role_id = %role.role_id, actor, "registered role");
            self.audit_log
                .log(
                    AuditLogInput::new(actor, AuditAction::RoleCreated, "role")
                        .resource_id(role.role_id.as_str())
                        .resource_name(role.display_name.as_str())
                        .details(json!({
                            "permissions": role.permissions,
                            "hierarchyLevel": role.hierarchy_level,
                        })),
                )
                .await;
        }

        Ok(registration)
    }
}
