use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use warden_application::{PermissionRequestFilter, RbacRepository, RoleRegistration};
use warden_core::{AppError, AppResult};
use warden_domain::{
    BindingMutation, PermissionRequest, PermissionRequestStatus, ResourcePermission,
    RoleDefinition, RoleId, UserRoleBinding,
};

/// In-process role graph and binding store.
///
/// Each collection sits behind its own reader-writer lock; binding
/// mutations run entirely under the bindings write lock.
#[derive(Debug, Default)]
pub struct InMemoryRbacRepository {
    roles: RwLock<HashMap<RoleId, RoleDefinition>>,
    bindings: RwLock<HashMap<String, UserRoleBinding>>,
    resource_grants: RwLock<HashMap<String, HashMap<String, ResourcePermission>>>,
    requests: RwLock<HashMap<Uuid, PermissionRequest>>,
}

impl InMemoryRbacRepository {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RbacRepository for InMemoryRbacRepository {
    async fn register_role(&self, role: RoleDefinition) -> AppResult<RoleRegistration> {
        let mut roles = self.roles.write().await;
        match roles.get(&role.role_id) {
            Some(existing) if existing.same_content(&role) => Ok(RoleRegistration::Unchanged),
            Some(_) => Err(AppError::DuplicateRole(format!(
                "role '{}' already exists with different content",
                role.role_id
            ))),
            None => {
                roles.insert(role.role_id.clone(), role);
                Ok(RoleRegistration::Created)
            }
        }
    }

    async fn find_role(&self, role_id: &RoleId) -> AppResult<Option<RoleDefinition>> {
        Ok(self.roles.read().await.get(role_id).cloned())
    }

    async fn find_roles(&self, role_ids: &[RoleId]) -> AppResult<Vec<RoleDefinition>> {
        let roles = self.roles.read().await;
        Ok(role_ids
            .iter()
            .filter_map(|role_id| roles.get(role_id).cloned())
            .collect())
    }

    async fn list_roles(&self) -> AppResult<Vec<RoleDefinition>> {
        let mut roles: Vec<RoleDefinition> = self.roles.read().await.values().cloned().collect();
        roles.sort_by(|left, right| {
            left.hierarchy_level
                .cmp(&right.hierarchy_level)
                .then_with(|| left.role_id.cmp(&right.role_id))
        });
        Ok(roles)
    }

    async fn find_binding(&self, user_id: &str) -> AppResult<Option<UserRoleBinding>> {
        Ok(self.bindings.read().await.get(user_id).cloned())
    }

    async fn mutate_binding(
        &self,
        user_id: &str,
        actor: &str,
        mutation: BindingMutation,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut bindings = self.bindings.write().await;

        if let Some(binding) = bindings.get_mut(user_id) {
            return Ok(binding.apply(mutation, now));
        }
        if !mutation.creates_binding() {
            return Ok(false);
        }

        let mut binding = UserRoleBinding::new(user_id, actor, now);
        let changed = binding.apply(mutation, now);
        bindings.insert(user_id.to_owned(), binding);
        Ok(changed)
    }

    async fn upsert_resource_permission(&self, grant: ResourcePermission) -> AppResult<()> {
        self.resource_grants
            .write()
            .await
            .entry(grant.resource_id.clone())
            .or_default()
            .insert(grant.user_id.clone(), grant);
        Ok(())
    }

    async fn find_resource_permission(
        &self,
        resource_id: &str,
        user_id: &str,
    ) -> AppResult<Option<ResourcePermission>> {
        Ok(self
            .resource_grants
            .read()
            .await
            .get(resource_id)
            .and_then(|grants| grants.get(user_id))
            .cloned())
    }

    async fn list_resource_permissions(
        &self,
        resource_id: &str,
    ) -> AppResult<Vec<ResourcePermission>> {
        let mut grants: Vec<ResourcePermission> = self
            .resource_grants
            .read()
            .await
            .get(resource_id)
            .map(|grants| grants.values().cloned().collect())
            .unwrap_or_default();
        grants.sort_by(|left, right| left.user_id.cmp(&right.user_id));
        Ok(grants)
    }

    async fn remove_resource_permission(
        &self,
        resource_id: &str,
        user_id: &str,
    ) -> AppResult<bool> {
        let mut resource_grants = self.resource_grants.write().await;
        let Some(grants) = resource_grants.get_mut(resource_id) else {
            return Ok(false);
        };

        let removed = grants.remove(user_id).is_some();
        if grants.is_empty() {
            resource_grants.remove(resource_id);
        }
        Ok(removed)
    }

    async fn insert_permission_request(&self, request: PermissionRequest) -> AppResult<()> {
        let mut requests = self.requests.write().await;
        if requests.contains_key(&request.request_id) {
            return Err(AppError::Conflict(format!(
                "permission request '{}' already exists",
                request.request_id
            )));
        }

        requests.insert(request.request_id, request);
        Ok(())
    }

    async fn find_permission_request(
        &self,
        request_id: Uuid,
    ) -> AppResult<Option<PermissionRequest>> {
        Ok(self.requests.read().await.get(&request_id).cloned())
    }

    async fn decide_permission_request(
        &self,
        request_id: Uuid,
        status: PermissionRequestStatus,
        decided_by: &str,
        decided_at: DateTime<Utc>,
    ) -> AppResult<PermissionRequest> {
        let mut requests = self.requests.write().await;
        let request = requests.get_mut(&request_id).ok_or_else(|| {
            AppError::NotFound(format!("permission request '{request_id}' does not exist"))
        })?;

        if request.status != PermissionRequestStatus::Pending {
            return Err(AppError::Conflict(format!(
                "permission request '{request_id}' is already {}",
                request.status.as_str()
            )));
        }

        request.status = status;
        request.approved_by = Some(decided_by.to_owned());
        request.approved_at = Some(decided_at);
        Ok(request.clone())
    }

    async fn list_permission_requests(
        &self,
        filter: &PermissionRequestFilter,
    ) -> AppResult<Vec<PermissionRequest>> {
        let mut requests: Vec<PermissionRequest> = self
            .requests
            .read()
            .await
            .values()
            .filter(|request| {
                filter
                    .user_id
                    .as_deref()
                    .is_none_or(|user_id| request.user_id == user_id)
                    && filter.status.is_none_or(|status| request.status == status)
            })
            .cloned()
            .collect();
        requests.sort_by(|left, right| {
            left.requested_at
                .cmp(&right.requested_at)
                .then_with(|| left.request_id.cmp(&right.request_id))
        });
        Ok(requests)
    }
}

#[cfg(test)]
mod tests;
