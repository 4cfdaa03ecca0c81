use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use warden_core::AppResult;
use warden_domain::{
    BindingMutation, PermissionRequest, PermissionRequestStatus, ResourcePermission,
    RoleDefinition, RoleId, UserRoleBinding,
};

/// Outcome of registering a role definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleRegistration {
    /// The role was stored.
    Created,
    /// An identical definition already existed.
    Unchanged,
}

/// Filter for listing permission requests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionRequestFilter {
    /// Requesting principal.
    pub user_id: Option<String>,
    /// Lifecycle state.
    pub status: Option<PermissionRequestStatus>,
}

/// Repository port for roles, bindings, resource grants and permission requests.
///
/// Every mutation is atomic per principal: concurrent mutations of the same
/// binding must never lose an update.
#[async_trait]
pub trait RbacRepository: Send + Sync {
    /// Stores a role definition.
    ///
    /// Re-registering identical content is [`RoleRegistration::Unchanged`];
    /// different content under an existing id fails with `DuplicateRole`.
    async fn register_role(&self, role: RoleDefinition) -> AppResult<RoleRegistration>;

    /// Returns one role definition.
    async fn find_role(&self, role_id: &RoleId) -> AppResult<Option<RoleDefinition>>;

    /// Returns the definitions of the listed roles that exist.
    async fn find_roles(&self, role_ids: &[RoleId]) -> AppResult<Vec<RoleDefinition>>;

    /// Returns every role ordered by hierarchy level, then id.
    async fn list_roles(&self) -> AppResult<Vec<RoleDefinition>>;

    /// Returns the binding of one principal.
    async fn find_binding(&self, user_id: &str) -> AppResult<Option<UserRoleBinding>>;

    /// Applies one mutation to a principal's binding and returns whether it changed.
    ///
    /// A missing binding is created first when the mutation adds state;
    /// removals against a missing binding report `false`.
    async fn mutate_binding(
        &self,
        user_id: &str,
        actor: &str,
        mutation: BindingMutation,
        now: DateTime<Utc>,
    ) -> AppResult<bool>;

    /// Inserts or replaces the grant for `(resource_id, user_id)`.
    async fn upsert_resource_permission(&self, grant: ResourcePermission) -> AppResult<()>;

    /// Returns the grant for `(resource_id, user_id)`.
    async fn find_resource_permission(
        &self,
        resource_id: &str,
        user_id: &str,
    ) -> AppResult<Option<ResourcePermission>>;

    /// Returns every grant on one resource.
    async fn list_resource_permissions(
        &self,
        resource_id: &str,
    ) -> AppResult<Vec<ResourcePermission>>;

    /// Deletes the grant for `(resource_id, user_id)` and returns whether one existed.
    async fn remove_resource_permission(&self, resource_id: &str, user_id: &str)
    -> AppResult<bool>;

    /// Stores a new permission request.
    async fn insert_permission_request(&self, request: PermissionRequest) -> AppResult<()>;

    /// Finds one request by id.
    async fn find_permission_request(&self, request_id: Uuid)
    -> AppResult<Option<PermissionRequest>>;

    /// Moves a pending request to a terminal state.
    ///
    /// Fails with `NotFound` for unknown ids and `Conflict` when the request
    /// was already decided.
    async fn decide_permission_request(
        &self,
        request_id: Uuid,
        status: PermissionRequestStatus,
        decided_by: &str,
        decided_at: DateTime<Utc>,
    ) -> AppResult<PermissionRequest>;

    /// Lists requests matching the filter, oldest first.
    async fn list_permission_requests(
        &self,
        filter: &PermissionRequestFilter,
    ) -> AppResult<Vec<PermissionRequest>>;
}
