//! Authorization state for principals and the permission resolution rules.
//!
//! Resolution order for one permission check:
//! 1. an expired binding grants nothing;
//! 2. an active denial always wins;
//! 3. an active custom grant allows;
//! 4. an active role grant whose role carries the permission allows;
//! 5. an active resource-scoped grant for the requested resource allows;
//! 6. anything else is denied.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Permission, RoleDefinition, RoleId};

fn is_active(expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    expires_at.is_none_or(|expires_at| expires_at > now)
}

/// One role held by a principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrant {
    /// Granted role.
    pub role_id: RoleId,
    /// Grant timestamp.
    pub assigned_at: DateTime<Utc>,
    /// Principal that granted the role.
    pub assigned_by: String,
    /// Optional grant expiry.
    pub expires_at: Option<DateTime<Utc>>,
}

impl RoleGrant {
    /// Returns whether the grant is still in force at `now`.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        is_active(self.expires_at, now)
    }
}

/// Authorization state for one principal.
///
/// Created lazily on the first mutation and never physically deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRoleBinding {
    /// Principal identifier.
    pub user_id: String,
    /// Roles held, keyed by role id.
    pub roles: BTreeMap<RoleId, RoleGrant>,
    /// Additive grants with optional expiry.
    pub custom_permissions: BTreeMap<Permission, Option<DateTime<Utc>>>,
    /// Subtractive grants with optional expiry; these override every other source.
    pub denied_permissions: BTreeMap<Permission, Option<DateTime<Utc>>>,
    /// Timestamp of the last role assignment.
    pub assigned_at: DateTime<Utc>,
    /// Principal behind the last role assignment.
    pub assigned_by: String,
    /// Binding-wide expiry, set by the last role assignment or explicitly;
    /// once passed the binding grants nothing.
    pub expires_at: Option<DateTime<Utc>>,
}

impl UserRoleBinding {
    /// Creates an empty binding.
    #[must_use]
    pub fn new(user_id: impl Into<String>, created_by: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            roles: BTreeMap::new(),
            custom_permissions: BTreeMap::new(),
            denied_permissions: BTreeMap::new(),
            assigned_at: now,
            assigned_by: created_by.into(),
            expires_at: None,
        }
    }

    /// Returns whether the binding-wide expiry has passed.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        !is_active(self.expires_at, now)
    }

    /// Returns whether `permission` is actively denied.
    #[must_use]
    pub fn denies(&self, permission: Permission, now: DateTime<Utc>) -> bool {
        self.denied_permissions
            .get(&permission)
            .is_some_and(|expires_at| is_active(*expires_at, now))
    }

    /// Returns whether `permission` is actively granted as a custom permission.
    #[must_use]
    pub fn grants_custom(&self, permission: Permission, now: DateTime<Utc>) -> bool {
        self.custom_permissions
            .get(&permission)
            .is_some_and(|expires_at| is_active(*expires_at, now))
    }

    /// Returns the ids of roles whose grant is still active.
    pub fn active_role_ids(&self, now: DateTime<Utc>) -> impl Iterator<Item = &RoleId> {
        self.roles
            .values()
            .filter(move |grant| grant.is_active(now))
            .map(|grant| &grant.role_id)
    }

    /// Computes the effective global permissions.
    ///
    /// Union of active role permissions and active custom grants, minus
    /// active denials. Resource-scoped grants are not included.
    #[must_use]
    pub fn effective_permissions(
        &self,
        roles: &HashMap<RoleId, RoleDefinition>,
        now: DateTime<Utc>,
    ) -> BTreeSet<Permission> {
        if self.is_expired(now) {
            return BTreeSet::new();
        }

        let mut permissions: BTreeSet<Permission> = self
            .active_role_ids(now)
            .filter_map(|role_id| roles.get(role_id))
            .flat_map(|role| role.permissions.iter().copied())
            .collect();

        permissions.extend(
            self.custom_permissions
                .iter()
                .filter(|(_, expires_at)| is_active(**expires_at, now))
                .map(|(permission, _)| *permission),
        );

        permissions.retain(|permission| !self.denies(*permission, now));
        permissions
    }
}

/// Single atomic change to a principal's binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingMutation {
    /// Adds a role grant and takes its expiry as the binding expiry; an active
    /// grant of the same role is left untouched.
    AssignRole(RoleGrant),
    /// Drops a role grant.
    RemoveRole(RoleId),
    /// Adds or refreshes a custom grant.
    GrantPermission {
        /// Granted permission.
        permission: Permission,
        /// Optional grant expiry.
        expires_at: Option<DateTime<Utc>>,
    },
    /// Drops a custom grant.
    RevokePermission(Permission),
    /// Adds or refreshes a denial.
    DenyPermission {
        /// Denied permission.
        permission: Permission,
        /// Optional denial expiry.
        expires_at: Option<DateTime<Utc>>,
    },
    /// Drops a denial.
    RemoveDenial(Permission),
    /// Sets or clears the binding-wide expiry.
    SetExpiry(Option<DateTime<Utc>>),
}

impl BindingMutation {
    /// Returns whether applying the mutation to a missing binding should create one.
    #[must_use]
    pub fn creates_binding(&self) -> bool {
        matches!(
            self,
            Self::AssignRole(_)
                | Self::GrantPermission { .. }
                | Self::DenyPermission { .. }
                | Self::SetExpiry(Some(_))
        )
    }
}

impl UserRoleBinding {
    /// Applies `mutation` and returns whether the binding changed.
    pub fn apply(&mut self, mutation: BindingMutation, now: DateTime<Utc>) -> bool {
        match mutation {
            BindingMutation::AssignRole(grant) => {
                if self
                    .roles
                    .get(&grant.role_id)
                    .is_some_and(|existing| existing.is_active(now))
                {
                    return false;
                }
                self.assigned_at = grant.assigned_at;
                self.assigned_by.clone_from(&grant.assigned_by);
                self.expires_at = grant.expires_at;
                self.roles.insert(grant.role_id.clone(), grant);
                true
            }
            BindingMutation::RemoveRole(role_id) => self.roles.remove(&role_id).is_some(),
            BindingMutation::GrantPermission {
                permission,
                expires_at,
            } => self.custom_permissions.insert(permission, expires_at) != Some(expires_at),
            BindingMutation::RevokePermission(permission) => {
                self.custom_permissions.remove(&permission).is_some()
            }
            BindingMutation::DenyPermission {
                permission,
                expires_at,
            } => self.denied_permissions.insert(permission, expires_at) != Some(expires_at),
            BindingMutation::RemoveDenial(permission) => {
                self.denied_permissions.remove(&permission).is_some()
            }
            BindingMutation::SetExpiry(expires_at) => {
                let changed = self.expires_at != expires_at;
                self.expires_at = expires_at;
                changed
            }
        }
    }
}

/// Permission grant scoped to one resource for one principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePermission {
    /// Principal identifier.
    pub user_id: String,
    /// Resource identifier.
    pub resource_id: String,
    /// Resource type label, e.g. `file`.
    pub resource_type: String,
    /// Permissions granted on the resource.
    pub permissions: BTreeSet<Permission>,
    /// Principal that granted access.
    pub granted_by: String,
    /// Grant timestamp.
    pub granted_at: DateTime<Utc>,
    /// Optional grant expiry.
    pub expires_at: Option<DateTime<Utc>>,
}

impl ResourcePermission {
    /// Returns whether the grant is active and carries `permission`.
    #[must_use]
    pub fn allows(&self, permission: Permission, now: DateTime<Utc>) -> bool {
        is_active(self.expires_at, now) && self.permissions.contains(&permission)
    }
}

/// Source that granted a permission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantSource {
    /// Direct custom grant on the binding.
    Custom,
    /// Permission carried by a held role.
    Role(RoleId),
    /// Resource-scoped grant.
    Resource(String),
}

/// Reason a permission check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    /// Binding-wide expiry has passed.
    BindingExpired,
    /// Permission is explicitly denied.
    ExplicitlyDenied,
    /// No source grants the permission.
    NotGranted,
}

impl DenialReason {
    /// Returns a stable label for audit details.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BindingExpired => "binding_expired",
            Self::ExplicitlyDenied => "explicitly_denied",
            Self::NotGranted => "not_granted",
        }
    }
}

/// Outcome of a permission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionDecision {
    /// Access is allowed.
    Granted(GrantSource),
    /// Access is refused.
    Denied(DenialReason),
}

impl PermissionDecision {
    /// Returns whether access is allowed.
    #[must_use]
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted(_))
    }
}

/// Resolves one permission check against the principal's state.
///
/// `binding` is `None` for principals that were never granted anything, and
/// `resource_grant` is the grant for the requested resource when one was
/// named.
#[must_use]
pub fn resolve_permission(
    binding: Option<&UserRoleBinding>,
    roles: &HashMap<RoleId, RoleDefinition>,
    resource_grant: Option<&ResourcePermission>,
    permission: Permission,
    now: DateTime<Utc>,
) -> PermissionDecision {
    if let Some(binding) = binding {
        if binding.is_expired(now) {
            return PermissionDecision::Denied(DenialReason::BindingExpired);
        }

        if binding.denies(permission, now) {
            return PermissionDecision::Denied(DenialReason::ExplicitlyDenied);
        }

        if binding.grants_custom(permission, now) {
            return PermissionDecision::Granted(GrantSource::Custom);
        }

        let granting_role = binding
            .active_role_ids(now)
            .filter_map(|role_id| roles.get(role_id))
            .find(|role| role.grants(permission));
        if let Some(role) = granting_role {
            return PermissionDecision::Granted(GrantSource::Role(role.role_id.clone()));
        }
    }

    match resource_grant {
        Some(grant) if grant.allows(permission, now) => {
            PermissionDecision::Granted(GrantSource::Resource(grant.resource_id.clone()))
        }
        _ => PermissionDecision::Denied(DenialReason::NotGranted),
    }
}

/// Lifecycle state of a permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionRequestStatus {
    /// Awaiting a decision.
    Pending,
    /// Approved; the permission was granted.
    Approved,
    /// Rejected.
    Denied,
}

impl PermissionRequestStatus {
    /// Returns a stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Denied => "denied",
        }
    }
}

/// User-initiated request for a permission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRequest {
    /// Unique request identifier.
    pub request_id: Uuid,
    /// Requesting principal.
    pub user_id: String,
    /// Requested permission.
    pub permission: Permission,
    /// Optional resource type the request is about.
    pub resource_type: Option<String>,
    /// Optional resource identifier the request is about.
    pub resource_id: Option<String>,
    /// Justification supplied by the requester.
    pub reason: String,
    /// Current lifecycle state.
    pub status: PermissionRequestStatus,
    /// Submission timestamp.
    pub requested_at: DateTime<Utc>,
    /// Principal that decided the request.
    pub approved_by: Option<String>,
    /// Decision timestamp.
    pub approved_at: Option<DateTime<Utc>>,
}
