use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use warden_application::{PermissionRequestFilter, RbacRepository, RoleRegistration};
use warden_core::{AppError, AppResult};
use warden_domain::{
    BindingMutation, Permission, PermissionRequest, PermissionRequestStatus, ResourcePermission,
    RoleGrant, RoleId, builtin_roles,
};

use super::InMemoryRbacRepository;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 2, 9, 30, 0)
        .single()
        .unwrap_or_else(|| panic!("valid test instant"))
}

#[tokio::test]
async fn identical_reregistration_is_accepted_but_conflicts_are_not() -> AppResult<()> {
    let repository = InMemoryRbacRepository::new();
    let mut guest = builtin_roles()
        .into_iter()
        .find(|role| role.role_id.as_str() == RoleId::GUEST)
        .unwrap_or_else(|| panic!("guest role should be built in"));

    assert_eq!(repository.register_role(guest.clone()).await?, RoleRegistration::Created);
    assert_eq!(repository.register_role(guest.clone()).await?, RoleRegistration::Unchanged);

    guest.permissions.insert(Permission::FileWrite);
    assert!(matches!(
        repository.register_role(guest).await,
        Err(AppError::DuplicateRole(_))
    ));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_mutations_of_one_binding_lose_nothing() -> AppResult<()> {
    let repository = Arc::new(InMemoryRbacRepository::new());

    let tasks: Vec<_> = Permission::all()
        .iter()
        .copied()
        .map(|permission| {
            let repository = Arc::clone(&repository);
            tokio::spawn(async move {
                repository
                    .mutate_binding(
                        "alice",
                        "root",
                        BindingMutation::GrantPermission {
                            permission,
                            expires_at: None,
                        },
                        now(),
                    )
                    .await
            })
        })
        .collect();
    for task in tasks {
        let changed = task
            .await
            .unwrap_or_else(|error| panic!("task should not panic: {error}"))?;
        assert!(changed);
    }

    let binding = repository
        .find_binding("alice")
        .await?
        .unwrap_or_else(|| panic!("binding should exist"));
    let granted: BTreeSet<Permission> = binding.custom_permissions.keys().copied().collect();
    assert_eq!(granted.len(), Permission::all().len());
    Ok(())
}

#[tokio::test]
async fn binding_is_created_lazily_by_additive_mutations_only() -> AppResult<()> {
    let repository = InMemoryRbacRepository::new();
    let user = RoleId::new(RoleId::USER)?;

    assert!(
        !repository
            .mutate_binding("bob", "root", BindingMutation::RemoveRole(user.clone()), now())
            .await?
    );
    assert!(repository.find_binding("bob").await?.is_none());

    let grant = RoleGrant {
        role_id: user,
        assigned_at: now(),
        assigned_by: "root".to_owned(),
        expires_at: None,
    };
    assert!(
        repository
            .mutate_binding("bob", "root", BindingMutation::AssignRole(grant), now())
            .await?
    );
    let binding = repository
        .find_binding("bob")
        .await?
        .unwrap_or_else(|| panic!("binding should exist"));
    assert_eq!(binding.assigned_by, "root");
    Ok(())
}

#[tokio::test]
async fn resource_grants_are_keyed_by_resource_and_user() -> AppResult<()> {
    let repository = InMemoryRbacRepository::new();
    for user_id in ["carol", "bob"] {
        repository
            .upsert_resource_permission(ResourcePermission {
                user_id: user_id.to_owned(),
                resource_id: "doc-1".to_owned(),
                resource_type: "file".to_owned(),
                permissions: BTreeSet::from([Permission::FileRead]),
                granted_by: "alice".to_owned(),
                granted_at: now(),
                expires_at: None,
            })
            .await?;
    }

    let users: Vec<String> = repository
        .list_resource_permissions("doc-1")
        .await?
        .into_iter()
        .map(|grant| grant.user_id)
        .collect();
    assert_eq!(users, vec!["bob".to_owned(), "carol".to_owned()]);

    assert!(repository.remove_resource_permission("doc-1", "bob").await?);
    assert!(!repository.remove_resource_permission("doc-1", "bob").await?);
    assert!(repository.find_resource_permission("doc-1", "bob").await?.is_none());
    assert!(repository.find_resource_permission("doc-1", "carol").await?.is_some());
    Ok(())
}

#[tokio::test]
async fn requests_are_decided_once() -> AppResult<()> {
    let repository = InMemoryRbacRepository::new();
    let request = PermissionRequest {
        request_id: Uuid::new_v4(),
        user_id: "erin".to_owned(),
        permission: Permission::FileShare,
        resource_type: None,
        resource_id: None,
        reason: "handover".to_owned(),
        status: PermissionRequestStatus::Pending,
        requested_at: now(),
        approved_by: None,
        approved_at: None,
    };
    repository.insert_permission_request(request.clone()).await?;

    let decided = repository
        .decide_permission_request(request.request_id, PermissionRequestStatus::Denied, "root", now())
        .await?;
    assert_eq!(decided.status, PermissionRequestStatus::Denied);
    assert!(matches!(
        repository
            .decide_permission_request(
                request.request_id,
                PermissionRequestStatus::Approved,
                "root",
                now()
            )
            .await,
        Err(AppError::Conflict(_))
    ));

    let pending = repository
        .list_permission_requests(&PermissionRequestFilter {
            user_id: Some("erin".to_owned()),
            status: Some(PermissionRequestStatus::Pending),
        })
        .await?;
    assert!(pending.is_empty());
    assert_eq!(
        repository
            .find_permission_request(request.request_id)
            .await?
            .map(|found| found.status),
        Some(PermissionRequestStatus::Denied)
    );
    assert!(repository.find_permission_request(Uuid::new_v4()).await?.is_none());
    Ok(())
}
