//! End-to-end flows over the in-process adapters.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use warden_application::{
    AuditLogInput, AuditLogService, CustomRoleInput, MfaService, MfaSettings, RbacService,
    TotpProvider,
};
use warden_core::{AppResult, Clock, ManualClock, OsSecureRandom, RequestContext};
use warden_domain::{
    AuditAction, AuditLogQuery, AuditStatus, MfaState, Permission, RoleId, TOTP_STEP_SECONDS,
};

use crate::{
    AesSecretEncryptor, DeadLetterAuditSink, InMemoryAuditLogRepository, InMemoryMfaRepository,
    InMemoryRbacRepository, TotpRsProvider,
};

struct Harness {
    clock: Arc<ManualClock>,
    audit_log: AuditLogService,
    rbac: RbacService,
    mfa: MfaService,
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0)
        .single()
        .unwrap_or_else(|| panic!("valid test instant"))
}

async fn harness() -> AppResult<Harness> {
    let clock = Arc::new(ManualClock::new(start()));
    let audit_log = AuditLogService::new(
        Arc::new(InMemoryAuditLogRepository::new()),
        Arc::new(DeadLetterAuditSink::default()),
        clock.clone(),
    );
    let rbac = RbacService::new(
        Arc::new(InMemoryRbacRepository::new()),
        audit_log.clone(),
        clock.clone(),
    );
    rbac.seed_builtin_roles().await?;

    let mfa = MfaService::new(
        Arc::new(InMemoryMfaRepository::new()),
        Arc::new(TotpRsProvider),
        Arc::new(AesSecretEncryptor::new(&[7u8; 32])),
        Arc::new(OsSecureRandom),
        audit_log.clone(),
        clock.clone(),
        MfaSettings::default(),
    )
    .with_enforcement(rbac.clone());

    Ok(Harness {
        clock,
        audit_log,
        rbac,
        mfa,
    })
}

fn unix_now(clock: &ManualClock) -> u64 {
    u64::try_from(clock.now().timestamp()).unwrap_or_else(|error| panic!("{error}"))
}

#[tokio::test]
async fn user_role_grants_reads_until_denied() -> AppResult<()> {
    let harness = harness().await?;
    let user = RoleId::new(RoleId::USER)?;

    harness.rbac.assign_role("alice", &user, "root", None).await?;
    assert!(harness.rbac.has_permission_token("alice", "file.read", None).await);
    assert!(
        !harness
            .rbac
            .has_permission_token("alice", "admin.manage_users", None)
            .await
    );

    harness
        .rbac
        .deny_permission("root", "alice", Permission::FileRead, None)
        .await?;
    assert!(!harness.rbac.has_permission("alice", Permission::FileRead, None).await);
    assert!(harness.rbac.has_permission("alice", Permission::FileWrite, None).await);

    let trail = harness.audit_log.user_logs("root", None).await?;
    let actions: Vec<AuditAction> = trail.iter().map(|entry| entry.action).collect();
    assert_eq!(
        actions,
        vec![AuditAction::PermissionsModified, AuditAction::RoleAssigned]
    );
    Ok(())
}

#[tokio::test]
async fn totp_enrollment_verifies_the_current_code() -> AppResult<()> {
    let harness = harness().await?;
    let provider = TotpRsProvider;

    let setup = harness.mfa.initialize_totp_setup("bob")?;
    assert!(setup.otpauth_uri.starts_with("otpauth://totp/"));
    let code = provider.generate_code(setup.secret(), unix_now(&harness.clock))?;

    let status = harness.mfa.confirm_totp_setup("bob", setup.clone(), &code).await?;
    assert_eq!(status.state, MfaState::Enabled);
    assert_eq!(status.backup_codes_remaining, 10);

    let attempt = harness
        .mfa
        .verify_totp("bob", &code, Some("198.51.100.4"))
        .await;
    assert!(attempt.verified);

    // One step of drift is tolerated, two are not.
    let step = Duration::seconds(TOTP_STEP_SECONDS as i64);
    let stale = provider.generate_code(setup.secret(), unix_now(&harness.clock))?;
    harness.clock.advance(step);
    assert!(harness.mfa.verify_totp("bob", &stale, None).await.verified);
    harness.clock.advance(step);
    assert!(!harness.mfa.verify_totp("bob", &stale, None).await.verified);

    let history = harness.mfa.verification_history("bob", None).await?;
    assert_eq!(history.len(), 3);
    assert!(!history[0].verified);
    Ok(())
}

#[tokio::test]
async fn backup_codes_are_single_use() -> AppResult<()> {
    let harness = harness().await?;
    let setup = harness.mfa.initialize_totp_setup("bob")?;
    harness.mfa.enable_totp("bob", setup).await?;

    let codes = harness.mfa.regenerate_backup_codes("bob").await?;
    assert_eq!(codes.len(), 10);

    assert!(harness.mfa.verify_backup_code("bob", &codes[0], None).await.verified);
    assert!(!harness.mfa.verify_backup_code("bob", &codes[0], None).await.verified);
    assert!(harness.mfa.verify_backup_code("bob", &codes[1], None).await.verified);
    assert_eq!(harness.mfa.mfa_status("bob").await?.backup_codes_remaining, 8);
    Ok(())
}

#[tokio::test]
async fn failed_logins_are_reported_newest_first() -> AppResult<()> {
    let harness = harness().await?;
    let context = RequestContext::new(Some("1.2.3.4".to_owned()), Some("curl/8".to_owned()));

    let mut logged = Vec::new();
    for _ in 0..3 {
        let entry = harness
            .audit_log
            .log(
                AuditLogInput::new("carol", AuditAction::Login, "user")
                    .status(AuditStatus::Failure)
                    .context(context.clone()),
            )
            .await;
        logged.push(entry.id);
        harness.clock.advance(Duration::minutes(10));
    }
    harness
        .audit_log
        .log(AuditLogInput::new("carol", AuditAction::Login, "user"))
        .await;

    let failures = harness.audit_log.failed_login_attempts("carol", 24).await?;
    let ids: Vec<_> = failures.iter().map(|entry| entry.id).collect();
    logged.reverse();
    assert_eq!(ids, logged);
    assert!(
        failures
            .iter()
            .all(|entry| entry.ip_address.as_deref() == Some("1.2.3.4"))
    );
    Ok(())
}

#[tokio::test]
async fn custom_role_yields_exactly_its_permissions() -> AppResult<()> {
    let harness = harness().await?;
    let role = harness
        .rbac
        .create_custom_role(
            "root",
            CustomRoleInput {
                name: "content-moderator".to_owned(),
                display_name: "Content Moderator".to_owned(),
                description: "Reviews uploaded content".to_owned(),
                permissions: vec!["file.read".to_owned(), "file.delete".to_owned()],
                hierarchy_level: 2,
            },
        )
        .await?;

    harness.rbac.assign_role("dave", &role.role_id, "root", None).await?;
    assert_eq!(
        harness.rbac.effective_permissions("dave").await,
        BTreeSet::from([Permission::FileRead, Permission::FileDelete])
    );
    Ok(())
}

#[tokio::test]
async fn enforcement_follows_the_role_graph() -> AppResult<()> {
    let harness = harness().await?;
    let admin = RoleId::new(RoleId::ADMIN)?;

    assert!(!harness.mfa.requires_enrollment("erin").await);
    harness.rbac.assign_role("erin", &admin, "root", None).await?;
    assert!(harness.mfa.requires_enrollment("erin").await);

    let setup = harness.mfa.initialize_totp_setup("erin")?;
    harness.mfa.enable_totp("erin", setup).await?;
    assert!(!harness.mfa.requires_enrollment("erin").await);
    Ok(())
}

#[tokio::test]
async fn expired_grants_lapse_with_the_clock() -> AppResult<()> {
    let harness = harness().await?;
    let moderator = RoleId::new(RoleId::MODERATOR)?;
    let until = start() + Duration::hours(1);

    harness
        .rbac
        .assign_role("frank", &moderator, "root", Some(until))
        .await?;
    assert!(harness.rbac.has_permission("frank", Permission::FileShare, None).await);

    harness.clock.set(until);
    assert!(!harness.rbac.has_permission("frank", Permission::FileShare, None).await);
    assert!(harness.rbac.effective_permissions("frank").await.is_empty());
    Ok(())
}

#[tokio::test]
async fn temporary_assignment_takes_custom_grants_down_with_it() -> AppResult<()> {
    let harness = harness().await?;
    let user = RoleId::new(RoleId::USER)?;

    harness
        .rbac
        .assign_role("alice", &user, "root", Some(start() + Duration::hours(1)))
        .await?;
    harness
        .rbac
        .grant_permission("root", "alice", Permission::FileDelete, None)
        .await?;
    assert!(harness.rbac.has_permission("alice", Permission::FileDelete, None).await);

    harness.clock.advance(Duration::hours(2));
    assert!(!harness.rbac.has_permission("alice", Permission::FileDelete, None).await);
    assert!(!harness.rbac.has_permission("alice", Permission::FileRead, None).await);
    assert!(harness.rbac.effective_permissions("alice").await.is_empty());
    Ok(())
}

#[tokio::test]
async fn audit_trail_only_grows_until_retention_pruning() -> AppResult<()> {
    let harness = harness().await?;
    harness
        .audit_log
        .log(AuditLogInput::new("gina", AuditAction::FileUpload, "file").resource_id("f-1"))
        .await;
    harness.clock.advance(Duration::days(40));
    harness
        .audit_log
        .log(AuditLogInput::new("gina", AuditAction::FileDownload, "file").resource_id("f-1"))
        .await;

    assert_eq!(harness.audit_log.entry_count().await?, 2);
    assert_eq!(harness.audit_log.clear_old_logs(30).await?, 1);

    let remaining = harness
        .audit_log
        .query(&AuditLogQuery {
            user_id: Some("gina".to_owned()),
            ..AuditLogQuery::default()
        })
        .await?;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].action, AuditAction::FileDownload);
    Ok(())
}
