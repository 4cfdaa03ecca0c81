use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::Mutex;

use warden_core::{AppError, AppResult, Clock, ManualClock, OsSecureRandom};
use warden_domain::{
    AuditAction, AuditLogEntry, AuditLogQuery, AuditStatus, BACKUP_CODE_ALPHABET,
    BACKUP_CODE_COUNT, BACKUP_CODE_LENGTH, DeviceTrust, MfaConfig, MfaMethod, MfaState,
    MfaVerification,
};

use crate::{AuditFailureSink, AuditLogRepository, AuditLogService};

use super::backup_codes::hash_backup_code;
use super::{
    MfaRepository, MfaService, MfaSettings, SecretEncryptor, TotpProvider, derive_device_id,
};

#[derive(Default)]
struct FakeMfaRepository {
    configs: Mutex<HashMap<String, MfaConfig>>,
    verifications: Mutex<Vec<MfaVerification>>,
    devices: Mutex<HashMap<(String, String), DeviceTrust>>,
}

#[async_trait]
impl MfaRepository for FakeMfaRepository {
    async fn find_config(&self, user_id: &str) -> AppResult<Option<MfaConfig>> {
        Ok(self.configs.lock().await.get(user_id).cloned())
    }

    async fn save_config(&self, config: MfaConfig) -> AppResult<()> {
        self.configs
            .lock()
            .await
            .insert(config.user_id.clone(), config);
        Ok(())
    }

    async fn set_enabled(&self, user_id: &str, enabled: bool) -> AppResult<bool> {
        Ok(self
            .configs
            .lock()
            .await
            .get_mut(user_id)
            .map(|config| config.enabled = enabled)
            .is_some())
    }

    async fn replace_backup_codes(
        &self,
        user_id: &str,
        code_hashes: Vec<String>,
    ) -> AppResult<bool> {
        Ok(self
            .configs
            .lock()
            .await
            .get_mut(user_id)
            .map(|config| config.backup_code_hashes = code_hashes)
            .is_some())
    }

    async fn consume_backup_code(
        &self,
        user_id: &str,
        code_hash: &str,
        used_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut configs = self.configs.lock().await;
        let Some(config) = configs.get_mut(user_id).filter(|config| config.enabled) else {
            return Ok(false);
        };
        let Some(position) = config
            .backup_code_hashes
            .iter()
            .position(|stored| stored == code_hash)
        else {
            return Ok(false);
        };
        config.backup_code_hashes.remove(position);
        config.last_used = Some(used_at);
        Ok(true)
    }

    async fn touch_last_used(&self, user_id: &str, used_at: DateTime<Utc>) -> AppResult<()> {
        if let Some(config) = self.configs.lock().await.get_mut(user_id) {
            config.last_used = Some(used_at);
        }
        Ok(())
    }

    async fn append_verification(&self, verification: MfaVerification) -> AppResult<()> {
        self.verifications.lock().await.push(verification);
        Ok(())
    }

    async fn list_verifications(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> AppResult<Vec<MfaVerification>> {
        Ok(self
            .verifications
            .lock()
            .await
            .iter()
            .rev()
            .filter(|verification| verification.user_id == user_id)
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn save_device(&self, device: DeviceTrust) -> AppResult<()> {
        self.devices
            .lock()
            .await
            .insert((device.user_id.clone(), device.device_id.clone()), device);
        Ok(())
    }

    async fn find_device(&self, user_id: &str, device_id: &str) -> AppResult<Option<DeviceTrust>> {
        Ok(self
            .devices
            .lock()
            .await
            .get(&(user_id.to_owned(), device_id.to_owned()))
            .cloned())
    }

    async fn touch_device(
        &self,
        user_id: &str,
        device_id: &str,
        used_at: DateTime<Utc>,
    ) -> AppResult<()> {
        if let Some(device) = self
            .devices
            .lock()
            .await
            .get_mut(&(user_id.to_owned(), device_id.to_owned()))
        {
            device.last_used = used_at;
        }
        Ok(())
    }

    async fn remove_device(&self, user_id: &str, device_id: &str) -> AppResult<bool> {
        Ok(self
            .devices
            .lock()
            .await
            .remove(&(user_id.to_owned(), device_id.to_owned()))
            .is_some())
    }

    async fn list_devices(&self, user_id: &str) -> AppResult<Vec<DeviceTrust>> {
        Ok(self
            .devices
            .lock()
            .await
            .values()
            .filter(|device| device.user_id == user_id)
            .cloned()
            .collect())
    }
}

/// Step counter mixed with the secret; accepts the current step only.
struct StepTotpProvider;

impl StepTotpProvider {
    fn code_for_step(secret: &[u8], step: u64) -> String {
        let seed: u64 = secret.iter().map(|byte| u64::from(*byte)).sum();
        format!("{:06}", (seed * 7_919 + step) % 1_000_000)
    }
}

#[async_trait]
impl TotpProvider for StepTotpProvider {
    fn provisioning(
        &self,
        _secret: &[u8],
        issuer: &str,
        account_name: &str,
    ) -> AppResult<(String, String)> {
        Ok((
            "BASE32".to_owned(),
            format!("otpauth://totp/{issuer}:{account_name}?secret=BASE32"),
        ))
    }

    fn generate_code(&self, secret: &[u8], unix_seconds: u64) -> AppResult<String> {
        Ok(Self::code_for_step(secret, unix_seconds / 30))
    }

    fn verify_code(&self, secret: &[u8], code: &str, unix_seconds: u64) -> AppResult<bool> {
        Ok(Self::code_for_step(secret, unix_seconds / 30) == code)
    }
}

struct XorEncryptor;

#[async_trait]
impl SecretEncryptor for XorEncryptor {
    fn encrypt(&self, plaintext: &[u8]) -> AppResult<Vec<u8>> {
        Ok(plaintext.iter().map(|byte| byte ^ 0x5a).collect())
    }

    fn decrypt(&self, ciphertext: &[u8]) -> AppResult<Vec<u8>> {
        self.encrypt(ciphertext)
    }
}

#[derive(Default)]
struct RecordingAuditRepository {
    entries: Mutex<Vec<AuditLogEntry>>,
}

#[async_trait]
impl AuditLogRepository for RecordingAuditRepository {
    async fn append_entry(&self, entry: AuditLogEntry) -> AppResult<()> {
        self.entries.lock().await.push(entry);
        Ok(())
    }

    async fn query_entries(&self, query: &AuditLogQuery) -> AppResult<Vec<AuditLogEntry>> {
        Ok(self
            .entries
            .lock()
            .await
            .iter()
            .filter(|entry| query.matches(entry))
            .cloned()
            .collect())
    }

    async fn purge_entries_before(&self, _cutoff: DateTime<Utc>) -> AppResult<u64> {
        Ok(0)
    }

    async fn count_entries(&self) -> AppResult<u64> {
        Ok(u64::try_from(self.entries.lock().await.len()).unwrap_or(u64::MAX))
    }
}

struct IgnoringFailureSink;

#[async_trait]
impl AuditFailureSink for IgnoringFailureSink {
    async fn record_failure(&self, _entry: AuditLogEntry, _error: AppError) {}
}

struct Harness {
    service: MfaService,
    repository: Arc<FakeMfaRepository>,
    audit: Arc<RecordingAuditRepository>,
    clock: Arc<ManualClock>,
}

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 7, 14, 10, 0, 0)
        .single()
        .unwrap_or_else(|| panic!("valid test instant"))
}

fn harness() -> Harness {
    let clock = Arc::new(ManualClock::new(start()));
    let repository = Arc::new(FakeMfaRepository::default());
    let audit = Arc::new(RecordingAuditRepository::default());
    let audit_log = AuditLogService::new(audit.clone(), Arc::new(IgnoringFailureSink), clock.clone());
    let service = MfaService::new(
        repository.clone(),
        Arc::new(StepTotpProvider),
        Arc::new(XorEncryptor),
        Arc::new(OsSecureRandom),
        audit_log,
        clock.clone(),
        MfaSettings::default(),
    );

    Harness {
        service,
        repository,
        audit,
        clock,
    }
}

fn current_code(harness: &Harness, secret: &[u8]) -> String {
    let unix = u64::try_from(harness.clock.now().timestamp()).unwrap_or_default();
    StepTotpProvider::code_for_step(secret, unix / 30)
}

async fn enrolled(harness: &Harness, user_id: &str) -> AppResult<(Vec<u8>, Vec<String>)> {
    let setup = harness.service.initialize_totp_setup(user_id)?;
    let secret = setup.secret().to_vec();
    let codes = setup.backup_codes.clone();
    harness.service.enable_totp(user_id, setup).await?;
    Ok((secret, codes))
}

#[tokio::test]
async fn setup_persists_nothing_until_enabled() -> AppResult<()> {
    let harness = harness();

    let setup = harness.service.initialize_totp_setup("bob")?;

    assert_eq!(setup.secret().len(), 20);
    assert_eq!(setup.backup_codes.len(), BACKUP_CODE_COUNT);
    assert!(setup.otpauth_uri.starts_with("otpauth://totp/Warden:bob?"));
    assert_eq!(
        harness.service.mfa_status("bob").await?.state,
        MfaState::NotEnrolled
    );
    assert!(!format!("{setup:?}").contains("BASE32"));
    Ok(())
}

#[test]
fn setup_rejects_ids_that_would_split_the_otpauth_label() {
    let harness = harness();

    for user_id in ["org:bob", "bob:", ":bob"] {
        assert!(matches!(
            harness.service.initialize_totp_setup(user_id),
            Err(AppError::Validation(_))
        ));
    }
}

#[test]
fn backup_codes_use_the_fixed_alphabet() {
    let codes = super::backup_codes::generate_backup_codes(&OsSecureRandom)
        .unwrap_or_else(|error| panic!("codes should generate: {error}"));

    assert_eq!(codes.len(), BACKUP_CODE_COUNT);
    for code in &codes {
        assert_eq!(code.len(), BACKUP_CODE_LENGTH);
        assert!(code.bytes().all(|byte| BACKUP_CODE_ALPHABET.contains(&byte)));
    }
}

#[tokio::test]
async fn confirmed_setup_enables_totp_and_verifies() -> AppResult<()> {
    let harness = harness();
    let setup = harness.service.initialize_totp_setup("bob")?;
    let code = current_code(&harness, setup.secret());

    assert!(harness.service.verify_setup_code(&setup, &code));
    let status = harness.service.confirm_totp_setup("bob", setup, &code).await?;
    assert_eq!(status.state, MfaState::Enabled);
    assert_eq!(status.backup_codes_remaining, BACKUP_CODE_COUNT);

    let verification = harness.service.verify_totp("bob", &code, Some("10.1.1.1")).await;
    assert!(verification.verified);
    assert_eq!(
        harness.service.mfa_status("bob").await?.last_used,
        Some(start())
    );
    Ok(())
}

#[tokio::test]
async fn wrong_setup_code_is_unauthorized() -> AppResult<()> {
    let harness = harness();
    let setup = harness.service.initialize_totp_setup("bob")?;

    let result = harness.service.confirm_totp_setup("bob", setup, "abc").await;

    assert!(matches!(result, Err(AppError::Unauthorized(_))));
    assert_eq!(
        harness.service.mfa_status("bob").await?.state,
        MfaState::NotEnrolled
    );
    Ok(())
}

#[tokio::test]
async fn enable_rejects_a_setup_issued_for_someone_else() -> AppResult<()> {
    let harness = harness();
    let setup = harness.service.initialize_totp_setup("bob")?;

    let result = harness.service.enable_totp("eve", setup).await;

    assert!(matches!(result, Err(AppError::Validation(_))));
    Ok(())
}

#[tokio::test]
async fn unknown_principals_and_malformed_tokens_fail_quietly() -> AppResult<()> {
    let harness = harness();
    enrolled(&harness, "bob").await?;

    assert!(!harness.service.verify_totp("nobody", "123456", None).await.verified);
    assert!(!harness.service.verify_totp("bob", "12ab", None).await.verified);
    assert!(!harness.service.verify_backup_code("nobody", "AAAAAAAA", None).await.verified);

    let history = harness.service.verification_history("bob", None).await?;
    assert_eq!(history.len(), 1);
    assert!(!history[0].verified);
    assert_eq!(history[0].method, MfaMethod::Totp);
    Ok(())
}

#[tokio::test]
async fn failed_totp_does_not_touch_last_used() -> AppResult<()> {
    let harness = harness();
    enrolled(&harness, "bob").await?;

    harness.service.verify_totp("bob", "000000x", None).await;

    assert_eq!(harness.service.mfa_status("bob").await?.last_used, None);
    Ok(())
}

#[tokio::test]
async fn backup_codes_are_single_use_and_whitespace_tolerant() -> AppResult<()> {
    let harness = harness();
    let (_, codes) = enrolled(&harness, "bob").await?;
    let spaced = format!(" {} {} ", &codes[0][..4], codes[0][4..].to_lowercase());

    assert!(harness.service.verify_backup_code("bob", &spaced, None).await.verified);
    assert!(!harness.service.verify_backup_code("bob", &codes[0], None).await.verified);
    assert!(harness.service.verify_backup_code("bob", &codes[1], None).await.verified);
    assert_eq!(
        harness.service.mfa_status("bob").await?.backup_codes_remaining,
        BACKUP_CODE_COUNT - 2
    );
    Ok(())
}

#[tokio::test]
async fn stored_codes_are_digests_not_plaintext() -> AppResult<()> {
    let harness = harness();
    let (secret, codes) = enrolled(&harness, "bob").await?;

    let configs = harness.repository.configs.lock().await;
    let config = configs
        .get("bob")
        .unwrap_or_else(|| panic!("config should exist"));
    assert!(!config.backup_code_hashes.contains(&codes[0]));
    assert!(config.backup_code_hashes.contains(&hash_backup_code(&codes[0])));
    assert_ne!(config.secret_encrypted.as_deref(), Some(secret.as_slice()));
    Ok(())
}

#[tokio::test]
async fn regeneration_invalidates_previous_codes() -> AppResult<()> {
    let harness = harness();
    let (_, old_codes) = enrolled(&harness, "bob").await?;

    let new_codes = harness.service.regenerate_backup_codes("bob").await?;

    assert!(!harness.service.verify_backup_code("bob", &old_codes[0], None).await.verified);
    assert!(harness.service.verify_backup_code("bob", &new_codes[0], None).await.verified);
    assert!(matches!(
        harness.service.regenerate_backup_codes("nobody").await,
        Err(AppError::NotFound(_))
    ));
    Ok(())
}

#[tokio::test]
async fn disabling_blocks_verification_but_keeps_history() -> AppResult<()> {
    let harness = harness();
    let (secret, codes) = enrolled(&harness, "bob").await?;
    let code = current_code(&harness, &secret);
    assert!(harness.service.verify_totp("bob", &code, None).await.verified);

    harness.service.disable_mfa("bob", "bob").await?;

    assert_eq!(harness.service.mfa_status("bob").await?.state, MfaState::Disabled);
    assert!(!harness.service.verify_totp("bob", &code, None).await.verified);
    assert!(!harness.service.verify_backup_code("bob", &codes[0], None).await.verified);
    assert_eq!(harness.service.verification_history("bob", Some(5)).await?.len(), 3);
    assert!(matches!(
        harness.service.disable_mfa("nobody", "nobody").await,
        Err(AppError::NotFound(_))
    ));
    Ok(())
}

#[tokio::test]
async fn re_enrolling_replaces_secret_and_codes() -> AppResult<()> {
    let harness = harness();
    let (_, first_codes) = enrolled(&harness, "bob").await?;
    enrolled(&harness, "bob").await?;

    assert!(!harness.service.verify_backup_code("bob", &first_codes[0], None).await.verified);
    assert_eq!(harness.service.mfa_status("bob").await?.state, MfaState::Enabled);
    Ok(())
}

#[tokio::test]
async fn device_trust_expires_and_can_be_revoked() -> AppResult<()> {
    let harness = harness();
    let device = harness
        .service
        .trust_device("bob", "laptop", "203.0.113.4", "Firefox/128", Some(2))
        .await?;

    assert_eq!(device.device_id, derive_device_id("203.0.113.4", "Firefox/128"));
    assert!(harness.service.is_device_trusted("bob", "203.0.113.4", "Firefox/128").await);
    assert!(!harness.service.is_device_trusted("bob", "203.0.113.5", "Firefox/128").await);

    harness.clock.advance(Duration::days(2));
    assert!(!harness.service.is_device_trusted("bob", "203.0.113.4", "Firefox/128").await);
    assert!(harness.service.trusted_devices("bob").await?.is_empty());

    assert!(harness.service.revoke_device_trust("bob", &device.device_id).await?);
    assert!(!harness.service.revoke_device_trust("bob", &device.device_id).await?);
    Ok(())
}

#[tokio::test]
async fn zero_day_trust_is_rejected() {
    let harness = harness();

    let result = harness
        .service
        .trust_device("bob", "kiosk", "198.51.100.1", "Edge", Some(0))
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn trust_running_past_the_calendar_is_rejected() -> AppResult<()> {
    let harness = harness();

    let result = harness
        .service
        .trust_device("bob", "kiosk", "198.51.100.1", "Edge", Some(u32::MAX))
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
    assert!(harness.service.trusted_devices("bob").await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn verification_attempts_are_audited_with_outcome() -> AppResult<()> {
    let harness = harness();
    enrolled(&harness, "bob").await?;
    harness.service.verify_totp("bob", "999999x", Some("10.0.0.2")).await;

    let entries = harness.audit.entries.lock().await;
    let actions: Vec<AuditAction> = entries.iter().map(|entry| entry.action).collect();
    assert_eq!(actions, vec![AuditAction::MfaEnabled, AuditAction::MfaVerified]);
    assert_eq!(entries[1].status, AuditStatus::Failure);
    assert_eq!(entries[1].ip_address.as_deref(), Some("10.0.0.2"));
    Ok(())
}

#[tokio::test]
async fn enforcement_is_off_without_rbac() {
    let harness = harness();

    assert!(!harness.service.requires_enrollment("bob").await);
}
