//! Second-factor enrollment and verification.
//!
//! - TOTP codes are 6 digits on a 30-second step, accepted one step either side.
//! - Backup codes are single-use and stored as SHA-256 digests.
//! - Verification queries never fail; every attempt lands in the history and
//!   the audit log.

use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use warden_core::{AppResult, Clock, SecureRandom};
use warden_domain::{DeviceTrust, MfaConfig, MfaMethod, MfaState, MfaVerification};

use crate::{AuditLogService, RbacService};

/// Tunables for second-factor handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MfaSettings {
    /// Issuer label embedded in provisioning URIs.
    pub issuer: String,
    /// Default trust window for remembered devices.
    pub device_trust_days: u32,
}

impl Default for MfaSettings {
    fn default() -> Self {
        Self {
            issuer: "Warden".to_owned(),
            device_trust_days: 30,
        }
    }
}

/// Unsaved TOTP enrollment handed to the user for QR display.
///
/// Nothing is persisted until the setup is passed to
/// [`MfaService::enable_totp`].
#[derive(Clone)]
pub struct TotpSetup {
    /// Principal being enrolled.
    pub user_id: String,
    secret: Vec<u8>,
    /// Base32 secret for manual entry.
    pub secret_base32: String,
    /// `otpauth://totp/...` provisioning URI.
    pub otpauth_uri: String,
    /// Plaintext backup codes, shown once.
    pub backup_codes: Vec<String>,
}

impl TotpSetup {
    /// Raw shared secret.
    #[must_use]
    pub fn secret(&self) -> &[u8] {
        &self.secret
    }
}

impl Debug for TotpSetup {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("TotpSetup")
            .field("user_id", &self.user_id)
            .field("secret", &"<redacted>")
            .field("backup_codes", &self.backup_codes.len())
            .finish_non_exhaustive()
    }
}

/// Snapshot of a principal's second-factor state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MfaStatus {
    /// Lifecycle state.
    pub state: MfaState,
    /// Configured method, absent when never enrolled.
    pub method: Option<MfaMethod>,
    /// Unused backup codes.
    pub backup_codes_remaining: usize,
    /// Last successful verification.
    pub last_used: Option<DateTime<Utc>>,
    /// Devices still trusted.
    pub trusted_devices: usize,
}

/// Repository port for second-factor state.
///
/// Mutations of one principal's config are atomic.
#[async_trait]
pub trait MfaRepository: Send + Sync {
    /// Returns the config of one principal.
    async fn find_config(&self, user_id: &str) -> AppResult<Option<MfaConfig>>;

    /// Inserts or replaces a config.
    async fn save_config(&self, config: MfaConfig) -> AppResult<()>;

    /// Flips the enabled flag; returns `false` when no config exists.
    async fn set_enabled(&self, user_id: &str, enabled: bool) -> AppResult<bool>;

    /// Replaces all backup code digests; returns `false` when no config exists.
    async fn replace_backup_codes(&self, user_id: &str, code_hashes: Vec<String>)
    -> AppResult<bool>;

    /// Removes one matching digest from an enabled config and stamps `last_used`.
    ///
    /// Returns whether a digest was consumed. Two concurrent calls with the
    /// same digest consume it at most once.
    async fn consume_backup_code(
        &self,
        user_id: &str,
        code_hash: &str,
        used_at: DateTime<Utc>,
    ) -> AppResult<bool>;

    /// Stamps `last_used` on the config.
    async fn touch_last_used(&self, user_id: &str, used_at: DateTime<Utc>) -> AppResult<()>;

    /// Appends one verification attempt.
    async fn append_verification(&self, verification: MfaVerification) -> AppResult<()>;

    /// Returns attempts newest first.
    async fn list_verifications(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> AppResult<Vec<MfaVerification>>;

    /// Inserts or replaces a remembered device.
    async fn save_device(&self, device: DeviceTrust) -> AppResult<()>;

    /// Returns one remembered device, expired or not.
    async fn find_device(&self, user_id: &str, device_id: &str) -> AppResult<Option<DeviceTrust>>;

    /// Stamps `last_used` on a remembered device.
    async fn touch_device(
        &self,
        user_id: &str,
        device_id: &str,
        used_at: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Forgets a device; returns whether it existed.
    async fn remove_device(&self, user_id: &str, device_id: &str) -> AppResult<bool>;

    /// Returns every remembered device, expired or not.
    async fn list_devices(&self, user_id: &str) -> AppResult<Vec<DeviceTrust>>;
}

/// Port for TOTP operations.
#[async_trait]
pub trait TotpProvider: Send + Sync {
    /// Returns `(secret_base32, otpauth_uri)` for a secret.
    fn provisioning(
        &self,
        secret: &[u8],
        issuer: &str,
        account_name: &str,
    ) -> AppResult<(String, String)>;

    /// Generates the code for the step containing `unix_seconds`.
    fn generate_code(&self, secret: &[u8], unix_seconds: u64) -> AppResult<String>;

    /// Checks a code with one step of tolerance either side of `unix_seconds`.
    fn verify_code(&self, secret: &[u8], code: &str, unix_seconds: u64) -> AppResult<bool>;
}

/// Port for encrypting TOTP secrets at rest.
#[async_trait]
pub trait SecretEncryptor: Send + Sync {
    /// Encrypts a secret for storage.
    fn encrypt(&self, plaintext: &[u8]) -> AppResult<Vec<u8>>;

    /// Decrypts a stored secret.
    fn decrypt(&self, ciphertext: &[u8]) -> AppResult<Vec<u8>>;
}

/// Application service for second-factor operations.
#[derive(Clone)]
pub struct MfaService {
    repository: Arc<dyn MfaRepository>,
    totp_provider: Arc<dyn TotpProvider>,
    secret_encryptor: Arc<dyn SecretEncryptor>,
    random: Arc<dyn SecureRandom>,
    audit_log: AuditLogService,
    clock: Arc<dyn Clock>,
    settings: MfaSettings,
    enforcement: Option<RbacService>,
}

impl MfaService {
    /// Creates a service from its ports.
    #[must_use]
    pub fn new(
        repository: Arc<dyn MfaRepository>,
        totp_provider: Arc<dyn TotpProvider>,
        secret_encryptor: Arc<dyn SecretEncryptor>,
        random: Arc<dyn SecureRandom>,
        audit_log: AuditLogService,
        clock: Arc<dyn Clock>,
        settings: MfaSettings,
    ) -> Self {
        Self {
            repository,
            totp_provider,
            secret_encryptor,
            random,
            audit_log,
            clock,
            settings,
            enforcement: None,
        }
    }

    /// Uses `rbac` to decide which principals must enroll.
    #[must_use]
    pub fn with_enforcement(mut self, rbac: RbacService) -> Self {
        self.enforcement = Some(rbac);
        self
    }
}

fn unix_seconds(instant: DateTime<Utc>) -> u64 {
    u64::try_from(instant.timestamp()).unwrap_or_default()
}

mod backup_codes;
mod devices;
mod enrollment;
mod management;
mod verification;

pub use devices::derive_device_id;

#[cfg(test)]
mod tests;
