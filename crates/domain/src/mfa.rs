//! Second-factor configuration, remembered devices and verification records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// TOTP time step in seconds.
pub const TOTP_STEP_SECONDS: u64 = 30;

/// Number of digits in a TOTP code.
pub const TOTP_DIGITS: usize = 6;

/// Accepted clock drift in TOTP steps, in each direction.
pub const TOTP_SKEW_STEPS: u8 = 1;

/// Size of a generated TOTP secret in bytes (160 bits).
pub const TOTP_SECRET_BYTES: usize = 20;

/// Number of backup codes issued per enrollment or regeneration.
pub const BACKUP_CODE_COUNT: usize = 10;

/// Length of one backup code.
pub const BACKUP_CODE_LENGTH: usize = 8;

/// Symbols used in backup codes.
pub const BACKUP_CODE_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Second-factor mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MfaMethod {
    /// Authenticator-app time-based one-time password.
    Totp,
    /// One-time code delivered by email.
    Email,
    /// One-time code delivered by SMS.
    Sms,
    /// Single-use recovery code.
    BackupCode,
}

impl MfaMethod {
    /// Returns a stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Totp => "totp",
            Self::Email => "email",
            Self::Sms => "sms",
            Self::BackupCode => "backup_code",
        }
    }
}

/// Per-user second-factor configuration.
///
/// Disabling keeps the secret and history so past verifications can be
/// replayed during an investigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MfaConfig {
    /// Owning principal.
    pub user_id: String,
    /// Whether the factor is currently enforced.
    pub enabled: bool,
    /// Configured mechanism.
    pub method: MfaMethod,
    /// Encrypted TOTP secret, present for TOTP enrollments.
    pub secret_encrypted: Option<Vec<u8>>,
    /// SHA-256 digests of the unused backup codes.
    pub backup_code_hashes: Vec<String>,
    /// Enrollment timestamp.
    pub enrolled_at: DateTime<Utc>,
    /// Timestamp of the last successful verification.
    pub last_used: Option<DateTime<Utc>>,
}

/// Enrollment state derived from the stored configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MfaState {
    /// No configuration exists.
    NotEnrolled,
    /// Configuration exists and is enforced.
    Enabled,
    /// Configuration exists but was switched off.
    Disabled,
}

impl MfaState {
    /// Derives the state from an optional configuration.
    #[must_use]
    pub fn of(config: Option<&MfaConfig>) -> Self {
        match config {
            None => Self::NotEnrolled,
            Some(config) if config.enabled => Self::Enabled,
            Some(_) => Self::Disabled,
        }
    }
}

/// Remembered device that may skip the second-factor challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTrust {
    /// Owning principal.
    pub user_id: String,
    /// Stable id derived from IP address and user agent.
    pub device_id: String,
    /// Label chosen by the user.
    pub device_name: String,
    /// IP address seen when trust was granted.
    pub ip_address: String,
    /// User agent seen when trust was granted.
    pub user_agent: String,
    /// Trust creation timestamp.
    pub trusted_at: DateTime<Utc>,
    /// Trust expiry.
    pub trusted_until: DateTime<Utc>,
    /// Last time the device was used.
    pub last_used: DateTime<Utc>,
}

impl DeviceTrust {
    /// Returns whether trust is still in force at `now`.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.trusted_until > now
    }
}

/// Immutable record of one verification attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MfaVerification {
    /// Principal that attempted verification.
    pub user_id: String,
    /// Mechanism used.
    pub method: MfaMethod,
    /// Whether the attempt succeeded.
    pub verified: bool,
    /// Attempt timestamp.
    pub timestamp: DateTime<Utc>,
    /// Client IP address, if known.
    pub ip_address: Option<String>,
}

/// Normalizes a backup code for comparison.
///
/// Whitespace anywhere in the input is ignored and letters are compared
/// case-insensitively.
#[must_use]
pub fn normalize_backup_code(code: &str) -> String {
    code.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}
