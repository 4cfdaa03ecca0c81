use serde_json::json;
use tracing::{error, info};

use warden_core::{AppError, AppResult};
use warden_domain::{AuditAction, MfaConfig, MfaMethod, TOTP_SECRET_BYTES};

use super::backup_codes::{generate_backup_codes, hash_backup_codes};
use super::{MfaService, MfaStatus, TotpSetup, unix_seconds};
use crate::AuditLogInput;

impl MfaService {
    /// Generates a fresh secret, provisioning URI and backup codes.
    ///
    /// Nothing is persisted; the principal stays in its current state until
    /// [`MfaService::enable_totp`] is called with the returned setup.
    pub fn initialize_totp_setup(&self, user_id: &str) -> AppResult<TotpSetup> {
        if user_id.trim().is_empty() {
            return Err(AppError::Validation("user id must not be empty".to_owned()));
        }
        if user_id.contains(':') {
            return Err(AppError::Validation("user id must not contain ':'".to_owned()));
        }

        let mut secret = vec![0u8; TOTP_SECRET_BYTES];
        self.random.fill_bytes(&mut secret)?;

        let (secret_base32, otpauth_uri) =
            self.totp_provider
                .provisioning(&secret, &self.settings.issuer, user_id)?;
        let backup_codes = generate_backup_codes(self.random.as_ref())?;

        Ok(TotpSetup {
            user_id: user_id.to_owned(),
            secret,
            secret_base32,
            otpauth_uri,
            backup_codes,
        })
    }

    /// Checks `token` against an unsaved setup at the current time.
    pub fn verify_setup_code(&self, setup: &TotpSetup, token: &str) -> bool {
        self.totp_provider
            .verify_code(&setup.secret, token, unix_seconds(self.clock.now()))
            .unwrap_or_else(|verify_error| {
                error!(user_id = %setup.user_id, error = %verify_error, "failed to check setup code");
                false
            })
    }

    /// Persists an enabled TOTP config from a confirmed setup.
    ///
    /// Re-enrolling replaces the secret and every backup code.
    pub async fn enable_totp(&self, user_id: &str, setup: TotpSetup) -> AppResult<MfaStatus> {
        if setup.user_id != user_id {
            return Err(AppError::Validation(format!(
                "setup was issued for '{}', not '{user_id}'",
                setup.user_id
            )));
        }

        let secret_encrypted = self.secret_encryptor.encrypt(&setup.secret)?;
        let previous = self.repository.find_config(user_id).await?;
        let config = MfaConfig {
            user_id: user_id.to_owned(),
            enabled: true,
            method: MfaMethod::Totp,
            secret_encrypted: Some(secret_encrypted),
            backup_code_hashes: hash_backup_codes(&setup.backup_codes),
            enrolled_at: self.clock.now(),
            last_used: None,
        };
        self.repository.save_config(config).await?;

        let re_enrolled = previous.is_some();
        info!(user_id, re_enrolled, "enabled TOTP");
        self.audit_log
            .log(
                AuditLogInput::new(user_id, AuditAction::MfaEnabled, "mfa")
                    .resource_id(user_id)
                    .details(json!({
                        "method": MfaMethod::Totp.as_str(),
                        "reEnrolled": re_enrolled,
                    })),
            )
            .await;

        self.mfa_status(user_id).await
    }

    /// Verifies `token` against the setup and enables it in one step.
    ///
    /// Fails with `Unauthorized` when the token does not match.
    pub async fn confirm_totp_setup(
        &self,
        user_id: &str,
        setup: TotpSetup,
        token: &str,
    ) -> AppResult<MfaStatus> {
        if !self.verify_setup_code(&setup, token) {
            return Err(AppError::Unauthorized("invalid TOTP code".to_owned()));
        }

        self.enable_totp(user_id, setup).await
    }
}
