use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{error, info, warn};

use warden_core::{AppResult, RequestContext};
use warden_domain::{AuditAction, AuditStatus, MfaMethod, MfaVerification};

use super::backup_codes::hash_backup_code;
use super::{MfaService, unix_seconds};
use crate::AuditLogInput;

impl MfaService {
    /// Checks a TOTP token for an enrolled principal.
    ///
    /// Never fails: principals without an enabled config, malformed tokens
    /// and storage errors all yield `verified = false`.
    pub async fn verify_totp(
        &self,
        user_id: &str,
        token: &str,
        ip_address: Option<&str>,
    ) -> MfaVerification {
        let now = self.clock.now();
        let verified = match self.check_totp(user_id, token, now).await {
            Ok(verified) => verified,
            Err(check_error) => {
                error!(user_id, error = %check_error, "TOTP verification failed; rejecting");
                false
            }
        };

        if verified
            && let Err(touch_error) = self.repository.touch_last_used(user_id, now).await
        {
            error!(user_id, error = %touch_error, "failed to stamp second-factor use");
        }

        self.record_verification(user_id, MfaMethod::Totp, verified, ip_address, now)
            .await
    }

    /// Checks and consumes a backup code; whitespace and case are ignored.
    ///
    /// Never fails. A code verifies at most once.
    pub async fn verify_backup_code(
        &self,
        user_id: &str,
        code: &str,
        ip_address: Option<&str>,
    ) -> MfaVerification {
        let now = self.clock.now();
        let verified = match self
            .repository
            .consume_backup_code(user_id, &hash_backup_code(code), now)
            .await
        {
            Ok(consumed) => consumed,
            Err(consume_error) => {
                error!(user_id, error = %consume_error, "backup code verification failed; rejecting");
                false
            }
        };

        self.record_verification(user_id, MfaMethod::BackupCode, verified, ip_address, now)
            .await
    }

    /// Returns verification attempts newest first.
    pub async fn verification_history(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> AppResult<Vec<MfaVerification>> {
        self.repository.list_verifications(user_id, limit).await
    }

    async fn check_totp(&self, user_id: &str, token: &str, now: DateTime<Utc>) -> AppResult<bool> {
        let Some(config) = self.repository.find_config(user_id).await? else {
            return Ok(false);
        };
        if !config.enabled {
            return Ok(false);
        }
        let Some(secret_encrypted) = config.secret_encrypted.as_deref() else {
            return Ok(false);
        };

        let secret = self.secret_encryptor.decrypt(secret_encrypted)?;
        self.totp_provider
            .verify_code(&secret, token, unix_seconds(now))
    }

    async fn record_verification(
        &self,
        user_id: &str,
        method: MfaMethod,
        verified: bool,
        ip_address: Option<&str>,
        now: DateTime<Utc>,
    ) -> MfaVerification {
        let verification = MfaVerification {
            user_id: user_id.to_owned(),
            method,
            verified,
            timestamp: now,
            ip_address: ip_address.map(str::to_owned),
        };

        if let Err(append_error) = self
            .repository
            .append_verification(verification.clone())
            .await
        {
            error!(user_id, error = %append_error, "failed to record verification attempt");
        }

        let outcome = if verified { "success" } else { "failure" };
        metrics::counter!(
            "mfa_verifications_total",
            "method" => method.as_str(),
            "outcome" => outcome
        )
        .increment(1);

        if verified {
            info!(user_id, method = method.as_str(), "second factor verified");
        } else {
            warn!(user_id, method = method.as_str(), "second factor rejected");
        }

        self.audit_log
            .log(
                AuditLogInput::new(user_id, AuditAction::MfaVerified, "mfa")
                    .resource_id(user_id)
                    .status(if verified {
                        AuditStatus::Success
                    } else {
                        AuditStatus::Failure
                    })
                    .details(json!({ "method": method.as_str() }))
                    .context(RequestContext::new(ip_address.map(str::to_owned), None)),
            )
            .await;

        verification
    }
}
