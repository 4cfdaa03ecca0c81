use tracing::{error, info};

use warden_core::{AppError, AppResult};
use warden_domain::{AuditAction, MfaState, Permission};

use super::{MfaService, MfaStatus};
use crate::AuditLogInput;

impl MfaService {
    /// Disables the second factor, keeping secret and history for forensics.
    ///
    /// Fails with `NotFound` when the principal never enrolled.
    pub async fn disable_mfa(&self, actor: &str, user_id: &str) -> AppResult<()> {
        if !self.repository.set_enabled(user_id, false).await? {
            return Err(AppError::NotFound(format!(
                "no second-factor configuration for '{user_id}'"
            )));
        }

        info!(user_id, actor, "disabled second factor");
        self.audit_log
            .log(AuditLogInput::new(actor, AuditAction::MfaDisabled, "mfa").resource_id(user_id))
            .await;

        Ok(())
    }

    /// Returns the principal's second-factor state.
    pub async fn mfa_status(&self, user_id: &str) -> AppResult<MfaStatus> {
        let config = self.repository.find_config(user_id).await?;
        let trusted_devices = self.trusted_devices(user_id).await?.len();

        Ok(MfaStatus {
            state: MfaState::of(config.as_ref()),
            method: config.as_ref().map(|config| config.method),
            backup_codes_remaining: config
                .as_ref()
                .map_or(0, |config| config.backup_code_hashes.len()),
            last_used: config.and_then(|config| config.last_used),
            trusted_devices,
        })
    }

    /// Returns whether the principal must enroll before proceeding.
    ///
    /// True when the principal holds `security.mfa_enforce` and has no
    /// enabled second factor. Without an attached [`crate::RbacService`]
    /// nobody is required to enroll.
    pub async fn requires_enrollment(&self, user_id: &str) -> bool {
        let Some(rbac) = &self.enforcement else {
            return false;
        };
        if !rbac
            .has_permission(user_id, Permission::SecurityMfaEnforce, None)
            .await
        {
            return false;
        }

        match self.repository.find_config(user_id).await {
            Ok(config) => MfaState::of(config.as_ref()) != MfaState::Enabled,
            Err(lookup_error) => {
                error!(user_id, error = %lookup_error, "failed to load second-factor config");
                true
            }
        }
    }
}
