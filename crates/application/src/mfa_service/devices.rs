use chrono::Duration;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{error, info};

use warden_core::{AppError, AppResult, RequestContext};
use warden_domain::{AuditAction, DeviceTrust};

use super::MfaService;
use crate::AuditLogInput;

/// Derives a stable device id from the client address and user agent.
#[must_use]
pub fn derive_device_id(ip_address: &str, user_agent: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ip_address.as_bytes());
    hasher.update([0u8]);
    hasher.update(user_agent.as_bytes());

    hex::encode(&hasher.finalize()[..16])
}

impl MfaService {
    /// Remembers a device for `days` (the configured default when `None`).
    pub async fn trust_device(
        &self,
        user_id: &str,
        device_name: &str,
        ip_address: &str,
        user_agent: &str,
        days: Option<u32>,
    ) -> AppResult<DeviceTrust> {
        let days = days.unwrap_or(self.settings.device_trust_days);
        if days == 0 {
            return Err(AppError::Validation(
                "device trust must last at least one day".to_owned(),
            ));
        }

        let now = self.clock.now();
        let trusted_until = now
            .checked_add_signed(Duration::days(i64::from(days)))
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "device trust of {days} days runs past the latest timestamp"
                ))
            })?;
        let device = DeviceTrust {
            user_id: user_id.to_owned(),
            device_id: derive_device_id(ip_address, user_agent),
            device_name: device_name.to_owned(),
            ip_address: ip_address.to_owned(),
            user_agent: user_agent.to_owned(),
            trusted_at: now,
            trusted_until,
            last_used: now,
        };
        self.repository.save_device(device.clone()).await?;

        info!(user_id, device_id = %device.device_id, days, "trusted device");
        self.audit_log
            .log(
                AuditLogInput::new(user_id, AuditAction::DeviceTrusted, "device")
                    .resource_id(device.device_id.as_str())
                    .resource_name(device_name)
                    .details(json!({ "trustedUntil": device.trusted_until }))
                    .context(RequestContext::new(
                        Some(ip_address.to_owned()),
                        Some(user_agent.to_owned()),
                    )),
            )
            .await;

        Ok(device)
    }

    /// Returns whether the device behind `(ip_address, user_agent)` is still trusted.
    ///
    /// Never fails; storage errors resolve to `false`.
    pub async fn is_device_trusted(&self, user_id: &str, ip_address: &str, user_agent: &str) -> bool {
        let device_id = derive_device_id(ip_address, user_agent);
        let now = self.clock.now();

        let device = match self.repository.find_device(user_id, &device_id).await {
            Ok(device) => device,
            Err(lookup_error) => {
                error!(user_id, error = %lookup_error, "failed to load trusted device");
                return false;
            }
        };
        if !device.is_some_and(|device| device.is_active(now)) {
            return false;
        }

        if let Err(touch_error) = self.repository.touch_device(user_id, &device_id, now).await {
            error!(user_id, error = %touch_error, "failed to stamp trusted device use");
        }
        true
    }

    /// Forgets a remembered device.
    pub async fn revoke_device_trust(&self, user_id: &str, device_id: &str) -> AppResult<bool> {
        let removed = self.repository.remove_device(user_id, device_id).await?;

        if removed {
            info!(user_id, device_id, "revoked device trust");
            self.audit_log
                .log(
                    AuditLogInput::new(user_id, AuditAction::DeviceRevoked, "device")
                        .resource_id(device_id),
                )
                .await;
        }

        Ok(removed)
    }

    /// Returns devices whose trust has not lapsed.
    pub async fn trusted_devices(&self, user_id: &str) -> AppResult<Vec<DeviceTrust>> {
        let now = self.clock.now();
        let mut devices = self.repository.list_devices(user_id).await?;
        devices.retain(|device| device.is_active(now));
        Ok(devices)
    }
}
