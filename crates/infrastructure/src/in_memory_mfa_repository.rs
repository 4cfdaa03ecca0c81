use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use warden_application::MfaRepository;
use warden_core::AppResult;
use warden_domain::{DeviceTrust, MfaConfig, MfaVerification};

#[derive(Debug, Default)]
struct MfaStore {
    configs: HashMap<String, MfaConfig>,
    verifications: HashMap<String, Vec<MfaVerification>>,
    devices: HashMap<String, HashMap<String, DeviceTrust>>,
}

/// In-process second-factor store.
///
/// One write lock guards every principal's state, so backup code
/// consumption is a single check-and-remove.
#[derive(Debug, Default)]
pub struct InMemoryMfaRepository {
    store: RwLock<MfaStore>,
}

impl InMemoryMfaRepository {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MfaRepository for InMemoryMfaRepository {
    async fn find_config(&self, user_id: &str) -> AppResult<Option<MfaConfig>> {
        Ok(self.store.read().await.configs.get(user_id).cloned())
    }

    async fn save_config(&self, config: MfaConfig) -> AppResult<()> {
        self.store
            .write()
            .await
            .configs
            .insert(config.user_id.clone(), config);
        Ok(())
    }

    async fn set_enabled(&self, user_id: &str, enabled: bool) -> AppResult<bool> {
        let mut store = self.store.write().await;
        let Some(config) = store.configs.get_mut(user_id) else {
            return Ok(false);
        };

        config.enabled = enabled;
        Ok(true)
    }

    async fn replace_backup_codes(
        &self,
        user_id: &str,
        code_hashes: Vec<String>,
    ) -> AppResult<bool> {
        let mut store = self.store.write().await;
        let Some(config) = store.configs.get_mut(user_id) else {
            return Ok(false);
        };

        config.backup_code_hashes = code_hashes;
        Ok(true)
    }

    async fn consume_backup_code(
        &self,
        user_id: &str,
        code_hash: &str,
        used_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut store = self.store.write().await;
        let Some(config) = store.configs.get_mut(user_id).filter(|config| config.enabled) else {
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
        if let Some(config) = self.store.write().await.configs.get_mut(user_id) {
            config.last_used = Some(used_at);
        }
        Ok(())
    }

    async fn append_verification(&self, verification: MfaVerification) -> AppResult<()> {
        self.store
            .write()
            .await
            .verifications
            .entry(verification.user_id.clone())
            .or_default()
            .push(verification);
        Ok(())
    }

    async fn list_verifications(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> AppResult<Vec<MfaVerification>> {
        let store = self.store.read().await;
        let Some(history) = store.verifications.get(user_id) else {
            return Ok(Vec::new());
        };

        Ok(history
            .iter()
            .rev()
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn save_device(&self, device: DeviceTrust) -> AppResult<()> {
        self.store
            .write()
            .await
            .devices
            .entry(device.user_id.clone())
            .or_default()
            .insert(device.device_id.clone(), device);
        Ok(())
    }

    async fn find_device(&self, user_id: &str, device_id: &str) -> AppResult<Option<DeviceTrust>> {
        Ok(self
            .store
            .read()
            .await
            .devices
            .get(user_id)
            .and_then(|devices| devices.get(device_id))
            .cloned())
    }

    async fn touch_device(
        &self,
        user_id: &str,
        device_id: &str,
        used_at: DateTime<Utc>,
    ) -> AppResult<()> {
        if let Some(device) = self
            .store
            .write()
            .await
            .devices
            .get_mut(user_id)
            .and_then(|devices| devices.get_mut(device_id))
        {
            device.last_used = used_at;
        }
        Ok(())
    }

    async fn remove_device(&self, user_id: &str, device_id: &str) -> AppResult<bool> {
        Ok(self
            .store
            .write()
            .await
            .devices
            .get_mut(user_id)
            .is_some_and(|devices| devices.remove(device_id).is_some()))
    }

    async fn list_devices(&self, user_id: &str) -> AppResult<Vec<DeviceTrust>> {
        let mut devices: Vec<DeviceTrust> = self
            .store
            .read()
            .await
            .devices
            .get(user_id)
            .map(|devices| devices.values().cloned().collect())
            .unwrap_or_default();
        devices.sort_by(|left, right| left.trusted_at.cmp(&right.trusted_at));
        Ok(devices)
    }
}
