use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::info;

use warden_core::{AppError, AppResult, SecureRandom};
use warden_domain::{
    AuditAction, BACKUP_CODE_ALPHABET, BACKUP_CODE_COUNT, BACKUP_CODE_LENGTH,
    normalize_backup_code,
};

use crate::AuditLogInput;

use super::MfaService;

/// Draws [`BACKUP_CODE_COUNT`] distinct codes of [`BACKUP_CODE_LENGTH`] symbols.
///
/// Bytes at or above the largest multiple of the alphabet size are
/// rejected so every symbol is equally likely.
pub(super) fn generate_backup_codes(random: &dyn SecureRandom) -> AppResult<Vec<String>> {
    let alphabet_len = BACKUP_CODE_ALPHABET.len();
    let acceptance_limit = 256 - 256 % alphabet_len;

    let mut codes: Vec<String> = Vec::with_capacity(BACKUP_CODE_COUNT);
    let mut current = String::with_capacity(BACKUP_CODE_LENGTH);
    let mut buffer = [0u8; 64];

    while codes.len() < BACKUP_CODE_COUNT {
        random.fill_bytes(&mut buffer)?;
        for byte in buffer.iter().map(|byte| usize::from(*byte)) {
            if byte >= acceptance_limit {
                continue;
            }
            current.push(char::from(BACKUP_CODE_ALPHABET[byte % alphabet_len]));

            if current.len() == BACKUP_CODE_LENGTH {
                let code = std::mem::take(&mut current);
                if !codes.contains(&code) {
                    codes.push(code);
                }
                if codes.len() == BACKUP_CODE_COUNT {
                    break;
                }
            }
        }
    }

    Ok(codes)
}

/// Hashes a backup code after normalization.
pub(super) fn hash_backup_code(code: &str) -> String {
    hex::encode(Sha256::digest(normalize_backup_code(code).as_bytes()))
}

pub(super) fn hash_backup_codes(codes: &[String]) -> Vec<String> {
    codes.iter().map(|code| hash_backup_code(code)).collect()
}

impl MfaService {
    /// Replaces every backup code; old codes stop working immediately.
    ///
    /// Fails with `NotFound` when the principal never enrolled.
    pub async fn regenerate_backup_codes(&self, user_id: &str) -> AppResult<Vec<String>> {
        let codes = generate_backup_codes(self.random.as_ref())?;
        let replaced = self
            .repository
            .replace_backup_codes(user_id, hash_backup_codes(&codes))
            .await?;

        if !replaced {
            return Err(AppError::NotFound(format!(
                "no second-factor configuration for '{user_id}'"
            )));
        }

        info!(user_id, "regenerated backup codes");
        self.audit_log
            .log(
                AuditLogInput::new(user_id, AuditAction::BackupCodesRegenerated, "mfa")
                    .resource_id(user_id)
                    .details(json!({ "count": codes.len() })),
            )
            .await;

        Ok(codes)
    }
}
