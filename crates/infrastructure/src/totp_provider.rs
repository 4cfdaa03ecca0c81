//! TOTP provider implementation using the `totp-rs` crate.

use async_trait::async_trait;
use totp_rs::{Algorithm, TOTP};

use warden_application::TotpProvider;
use warden_core::{AppError, AppResult};
use warden_domain::{TOTP_DIGITS, TOTP_SKEW_STEPS, TOTP_STEP_SECONDS};

/// RFC 6238 provider: HMAC-SHA1, 6 digits, 30-second step, one step of skew.
#[derive(Debug, Clone, Copy, Default)]
pub struct TotpRsProvider;

impl TotpRsProvider {
    fn totp(secret: &[u8], issuer: Option<&str>, account_name: &str) -> AppResult<TOTP> {
        TOTP::new(
            Algorithm::SHA1,
            TOTP_DIGITS,
            TOTP_SKEW_STEPS,
            TOTP_STEP_SECONDS,
            secret.to_vec(),
            issuer.map(str::to_owned),
            account_name.to_owned(),
        )
        .map_err(|error| AppError::Internal(format!("failed to create TOTP instance: {error}")))
    }
}

#[async_trait]
impl TotpProvider for TotpRsProvider {
    fn provisioning(
        &self,
        secret: &[u8],
        issuer: &str,
        account_name: &str,
    ) -> AppResult<(String, String)> {
        let totp = Self::totp(secret, Some(issuer), account_name)?;
        Ok((totp.get_secret_base32(), totp.get_url()))
    }

    fn generate_code(&self, secret: &[u8], unix_seconds: u64) -> AppResult<String> {
        Ok(Self::totp(secret, None, "")?.generate(unix_seconds))
    }

    fn verify_code(&self, secret: &[u8], code: &str, unix_seconds: u64) -> AppResult<bool> {
        Ok(Self::totp(secret, None, "")?.check(code, unix_seconds))
    }
}
