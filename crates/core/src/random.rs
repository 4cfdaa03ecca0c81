use crate::{AppError, AppResult};

/// Source of cryptographically secure random bytes.
pub trait SecureRandom: Send + Sync {
    /// Fills `dest` with random bytes.
    fn fill_bytes(&self, dest: &mut [u8]) -> AppResult<()>;
}

/// Operating-system CSPRNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsSecureRandom;

impl SecureRandom for OsSecureRandom {
    fn fill_bytes(&self, dest: &mut [u8]) -> AppResult<()> {
        getrandom::fill(dest)
            .map_err(|error| AppError::Internal(format!("failed to read OS randomness: {error}")))
    }
}
