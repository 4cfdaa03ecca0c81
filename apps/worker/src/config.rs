use std::env;
use std::str::FromStr;

use warden_core::{AppError, AppResult};

/// Runtime settings for the retention worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    pub database_url: String,
    pub retention_days: u32,
    pub purge_interval_seconds: u64,
    pub run_once: bool,
}

impl WorkerConfig {
    pub fn from_env() -> AppResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let database_url = lookup("DATABASE_URL")
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| AppError::Validation("DATABASE_URL is required".to_owned()))?;
        let retention_days = parse_or(&lookup, "AUDIT_RETENTION_DAYS", 90_u32)?;
        let purge_interval_seconds = parse_or(&lookup, "AUDIT_PURGE_INTERVAL_SECONDS", 3_600_u64)?;
        let run_once = parse_or(&lookup, "WARDEN_WORKER_RUN_ONCE", false)?;

        if retention_days == 0 {
            return Err(AppError::Validation(
                "AUDIT_RETENTION_DAYS must be greater than zero".to_owned(),
            ));
        }

        if purge_interval_seconds == 0 {
            return Err(AppError::Validation(
                "AUDIT_PURGE_INTERVAL_SECONDS must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            database_url,
            retention_days,
            purge_interval_seconds,
            run_once,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> AppResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(value) => value.trim().parse::<T>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests;
