//! Warden audit retention worker.

#![forbid(unsafe_code)]

mod config;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use warden_application::{AuditLogInput, AuditLogService};
use warden_core::{AppError, AppResult, SystemClock};
use warden_domain::AuditAction;
use warden_infrastructure::{DeadLetterAuditSink, PostgresAuditLogRepository};

use crate::config::WorkerConfig;

const WORKER_PRINCIPAL: &str = "system:retention-worker";

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::from_env()?;
    let pool = connect_and_migrate(config.database_url.as_str()).await?;
    let audit_log = AuditLogService::new(
        Arc::new(PostgresAuditLogRepository::new(pool)),
        Arc::new(DeadLetterAuditSink::default()),
        Arc::new(SystemClock),
    );

    info!(
        retention_days = config.retention_days,
        purge_interval_seconds = config.purge_interval_seconds,
        run_once = config.run_once,
        "warden-worker started"
    );

    loop {
        if let Err(error) = purge_pass(&audit_log, config.retention_days).await {
            warn!(error = %error, "audit retention pass failed");
        }

        if config.run_once {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_secs(config.purge_interval_seconds)).await;
    }
}

async fn purge_pass(audit_log: &AuditLogService, retention_days: u32) -> AppResult<u64> {
    let removed = audit_log.clear_old_logs(retention_days).await?;
    info!(removed, retention_days, "audit retention pass complete");

    if removed > 0 {
        audit_log
            .log(
                AuditLogInput::new(WORKER_PRINCIPAL, AuditAction::AdminAction, "audit_log")
                    .details(json!({
                        "operation": "retention_purge",
                        "removed": removed,
                        "retention_days": retention_days,
                    })),
            )
            .await;
    }

    Ok(removed)
}

async fn connect_and_migrate(database_url: &str) -> AppResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))?;

    sqlx::migrate!("../../crates/infrastructure/migrations")
        .run(&pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

    Ok(pool)
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
