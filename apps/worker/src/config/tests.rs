use std::collections::HashMap;

use warden_core::AppError;

use super::WorkerConfig;

fn load(pairs: &[(&str, &str)]) -> Result<WorkerConfig, AppError> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
        .collect();
    WorkerConfig::from_lookup(|name| vars.get(name).cloned())
}

#[test]
fn defaults_apply_when_only_the_database_is_set() {
    let config = load(&[("DATABASE_URL", "postgres://localhost/warden")])
        .unwrap_or_else(|error| panic!("config should load: {error}"));

    assert_eq!(config.retention_days, 90);
    assert_eq!(config.purge_interval_seconds, 3_600);
    assert!(!config.run_once);
}

#[test]
fn overrides_are_parsed() {
    let config = load(&[
        ("DATABASE_URL", "postgres://localhost/warden"),
        ("AUDIT_RETENTION_DAYS", "30"),
        ("AUDIT_PURGE_INTERVAL_SECONDS", " 60 "),
        ("WARDEN_WORKER_RUN_ONCE", "true"),
    ])
    .unwrap_or_else(|error| panic!("config should load: {error}"));

    assert_eq!(config.retention_days, 30);
    assert_eq!(config.purge_interval_seconds, 60);
    assert!(config.run_once);
}

#[test]
fn missing_database_url_is_rejected() {
    assert!(matches!(load(&[]), Err(AppError::Validation(_))));
    assert!(matches!(
        load(&[("DATABASE_URL", "  ")]),
        Err(AppError::Validation(_))
    ));
}

#[test]
fn zero_and_malformed_values_are_rejected() {
    for (name, value) in [
        ("AUDIT_RETENTION_DAYS", "0"),
        ("AUDIT_RETENTION_DAYS", "ninety"),
        ("AUDIT_PURGE_INTERVAL_SECONDS", "0"),
        ("WARDEN_WORKER_RUN_ONCE", "yes"),
    ] {
        let result = load(&[("DATABASE_URL", "postgres://localhost/warden"), (name, value)]);
        assert!(
            matches!(result, Err(AppError::Validation(_))),
            "{name}={value} should be rejected"
        );
    }
}
