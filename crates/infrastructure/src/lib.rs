//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod aes_secret_encryptor;
mod dead_letter_audit_sink;
mod in_memory_audit_log_repository;
mod in_memory_mfa_repository;
mod in_memory_rbac_repository;
mod postgres_audit_log_repository;
mod totp_provider;

pub use aes_secret_encryptor::AesSecretEncryptor;
pub use dead_letter_audit_sink::{DEFAULT_DEAD_LETTER_CAPACITY, DeadLetterAuditSink};
pub use in_memory_audit_log_repository::{AuditLogSettings, InMemoryAuditLogRepository};
pub use in_memory_mfa_repository::InMemoryMfaRepository;
pub use in_memory_rbac_repository::InMemoryRbacRepository;
pub use postgres_audit_log_repository::PostgresAuditLogRepository;
pub use totp_provider::TotpRsProvider;

#[cfg(test)]
mod scenarios;
