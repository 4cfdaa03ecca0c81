use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{error, warn};

use warden_application::AuditFailureSink;
use warden_core::AppError;
use warden_domain::AuditLogEntry;

/// Default number of undelivered entries retained for replay.
pub const DEFAULT_DEAD_LETTER_CAPACITY: usize = 1_024;

/// Bounded in-process holding area for audit entries whose append failed.
///
/// Once full, the oldest held entry is discarded for each new arrival.
#[derive(Debug)]
pub struct DeadLetterAuditSink {
    entries: Mutex<VecDeque<AuditLogEntry>>,
    capacity: usize,
}

impl Default for DeadLetterAuditSink {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_DEAD_LETTER_CAPACITY)
    }
}

impl DeadLetterAuditSink {
    /// Creates a sink holding at most `capacity` entries (minimum one).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            capacity,
        }
    }

    /// Number of held entries.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether nothing is held.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Takes every held entry, oldest first.
    pub async fn drain(&self) -> Vec<AuditLogEntry> {
        self.entries.lock().await.drain(..).collect()
    }
}

#[async_trait]
impl AuditFailureSink for DeadLetterAuditSink {
    async fn record_failure(&self, entry: AuditLogEntry, error: AppError) {
        error!(
            entry_id = %entry.id,
            action = entry.action.as_str(),
            error = %error,
            "holding undelivered audit entry"
        );

        let mut entries = self.entries.lock().await;
        if entries.len() == self.capacity
            && let Some(dropped) = entries.pop_front()
        {
            metrics::counter!("audit_log_dead_letters_dropped_total").increment(1);
            warn!(entry_id = %dropped.id, "dead-letter buffer full, discarding oldest entry");
        }
        entries.push_back(entry);
    }
}
