use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::info;

use warden_application::AuditLogRepository;
use warden_core::AppResult;
use warden_domain::{AuditAction, AuditLogEntry, AuditLogQuery};

/// Capacity limits for [`InMemoryAuditLogRepository`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditLogSettings {
    /// Entries kept before the oldest are pruned.
    pub max_entries: usize,
    /// Entries dropped per capacity prune.
    pub prune_batch: usize,
}

impl Default for AuditLogSettings {
    fn default() -> Self {
        Self {
            max_entries: 100_000,
            prune_batch: 1_000,
        }
    }
}

#[derive(Debug, Clone)]
struct StoredEntry {
    sequence: u64,
    entry: AuditLogEntry,
}

/// Arena of entries in insertion order plus position indexes.
///
/// Indexes hold arena positions and are rebuilt whenever entries are
/// removed, so they never point past the arena.
#[derive(Debug, Default)]
struct AuditArena {
    entries: Vec<StoredEntry>,
    next_sequence: u64,
    by_user: HashMap<String, Vec<usize>>,
    by_action: HashMap<AuditAction, Vec<usize>>,
    by_resource_type: HashMap<String, Vec<usize>>,
}

impl AuditArena {
    fn push(&mut self, entry: AuditLogEntry) {
        let position = self.entries.len();
        self.index(position, &entry);
        self.entries.push(StoredEntry {
            sequence: self.next_sequence,
            entry,
        });
        self.next_sequence += 1;
    }

    fn index(&mut self, position: usize, entry: &AuditLogEntry) {
        self.by_user
            .entry(entry.user_id.clone())
            .or_default()
            .push(position);
        self.by_action
            .entry(entry.action)
            .or_default()
            .push(position);
        self.by_resource_type
            .entry(entry.resource_type.clone())
            .or_default()
            .push(position);
    }

    fn rebuild_indexes(&mut self) {
        self.by_user.clear();
        self.by_action.clear();
        self.by_resource_type.clear();

        let entries = std::mem::take(&mut self.entries);
        for (position, stored) in entries.iter().enumerate() {
            self.index(position, &stored.entry);
        }
        self.entries = entries;
    }

    fn drop_oldest(&mut self, count: usize) -> usize {
        let count = count.min(self.entries.len());
        self.entries.drain(..count);
        self.rebuild_indexes();
        count
    }

    fn drop_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|stored| stored.entry.timestamp >= cutoff);
        let removed = before - self.entries.len();
        if removed > 0 {
            self.rebuild_indexes();
        }
        removed
    }

    /// Returns the smallest indexed candidate set for the query, or `None`
    /// when no indexed filter is set.
    fn candidates(&self, query: &AuditLogQuery) -> Option<&[usize]> {
        const NONE: &[usize] = &[];

        let user = query
            .user_id
            .as_ref()
            .map(|user_id| self.by_user.get(user_id).map_or(NONE, Vec::as_slice));
        let action = query
            .action
            .map(|action| self.by_action.get(&action).map_or(NONE, Vec::as_slice));
        let resource_type = query.resource_type.as_ref().map(|resource_type| {
            self.by_resource_type
                .get(resource_type)
                .map_or(NONE, Vec::as_slice)
        });

        [user, action, resource_type]
            .into_iter()
            .flatten()
            .min_by_key(|positions| positions.len())
    }

    fn select(&self, query: &AuditLogQuery) -> Vec<AuditLogEntry> {
        let mut matching: Vec<&StoredEntry> = match self.candidates(query) {
            Some(positions) => positions
                .iter()
                .filter_map(|position| self.entries.get(*position))
                .filter(|stored| query.matches(&stored.entry))
                .collect(),
            None => self
                .entries
                .iter()
                .filter(|stored| query.matches(&stored.entry))
                .collect(),
        };

        matching.sort_by(|left, right| {
            right
                .entry
                .timestamp
                .cmp(&left.entry.timestamp)
                .then_with(|| right.sequence.cmp(&left.sequence))
        });

        query.paginate(matching.into_iter().map(|stored| stored.entry.clone()).collect())
    }
}

/// Bounded in-process audit store.
///
/// Appends past `max_entries` drop the oldest `prune_batch` entries and
/// rebuild every index under the same write lock.
#[derive(Debug)]
pub struct InMemoryAuditLogRepository {
    arena: RwLock<AuditArena>,
    settings: AuditLogSettings,
}

impl InMemoryAuditLogRepository {
    /// Creates an empty store with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(AuditLogSettings::default())
    }

    /// Creates an empty store with explicit capacity limits.
    #[must_use]
    pub fn with_settings(settings: AuditLogSettings) -> Self {
        Self {
            arena: RwLock::new(AuditArena::default()),
            settings,
        }
    }
}

impl Default for InMemoryAuditLogRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditLogRepository for InMemoryAuditLogRepository {
    async fn append_entry(&self, entry: AuditLogEntry) -> AppResult<()> {
        let mut arena = self.arena.write().await;
        arena.push(entry);

        if arena.entries.len() > self.settings.max_entries {
            let overflow = arena.entries.len() - self.settings.max_entries;
            let pruned = arena.drop_oldest(self.settings.prune_batch.max(overflow));
            metrics::counter!("audit_log_entries_pruned_total", "reason" => "capacity")
                .increment(u64::try_from(pruned).unwrap_or(u64::MAX));
            info!(
                pruned,
                retained = arena.entries.len(),
                "audit store reached capacity; pruned oldest entries"
            );
        }

        Ok(())
    }

    async fn query_entries(&self, query: &AuditLogQuery) -> AppResult<Vec<AuditLogEntry>> {
        Ok(self.arena.read().await.select(query))
    }

    async fn purge_entries_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let removed = self.arena.write().await.drop_before(cutoff);
        Ok(u64::try_from(removed).unwrap_or(u64::MAX))
    }

    async fn count_entries(&self) -> AppResult<u64> {
        Ok(u64::try_from(self.arena.read().await.entries.len()).unwrap_or(u64::MAX))
    }
}
