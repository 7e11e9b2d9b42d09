use crate::types::{AggregatorError, EventRecord, EventStatus, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Persistence capability consumed by the reconciler.
///
/// Passed in explicitly rather than reached through a process-wide handle,
/// so tests substitute [`MemoryEventStore`] for the SQLite-backed
/// [`EventManager`](crate::EventManager).
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn find_by_url(&self, event_url: &str) -> Result<Option<EventRecord>>;

    /// Atomic insert-or-update keyed by `event_url`. The id assigned at
    /// creation survives later updates.
    async fn upsert(&self, record: &EventRecord) -> Result<()>;

    /// Bulk staleness update: mark records inactive when their key is
    /// absent from `seen_urls` and their source completed successfully this
    /// run. Returns how many records changed status; already-inactive
    /// records are not recounted.
    async fn mark_missing_inactive(
        &self,
        seen_urls: &[String],
        succeeded_sources: &[String],
    ) -> Result<u64>;

    /// Records in any of the given statuses, soonest first with undated
    /// events last. Consumed by the publication and admin listing layers.
    async fn query_by_status(&self, statuses: &[EventStatus]) -> Result<Vec<EventRecord>>;

    /// Curator import: flips the record to `imported` and stamps who did it
    /// and when. The one status mutation not driven by reconciliation.
    async fn mark_imported(&self, id: Uuid, curator: &str) -> Result<EventRecord>;
}

/// In-memory store used by tests and demos.
#[derive(Default)]
pub struct MemoryEventStore {
    records: RwLock<HashMap<String, EventRecord>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn find_by_url(&self, event_url: &str) -> Result<Option<EventRecord>> {
        Ok(self.records.read().await.get(event_url).cloned())
    }

    async fn upsert(&self, record: &EventRecord) -> Result<()> {
        let mut records = self.records.write().await;
        match records.get_mut(&record.event_url) {
            Some(existing) => {
                let id = existing.id;
                *existing = record.clone();
                existing.id = id;
            }
            None => {
                records.insert(record.event_url.clone(), record.clone());
            }
        }
        Ok(())
    }

    async fn mark_missing_inactive(
        &self,
        seen_urls: &[String],
        succeeded_sources: &[String],
    ) -> Result<u64> {
        let mut records = self.records.write().await;
        let mut changed = 0;
        for record in records.values_mut() {
            if record.status != EventStatus::Inactive
                && succeeded_sources.iter().any(|s| *s == record.source_id)
                && !seen_urls.contains(&record.event_url)
            {
                record.status = EventStatus::Inactive;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn query_by_status(&self, statuses: &[EventStatus]) -> Result<Vec<EventRecord>> {
        let records = self.records.read().await;
        let mut matching: Vec<EventRecord> = records
            .values()
            .filter(|record| statuses.contains(&record.status))
            .cloned()
            .collect();
        matching.sort_by(|a, b| match (a.occurs_at, b.occurs_at) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.title.cmp(&b.title),
        });
        Ok(matching)
    }

    async fn mark_imported(&self, id: Uuid, curator: &str) -> Result<EventRecord> {
        let mut records = self.records.write().await;
        let record = records
            .values_mut()
            .find(|record| record.id == id)
            .ok_or(AggregatorError::EventNotFound { id })?;
        record.status = EventStatus::Imported;
        record.imported_at = Some(Utc::now());
        record.imported_by = Some(curator.to_string());
        Ok(record.clone())
    }
}
