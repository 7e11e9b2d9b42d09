use crate::store::EventStore;
use crate::types::{
    EventRecord, EventStatus, Harvest, Result, RunSummary, ScrapedEvent, PLACEHOLDER_IMAGE_URL,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Diffs one run's candidates against the store: creates unseen keys,
/// refreshes known ones, and marks records missing from a healthy source
/// inactive. Best-effort throughout; an individual write failure is counted
/// in the summary and never aborts the rest of the batch.
pub struct Reconciler {
    store: Arc<dyn EventStore>,
}

enum Applied {
    Created,
    Updated,
}

impl Reconciler {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    pub async fn reconcile(&self, harvest: Harvest) -> RunSummary {
        let succeeded = harvest.succeeded_sources();
        let Harvest { candidates, report } = harvest;
        let total_scraped = candidates.len();
        let deduped = dedup_by_url(candidates);

        let mut summary = RunSummary {
            total_scraped,
            created: 0,
            updated: 0,
            marked_inactive: 0,
            failed_writes: 0,
            sources: report,
        };

        for candidate in &deduped {
            match self.apply_candidate(candidate).await {
                Ok(Applied::Created) => summary.created += 1,
                Ok(Applied::Updated) => summary.updated += 1,
                Err(e) => {
                    warn!("Failed to persist {}: {}", candidate.event_url, e);
                    summary.failed_writes += 1;
                }
            }
        }

        // Absence of data must never read as absence of events: an empty
        // run marks nothing stale, and failed sources are excluded below.
        if deduped.is_empty() {
            debug!("No candidates this run; skipping staleness pass");
        } else {
            let seen: Vec<String> = deduped
                .iter()
                .map(|candidate| candidate.event_url.clone())
                .collect();

            match self.store.mark_missing_inactive(&seen, &succeeded).await {
                Ok(count) => summary.marked_inactive = count,
                Err(e) => {
                    warn!("Staleness pass failed: {}", e);
                    summary.failed_writes += 1;
                }
            }
        }

        info!(
            "Reconciled {} candidates: {} created, {} updated, {} marked inactive, {} source(s) failed",
            total_scraped,
            summary.created,
            summary.updated,
            summary.marked_inactive,
            summary.sources_failed()
        );

        summary
    }

    async fn apply_candidate(&self, candidate: &ScrapedEvent) -> Result<Applied> {
        let now = Utc::now();

        match self.store.find_by_url(&candidate.event_url).await? {
            Some(mut existing) => {
                existing.title = candidate.title.clone();
                existing.venue = candidate.venue.clone();
                // A source without structured dates must not erase a date
                // learned earlier.
                if candidate.occurs_at.is_some() {
                    existing.occurs_at = candidate.occurs_at;
                }
                existing.image_url = candidate
                    .image_url
                    .clone()
                    .unwrap_or_else(|| PLACEHOLDER_IMAGE_URL.to_string());
                existing.source_id = candidate.source_id.clone();
                existing.last_scraped_at = now;

                // Re-observing a curated record surfaces it for re-review;
                // every other status is left alone.
                if existing.status == EventStatus::Imported {
                    existing.status = EventStatus::Updated;
                }

                self.store.upsert(&existing).await?;
                Ok(Applied::Updated)
            }
            None => {
                let record = EventRecord {
                    id: Uuid::new_v4(),
                    event_url: candidate.event_url.clone(),
                    title: candidate.title.clone(),
                    venue: candidate.venue.clone(),
                    occurs_at: candidate.occurs_at,
                    image_url: candidate
                        .image_url
                        .clone()
                        .unwrap_or_else(|| PLACEHOLDER_IMAGE_URL.to_string()),
                    source_id: candidate.source_id.clone(),
                    status: EventStatus::New,
                    last_scraped_at: now,
                    imported_at: None,
                    imported_by: None,
                };
                self.store.upsert(&record).await?;
                Ok(Applied::Created)
            }
        }
    }
}

/// Collapse duplicate keys within one run: later candidates win on field
/// values, first-seen order is kept.
fn dedup_by_url(candidates: Vec<ScrapedEvent>) -> Vec<ScrapedEvent> {
    let mut order: Vec<String> = Vec::new();
    let mut by_url: HashMap<String, ScrapedEvent> = HashMap::new();

    for candidate in candidates {
        if !by_url.contains_key(&candidate.event_url) {
            order.push(candidate.event_url.clone());
        }
        by_url.insert(candidate.event_url.clone(), candidate);
    }

    order
        .into_iter()
        .filter_map(|url| by_url.remove(&url))
        .collect()
}
