use chrono::{TimeZone, Utc};
use event_aggregator::{
    EventStatus, EventStore, Harvest, MemoryEventStore, Reconciler, ScrapedEvent, SourceOutcome,
    PLACEHOLDER_IMAGE_URL,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Once};

static INIT: Once = Once::new();

fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .try_init()
            .ok();
    });
}

fn candidate(source: &str, url: &str, title: &str) -> ScrapedEvent {
    ScrapedEvent {
        title: title.to_string(),
        venue: Some("Sydney".to_string()),
        occurs_at: None,
        image_url: None,
        source_id: source.to_string(),
        event_url: url.to_string(),
    }
}

/// Build a harvest where each listed source either succeeded (item count
/// derived from the candidates it contributed) or failed.
fn harvest(sources: &[(&str, bool)], candidates: Vec<ScrapedEvent>) -> Harvest {
    let mut report = BTreeMap::new();
    for (id, succeeded) in sources {
        let outcome = if *succeeded {
            let items = candidates
                .iter()
                .filter(|c| c.source_id == *id)
                .count();
            SourceOutcome::Succeeded { items }
        } else {
            SourceOutcome::Failed {
                reason: "connection refused".to_string(),
            }
        };
        report.insert((*id).to_string(), outcome);
    }
    Harvest { candidates, report }
}

#[tokio::test]
async fn creates_new_records_with_placeholder_image() {
    init_tracing();

    let store = Arc::new(MemoryEventStore::new());
    let reconciler = Reconciler::new(store.clone());

    let summary = reconciler
        .reconcile(harvest(
            &[("eventbrite", true)],
            vec![candidate("eventbrite", "https://ex.com/1", "Jazz Night")],
        ))
        .await;

    assert_eq!(summary.created, 1);
    assert_eq!(summary.updated, 0);
    assert_eq!(summary.failed_writes, 0);
    assert_eq!(store.len().await, 1);

    let record = store.find_by_url("https://ex.com/1").await.unwrap().unwrap();
    assert_eq!(record.status, EventStatus::New);
    assert_eq!(record.title, "Jazz Night");
    assert_eq!(record.image_url, PLACEHOLDER_IMAGE_URL);
    assert!(record.imported_at.is_none());
}

#[tokio::test]
async fn second_run_with_unchanged_candidates_only_refreshes() {
    init_tracing();

    let store = Arc::new(MemoryEventStore::new());
    let reconciler = Reconciler::new(store.clone());

    let first = reconciler
        .reconcile(harvest(
            &[("eventbrite", true)],
            vec![candidate("eventbrite", "https://ex.com/1", "Jazz Night")],
        ))
        .await;
    assert_eq!(first.created, 1);

    let before = store.find_by_url("https://ex.com/1").await.unwrap().unwrap();

    let second = reconciler
        .reconcile(harvest(
            &[("eventbrite", true)],
            vec![candidate("eventbrite", "https://ex.com/1", "Jazz Night")],
        ))
        .await;

    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 1);
    assert_eq!(second.marked_inactive, 0);

    let after = store.find_by_url("https://ex.com/1").await.unwrap().unwrap();
    assert_eq!(after.id, before.id);
    assert_eq!(after.status, EventStatus::New);
    assert!(after.last_scraped_at >= before.last_scraped_at);
}

#[tokio::test]
async fn duplicate_urls_within_one_run_collapse_later_wins() {
    init_tracing();

    let store = Arc::new(MemoryEventStore::new());
    let reconciler = Reconciler::new(store.clone());

    let summary = reconciler
        .reconcile(harvest(
            &[("eventbrite", true)],
            vec![
                candidate("eventbrite", "https://ex.com/1", "Jazz Night"),
                candidate("eventbrite", "https://ex.com/1", "Jazz Night (Late Show)"),
            ],
        ))
        .await;

    assert_eq!(summary.total_scraped, 2);
    assert_eq!(summary.created, 1);
    assert_eq!(store.len().await, 1);

    let record = store.find_by_url("https://ex.com/1").await.unwrap().unwrap();
    assert_eq!(record.title, "Jazz Night (Late Show)");
}

#[tokio::test]
async fn reobserved_imported_record_becomes_updated_and_keeps_import_stamp() {
    init_tracing();

    let store = Arc::new(MemoryEventStore::new());
    let reconciler = Reconciler::new(store.clone());

    reconciler
        .reconcile(harvest(
            &[("eventbrite", true)],
            vec![candidate("eventbrite", "https://ex.com/1", "Jazz Night")],
        ))
        .await;

    let record = store.find_by_url("https://ex.com/1").await.unwrap().unwrap();
    let imported = store.mark_imported(record.id, "admin@example.com").await.unwrap();
    assert_eq!(imported.status, EventStatus::Imported);

    let summary = reconciler
        .reconcile(harvest(
            &[("eventbrite", true)],
            vec![candidate("eventbrite", "https://ex.com/1", "Jazz Night (Rescheduled)")],
        ))
        .await;
    assert_eq!(summary.updated, 1);

    let after = store.find_by_url("https://ex.com/1").await.unwrap().unwrap();
    assert_eq!(after.status, EventStatus::Updated);
    assert_eq!(after.title, "Jazz Night (Rescheduled)");
    assert_eq!(after.imported_at, imported.imported_at);
    assert_eq!(after.imported_by, Some("admin@example.com".to_string()));
}

#[tokio::test]
async fn staleness_pass_skipped_when_all_sources_fail() {
    init_tracing();

    let store = Arc::new(MemoryEventStore::new());
    let reconciler = Reconciler::new(store.clone());

    reconciler
        .reconcile(harvest(
            &[("eventbrite", true)],
            vec![candidate("eventbrite", "https://ex.com/1", "Jazz Night")],
        ))
        .await;

    // Total outage: no candidates, every source failed. Nothing may be
    // marked inactive.
    let summary = reconciler
        .reconcile(harvest(&[("eventbrite", false)], Vec::new()))
        .await;

    assert_eq!(summary.created, 0);
    assert_eq!(summary.updated, 0);
    assert_eq!(summary.marked_inactive, 0);
    assert_eq!(summary.sources_failed(), 1);

    let record = store.find_by_url("https://ex.com/1").await.unwrap().unwrap();
    assert_eq!(record.status, EventStatus::New);
}

#[tokio::test]
async fn staleness_pass_scoped_to_sources_that_succeeded() {
    init_tracing();

    let store = Arc::new(MemoryEventStore::new());
    let reconciler = Reconciler::new(store.clone());

    // Seed: A and B from source x, C from source y.
    reconciler
        .reconcile(harvest(
            &[("x", true), ("y", true)],
            vec![
                candidate("x", "https://ex.com/a", "A"),
                candidate("x", "https://ex.com/b", "B"),
                candidate("y", "https://ex.com/c", "C"),
            ],
        ))
        .await;

    // x succeeds and only returns A; y fails outright.
    let summary = reconciler
        .reconcile(harvest(
            &[("x", true), ("y", false)],
            vec![candidate("x", "https://ex.com/a", "A")],
        ))
        .await;

    assert_eq!(summary.updated, 1);
    assert_eq!(summary.marked_inactive, 1);

    let a = store.find_by_url("https://ex.com/a").await.unwrap().unwrap();
    let b = store.find_by_url("https://ex.com/b").await.unwrap().unwrap();
    let c = store.find_by_url("https://ex.com/c").await.unwrap().unwrap();
    assert_eq!(a.status, EventStatus::New);
    assert_eq!(b.status, EventStatus::Inactive);
    assert_eq!(c.status, EventStatus::New);
}

#[tokio::test]
async fn successful_source_with_no_items_still_triggers_staleness() {
    init_tracing();

    let store = Arc::new(MemoryEventStore::new());
    let reconciler = Reconciler::new(store.clone());

    reconciler
        .reconcile(harvest(
            &[("x", true), ("y", true)],
            vec![
                candidate("x", "https://ex.com/a", "A"),
                candidate("y", "https://ex.com/c", "C"),
            ],
        ))
        .await;

    // x answers with an empty page while y still yields candidates; x's
    // records really are gone from their source.
    let summary = reconciler
        .reconcile(harvest(
            &[("x", true), ("y", true)],
            vec![candidate("y", "https://ex.com/c", "C")],
        ))
        .await;

    assert_eq!(summary.marked_inactive, 1);
    let a = store.find_by_url("https://ex.com/a").await.unwrap().unwrap();
    assert_eq!(a.status, EventStatus::Inactive);
}

#[tokio::test]
async fn reappearing_inactive_record_is_refreshed_but_stays_inactive() {
    init_tracing();

    let store = Arc::new(MemoryEventStore::new());
    let reconciler = Reconciler::new(store.clone());

    reconciler
        .reconcile(harvest(
            &[("x", true)],
            vec![
                candidate("x", "https://ex.com/a", "A"),
                candidate("x", "https://ex.com/b", "B"),
            ],
        ))
        .await;

    // A disappears for a run and goes inactive.
    reconciler
        .reconcile(harvest(
            &[("x", true)],
            vec![candidate("x", "https://ex.com/b", "B")],
        ))
        .await;
    let a = store.find_by_url("https://ex.com/a").await.unwrap().unwrap();
    assert_eq!(a.status, EventStatus::Inactive);

    // A comes back with new content: content refreshes, status does not
    // resurrect on its own.
    reconciler
        .reconcile(harvest(
            &[("x", true)],
            vec![
                candidate("x", "https://ex.com/a", "A (returned)"),
                candidate("x", "https://ex.com/b", "B"),
            ],
        ))
        .await;

    let a = store.find_by_url("https://ex.com/a").await.unwrap().unwrap();
    assert_eq!(a.title, "A (returned)");
    assert_eq!(a.status, EventStatus::Inactive);
}

#[tokio::test]
async fn candidate_without_date_does_not_erase_known_date() {
    init_tracing();

    let store = Arc::new(MemoryEventStore::new());
    let reconciler = Reconciler::new(store.clone());

    let first_date = Utc.with_ymd_and_hms(2026, 9, 12, 19, 30, 0).unwrap();
    let mut dated = candidate("x", "https://ex.com/a", "A");
    dated.occurs_at = Some(first_date);

    reconciler
        .reconcile(harvest(&[("x", true)], vec![dated]))
        .await;

    // Same listing re-observed without a structured date.
    reconciler
        .reconcile(harvest(
            &[("x", true)],
            vec![candidate("x", "https://ex.com/a", "A")],
        ))
        .await;
    let record = store.find_by_url("https://ex.com/a").await.unwrap().unwrap();
    assert_eq!(record.occurs_at, Some(first_date));

    // A run that does carry a date overwrites it.
    let new_date = Utc.with_ymd_and_hms(2026, 9, 19, 19, 30, 0).unwrap();
    let mut rescheduled = candidate("x", "https://ex.com/a", "A");
    rescheduled.occurs_at = Some(new_date);
    reconciler
        .reconcile(harvest(&[("x", true)], vec![rescheduled]))
        .await;

    let record = store.find_by_url("https://ex.com/a").await.unwrap().unwrap();
    assert_eq!(record.occurs_at, Some(new_date));
}
