use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Substituted for listings that do not carry a usable image.
pub const PLACEHOLDER_IMAGE_URL: &str = "https://via.placeholder.com/400x200?text=Event";

/// One freshly scraped, not-yet-persisted event observation.
///
/// `event_url` is the natural key: unique across the whole store and stable
/// across runs for the same real-world event. Adapters must discard items
/// they cannot produce it for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapedEvent {
    pub title: String,
    pub venue: Option<String>,
    pub occurs_at: Option<DateTime<Utc>>,
    pub image_url: Option<String>,
    pub source_id: String,
    pub event_url: String,
}

/// Persistent event record, one per distinct `event_url` ever observed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: Uuid,
    pub event_url: String,
    pub title: String,
    pub venue: Option<String>,
    pub occurs_at: Option<DateTime<Utc>>,
    pub image_url: String,
    pub source_id: String,
    pub status: EventStatus,
    pub last_scraped_at: DateTime<Utc>,
    pub imported_at: Option<DateTime<Utc>>,
    pub imported_by: Option<String>,
}

/// Lifecycle status of a stored event.
///
/// Reconciliation drives every transition except `Imported`, which only the
/// curation action sets. A run never reverts `Imported` silently; it moves
/// re-observed curated records to `Updated` so the change is visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    New,
    Updated,
    Inactive,
    Imported,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::New => "new",
            EventStatus::Updated => "updated",
            EventStatus::Inactive => "inactive",
            EventStatus::Imported => "imported",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventStatus {
    type Err = AggregatorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "new" => Ok(EventStatus::New),
            "updated" => Ok(EventStatus::Updated),
            "inactive" => Ok(EventStatus::Inactive),
            "imported" => Ok(EventStatus::Imported),
            other => Err(AggregatorError::General(format!(
                "unknown event status '{}'",
                other
            ))),
        }
    }
}

/// Per-source result of one aggregation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum SourceOutcome {
    Succeeded { items: usize },
    Failed { reason: String },
}

impl SourceOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SourceOutcome::Succeeded { .. })
    }
}

/// Output of one aggregation pass: the merged candidate list plus the
/// per-source report the reconciler uses to scope the staleness pass.
#[derive(Debug, Default)]
pub struct Harvest {
    pub candidates: Vec<ScrapedEvent>,
    pub report: BTreeMap<String, SourceOutcome>,
}

impl Harvest {
    pub fn succeeded_sources(&self) -> Vec<String> {
        self.report
            .iter()
            .filter(|(_, outcome)| outcome.is_success())
            .map(|(id, _)| id.clone())
            .collect()
    }
}

/// What one pipeline run did, surfaced to the trigger layer.
///
/// A run where every source failed reports zero counts with every source
/// marked failed, which is distinguishable from a quiet run where the
/// sources answered and nothing changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_scraped: usize,
    pub created: u64,
    pub updated: u64,
    pub marked_inactive: u64,
    pub failed_writes: u64,
    pub sources: BTreeMap<String, SourceOutcome>,
}

impl RunSummary {
    pub fn sources_failed(&self) -> usize {
        self.sources
            .values()
            .filter(|outcome| !outcome.is_success())
            .count()
    }
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_redirects: usize,
    /// Upper bound on one adapter's whole fetch-and-parse; a source that
    /// exceeds it is treated as failed for the run.
    pub source_timeout_seconds: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64)".to_string(),
            timeout_seconds: 30,
            max_redirects: 5,
            source_timeout_seconds: 45,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Event not found: {id}")]
    EventNotFound { id: Uuid },

    #[error("Source {source_name} timed out after {seconds}s")]
    SourceTimeout { source_name: String, seconds: u64 },

    #[error("General error: {0}")]
    General(String),
}

pub type Result<T> = std::result::Result<T, AggregatorError>;
