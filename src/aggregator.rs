use crate::traits::EventSource;
use crate::types::{AggregatorError, Harvest, ScrapedEvent, SourceOutcome};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// Runs every registered source concurrently and folds their results into
/// one candidate list plus a per-source report.
///
/// Failure is isolated per source: one adapter erroring or timing out never
/// prevents the others from contributing and never fails the run. When all
/// sources fail the harvest is empty with every source reported failed, so
/// the reconciler can tell total outage apart from a quiet run.
pub struct Aggregator {
    sources: Vec<Box<dyn EventSource>>,
    source_timeout: Duration,
}

impl Aggregator {
    pub fn new(source_timeout: Duration) -> Self {
        Self {
            sources: Vec::new(),
            source_timeout,
        }
    }

    pub fn add_source(&mut self, source: Box<dyn EventSource>) {
        info!("Registered source: {}", source.source_name());
        self.sources.push(source);
    }

    pub fn with_source(mut self, source: Box<dyn EventSource>) -> Self {
        self.add_source(source);
        self
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Fetch all sources concurrently; the reconciler starts only after
    /// every source has settled.
    pub async fn run_all(&self) -> Harvest {
        let fetches = self.sources.iter().map(|source| async move {
            let outcome = timeout(self.source_timeout, source.fetch()).await;
            (
                source.source_id().to_string(),
                source.source_name().to_string(),
                outcome,
            )
        });

        let mut candidates: Vec<ScrapedEvent> = Vec::new();
        let mut report = BTreeMap::new();

        for (source_id, source_name, outcome) in join_all(fetches).await {
            match outcome {
                Ok(Ok(items)) => {
                    info!("Source {} yielded {} candidates", source_name, items.len());
                    report.insert(source_id, SourceOutcome::Succeeded { items: items.len() });
                    candidates.extend(items);
                }
                Ok(Err(e)) => {
                    error!("Source {} failed: {}", source_name, e);
                    report.insert(
                        source_id,
                        SourceOutcome::Failed {
                            reason: e.to_string(),
                        },
                    );
                }
                Err(_) => {
                    let e = AggregatorError::SourceTimeout {
                        source_name,
                        seconds: self.source_timeout.as_secs(),
                    };
                    error!("{}", e);
                    report.insert(
                        source_id,
                        SourceOutcome::Failed {
                            reason: e.to_string(),
                        },
                    );
                }
            }
        }

        if !report.is_empty() && report.values().all(|outcome| !outcome.is_success()) {
            warn!("All {} sources failed this run", report.len());
        }

        Harvest { candidates, report }
    }
}
