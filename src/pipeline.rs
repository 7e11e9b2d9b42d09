use crate::aggregator::Aggregator;
use crate::reconciler::Reconciler;
use crate::store::EventStore;
use crate::types::RunSummary;
use std::sync::Arc;
use tracing::info;

/// One self-contained scrape-and-reconcile run: fan out to every source,
/// wait for all of them to settle, then reconcile the merged candidates
/// into the store.
///
/// Safe to invoke repeatedly; each run is a pure function of current source
/// data and current store state. Overlapping runs are not coordinated here;
/// the store's per-record upsert atomicity keeps each one individually
/// consistent.
pub struct EventPipeline {
    aggregator: Aggregator,
    reconciler: Reconciler,
}

impl EventPipeline {
    pub fn new(aggregator: Aggregator, store: Arc<dyn EventStore>) -> Self {
        Self {
            aggregator,
            reconciler: Reconciler::new(store),
        }
    }

    pub async fn run(&self) -> RunSummary {
        info!(
            "Pipeline run started with {} source(s)",
            self.aggregator.source_count()
        );
        let harvest = self.aggregator.run_all().await;
        let summary = self.reconciler.reconcile(harvest).await;
        info!("Pipeline run finished");
        summary
    }
}
