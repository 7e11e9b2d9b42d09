use crate::types::{Result, ScrapedEvent};
use async_trait::async_trait;

/// Contract for pulling event listings from one external provider.
///
/// Markup parsing specifics are adapter-internal; the aggregator only sees
/// this interface, so it stays agnostic of how many adapters exist and what
/// each one scrapes.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Stable identifier recorded on every candidate this source emits.
    fn source_id(&self) -> &str;

    /// Human-readable name for logs and reports.
    fn source_name(&self) -> &str;

    /// Fetch and parse the provider's current listings.
    ///
    /// Fails as a unit on network errors or an unexpected page shape.
    /// Individual malformed entries are skipped, not raised; whatever valid
    /// items were parsed are still returned. No retry happens here.
    async fn fetch(&self) -> Result<Vec<ScrapedEvent>>;
}
