use crate::fetcher::PageFetcher;
use crate::traits::EventSource;
use crate::types::{Result, ScrapedEvent};
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

pub const SOURCE_ID: &str = "eventbrite";

const SYDNEY_LISTING_URL: &str = "https://www.eventbrite.com/d/australia--sydney/events/";

/// Scrapes one Eventbrite city listing page.
///
/// The listing page exposes no structured dates, so candidates carry
/// `occurs_at = None` and the venue is the city the listing covers.
pub struct EventbriteSource {
    listing_url: Url,
    venue: String,
    fetcher: Arc<PageFetcher>,
}

impl EventbriteSource {
    pub fn new(listing_url: Url, venue: impl Into<String>, fetcher: Arc<PageFetcher>) -> Self {
        Self {
            listing_url,
            venue: venue.into(),
            fetcher,
        }
    }

    /// The reference deployment: public Sydney listings.
    pub fn sydney(fetcher: Arc<PageFetcher>) -> Self {
        let listing_url = Url::parse(SYDNEY_LISTING_URL).expect("valid listing URL");
        Self::new(listing_url, "Sydney", fetcher)
    }
}

#[async_trait]
impl EventSource for EventbriteSource {
    fn source_id(&self) -> &str {
        SOURCE_ID
    }

    fn source_name(&self) -> &str {
        "Eventbrite"
    }

    async fn fetch(&self) -> Result<Vec<ScrapedEvent>> {
        let body = self.fetcher.fetch_page(self.listing_url.as_str()).await?;
        let events = parse_listing(&body, &self.listing_url, &self.venue);
        info!("Eventbrite scraped {} events", events.len());
        Ok(events)
    }
}

/// Extract candidate events from an Eventbrite listing page.
///
/// Event cards are anchors whose href contains the detail-page marker
/// `/e/`. Cards without a title or a resolvable href are dropped; the rest
/// survive even when neighbouring cards are malformed. A detail URL that
/// appears on the page more than once is emitted once.
pub fn parse_listing(html: &str, base: &Url, venue: &str) -> Vec<ScrapedEvent> {
    let document = Html::parse_document(html);
    let card = Selector::parse("a[href*='/e/']").expect("valid selector");
    let heading = Selector::parse("h3").expect("valid selector");
    let image = Selector::parse("img").expect("valid selector");

    let mut seen = HashSet::new();
    let mut events = Vec::new();

    for anchor in document.select(&card) {
        let href = match anchor.value().attr("href") {
            Some(href) => href,
            None => continue,
        };

        let title = anchor
            .select(&heading)
            .next()
            .map(|h| h.text().collect::<String>().trim().to_string())
            .unwrap_or_default();

        if title.is_empty() {
            debug!("Skipping card without a title: {}", href);
            continue;
        }

        let event_url = match base.join(href) {
            Ok(resolved) => resolved.to_string(),
            Err(e) => {
                debug!("Skipping card with unresolvable href {}: {}", href, e);
                continue;
            }
        };

        if !seen.insert(event_url.clone()) {
            continue;
        }

        let image_url = anchor
            .select(&image)
            .next()
            .and_then(|img| {
                img.value()
                    .attr("src")
                    .or_else(|| img.value().attr("data-src"))
            })
            .map(|src| src.to_string());

        events.push(ScrapedEvent {
            title,
            venue: Some(venue.to_string()),
            occurs_at: None,
            image_url,
            source_id: SOURCE_ID.to_string(),
            event_url,
        });
    }

    events
}
