use crate::store::EventStore;
use crate::types::{
    AggregatorError, EventRecord, EventStatus, Result, PLACEHOLDER_IMAGE_URL,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// SQLite-backed event store.
///
/// Timestamps are stored as RFC 3339 text, ids and statuses as text. The
/// schema is created on connect, so a fresh database file works without a
/// separate migration step.
pub struct EventManager {
    db: SqlitePool,
}

impl EventManager {
    /// Open the events database (creating it if the URL says so) and ensure
    /// the schema exists.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let db = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        let manager = Self { db };
        manager.init_schema().await?;
        info!("Opened events database: {}", database_url);
        Ok(manager)
    }

    /// Private in-memory database living for the lifetime of the pool.
    /// A single connection keeps every query on the same database.
    pub async fn in_memory() -> Result<Self> {
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let manager = Self { db };
        manager.init_schema().await?;
        Ok(manager)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                event_url TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                venue TEXT,
                occurs_at TEXT,
                image_url TEXT NOT NULL,
                source_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'new',
                last_scraped_at TEXT NOT NULL,
                imported_at TEXT,
                imported_by TEXT
            )
            "#,
        )
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Flip every record that is not already `imported` to `imported`,
    /// stamping the curator. Returns how many records changed.
    pub async fn import_all(&self, curator: &str) -> Result<u64> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE events SET status = 'imported', imported_at = ?, imported_by = ? \
             WHERE status <> 'imported'",
        )
        .bind(now)
        .bind(curator)
        .execute(&self.db)
        .await?;

        info!("Imported {} events", result.rows_affected());
        Ok(result.rows_affected())
    }

    /// Backfill the placeholder onto records missing an image, e.g. rows
    /// written before the placeholder default existed.
    pub async fn backfill_images(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE events SET image_url = ? WHERE image_url IS NULL OR image_url = ''",
        )
        .bind(PLACEHOLDER_IMAGE_URL)
        .execute(&self.db)
        .await?;

        info!("Backfilled images on {} events", result.rows_affected());
        Ok(result.rows_affected())
    }

    fn record_from_row(row: &SqliteRow) -> Result<EventRecord> {
        let id_text: String = row.try_get("id")?;
        let id = Uuid::parse_str(&id_text)
            .map_err(|e| AggregatorError::General(format!("corrupt record id '{}': {}", id_text, e)))?;

        let status_text: String = row.try_get("status")?;
        let status = EventStatus::from_str(&status_text)?;

        Ok(EventRecord {
            id,
            event_url: row.try_get("event_url")?,
            title: row.try_get("title")?,
            venue: row.try_get("venue")?,
            occurs_at: row.try_get::<Option<DateTime<Utc>>, _>("occurs_at")?,
            image_url: row.try_get("image_url")?,
            source_id: row.try_get("source_id")?,
            status,
            last_scraped_at: row.try_get::<DateTime<Utc>, _>("last_scraped_at")?,
            imported_at: row.try_get::<Option<DateTime<Utc>>, _>("imported_at")?,
            imported_by: row.try_get("imported_by")?,
        })
    }
}

#[async_trait]
impl EventStore for EventManager {
    async fn find_by_url(&self, event_url: &str) -> Result<Option<EventRecord>> {
        let row = sqlx::query("SELECT * FROM events WHERE event_url = ?")
            .bind(event_url)
            .fetch_optional(&self.db)
            .await?;

        row.map(|row| Self::record_from_row(&row)).transpose()
    }

    async fn upsert(&self, record: &EventRecord) -> Result<()> {
        // The id is deliberately absent from the update set; the one
        // assigned at creation survives every later observation.
        sqlx::query(
            r#"
            INSERT INTO events (
                id, event_url, title, venue, occurs_at, image_url,
                source_id, status, last_scraped_at, imported_at, imported_by
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (event_url) DO UPDATE SET
                title = excluded.title,
                venue = excluded.venue,
                occurs_at = excluded.occurs_at,
                image_url = excluded.image_url,
                source_id = excluded.source_id,
                status = excluded.status,
                last_scraped_at = excluded.last_scraped_at,
                imported_at = excluded.imported_at,
                imported_by = excluded.imported_by
            "#,
        )
        .bind(record.id.to_string())
        .bind(&record.event_url)
        .bind(&record.title)
        .bind(&record.venue)
        .bind(record.occurs_at)
        .bind(&record.image_url)
        .bind(&record.source_id)
        .bind(record.status.as_str())
        .bind(record.last_scraped_at)
        .bind(record.imported_at)
        .bind(&record.imported_by)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn mark_missing_inactive(
        &self,
        seen_urls: &[String],
        succeeded_sources: &[String],
    ) -> Result<u64> {
        if succeeded_sources.is_empty() {
            return Ok(0);
        }

        let source_marks = vec!["?"; succeeded_sources.len()].join(", ");
        let sql = if seen_urls.is_empty() {
            format!(
                "UPDATE events SET status = 'inactive' \
                 WHERE status <> 'inactive' AND source_id IN ({})",
                source_marks
            )
        } else {
            let seen_marks = vec!["?"; seen_urls.len()].join(", ");
            format!(
                "UPDATE events SET status = 'inactive' \
                 WHERE status <> 'inactive' AND source_id IN ({}) AND event_url NOT IN ({})",
                source_marks, seen_marks
            )
        };

        let mut query = sqlx::query(&sql);
        for source in succeeded_sources {
            query = query.bind(source);
        }
        for url in seen_urls {
            query = query.bind(url);
        }

        let result = query.execute(&self.db).await?;
        debug!("Staleness pass marked {} records inactive", result.rows_affected());
        Ok(result.rows_affected())
    }

    async fn query_by_status(&self, statuses: &[EventStatus]) -> Result<Vec<EventRecord>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let marks = vec!["?"; statuses.len()].join(", ");
        let sql = format!(
            "SELECT * FROM events WHERE status IN ({}) \
             ORDER BY occurs_at IS NULL, occurs_at, title",
            marks
        );

        let mut query = sqlx::query(&sql);
        for status in statuses {
            query = query.bind(status.as_str());
        }

        let rows = query.fetch_all(&self.db).await?;
        rows.iter().map(Self::record_from_row).collect()
    }

    async fn mark_imported(&self, id: Uuid, curator: &str) -> Result<EventRecord> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE events SET status = 'imported', imported_at = ?, imported_by = ? \
             WHERE id = ?",
        )
        .bind(now)
        .bind(curator)
        .bind(id.to_string())
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AggregatorError::EventNotFound { id });
        }

        let row = sqlx::query("SELECT * FROM events WHERE id = ?")
            .bind(id.to_string())
            .fetch_one(&self.db)
            .await?;

        Self::record_from_row(&row)
    }
}
