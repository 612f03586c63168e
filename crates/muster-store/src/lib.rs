//! Catalog persistence: the document-store contract the reconciler consumes,
//! a Postgres implementation, and an in-memory implementation for tests and
//! local runs.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use muster_core::{CandidateEvent, EventRecord, EventStatus};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

pub const CRATE_NAME: &str = "muster-store";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("{0}")]
    Message(String),
}

/// Replacement values for the scraped content fields. Status, import fields,
/// and timestamps are intentionally not representable here.
#[derive(Debug, Clone)]
pub struct ContentPatch {
    pub title: String,
    pub start_at: DateTime<Utc>,
    pub venue_name: String,
    pub address: Option<String>,
    pub description: String,
    pub category: String,
    pub tags: Vec<String>,
    pub image_url: Option<String>,
}

impl ContentPatch {
    pub fn from_candidate(candidate: &CandidateEvent) -> Self {
        Self {
            title: candidate.title.clone(),
            start_at: candidate.start_at,
            venue_name: candidate.venue_name.clone(),
            address: candidate.address.clone(),
            description: candidate.description.clone(),
            category: candidate.category.clone(),
            tags: candidate.tags.clone(),
            image_url: candidate.image_url.clone(),
        }
    }
}

/// Partial update applied to one record by id.
#[derive(Debug, Clone, Default)]
pub struct EventPatch {
    pub content: Option<ContentPatch>,
    pub status: Option<EventStatus>,
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl EventPatch {
    /// Refresh only the freshness timestamp, leaving content and status alone.
    pub fn touch(now: DateTime<Utc>) -> Self {
        Self {
            content: None,
            status: None,
            last_seen_at: Some(now),
        }
    }
}

/// The four operations the reconciliation engine needs from a catalog store.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn find_by_source_url(
        &self,
        source: &str,
        url: &str,
    ) -> Result<Option<EventRecord>, StoreError>;

    async fn insert(&self, record: EventRecord) -> Result<(), StoreError>;

    async fn update(&self, id: Uuid, patch: EventPatch) -> Result<(), StoreError>;

    /// Mark every record for `source` not seen since `cutoff` (and not
    /// already inactive) as inactive. Returns the number of flipped rows.
    async fn sweep_inactive(
        &self,
        source: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
}

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    source: String,
    original_event_url: String,
    title: String,
    start_at: DateTime<Utc>,
    venue_name: String,
    address: Option<String>,
    city: String,
    description: String,
    category: String,
    tags: Vec<String>,
    image_url: Option<String>,
    status: String,
    last_seen_at: DateTime<Utc>,
    imported_at: Option<DateTime<Utc>>,
    imported_by: Option<String>,
    import_notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for EventRecord {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let status = EventStatus::from_str(&row.status)
            .map_err(|err| StoreError::Message(err.to_string()))?;
        Ok(EventRecord {
            id: row.id,
            source: row.source,
            original_event_url: row.original_event_url,
            title: row.title,
            start_at: row.start_at,
            venue_name: row.venue_name,
            address: row.address,
            city: row.city,
            description: row.description,
            category: row.category,
            tags: row.tags,
            image_url: row.image_url,
            status,
            last_seen_at: row.last_seen_at,
            imported_at: row.imported_at,
            imported_by: row.imported_by,
            import_notes: row.import_notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Postgres-backed catalog store.
#[derive(Debug, Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!().run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn find_by_source_url(
        &self,
        source: &str,
        url: &str,
    ) -> Result<Option<EventRecord>, StoreError> {
        let row = sqlx::query_as::<_, EventRow>(
            "SELECT * FROM catalog_events WHERE source = $1 AND original_event_url = $2",
        )
        .bind(source)
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        row.map(EventRecord::try_from).transpose()
    }

    async fn insert(&self, record: EventRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO catalog_events (
                 id, source, original_event_url, title, start_at, venue_name,
                 address, city, description, category, tags, image_url, status,
                 last_seen_at, imported_at, imported_by, import_notes,
                 created_at, updated_at
             ) VALUES (
                 $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14,
                 $15, $16, $17, $18, $19
             )",
        )
        .bind(record.id)
        .bind(&record.source)
        .bind(&record.original_event_url)
        .bind(&record.title)
        .bind(record.start_at)
        .bind(&record.venue_name)
        .bind(&record.address)
        .bind(&record.city)
        .bind(&record.description)
        .bind(&record.category)
        .bind(&record.tags)
        .bind(&record.image_url)
        .bind(record.status.as_str())
        .bind(record.last_seen_at)
        .bind(record.imported_at)
        .bind(&record.imported_by)
        .bind(&record.import_notes)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, id: Uuid, patch: EventPatch) -> Result<(), StoreError> {
        match patch.content {
            Some(content) => {
                sqlx::query(
                    "UPDATE catalog_events SET
                         title = $2, start_at = $3, venue_name = $4,
                         address = $5, description = $6, category = $7,
                         tags = $8, image_url = $9,
                         status = COALESCE($10, status),
                         last_seen_at = COALESCE($11, last_seen_at),
                         updated_at = now()
                     WHERE id = $1",
                )
                .bind(id)
                .bind(&content.title)
                .bind(content.start_at)
                .bind(&content.venue_name)
                .bind(&content.address)
                .bind(&content.description)
                .bind(&content.category)
                .bind(&content.tags)
                .bind(&content.image_url)
                .bind(patch.status.map(|s| s.as_str()))
                .bind(patch.last_seen_at)
                .execute(&self.pool)
                .await?;
            }
            None => {
                sqlx::query(
                    "UPDATE catalog_events SET
                         status = COALESCE($2, status),
                         last_seen_at = COALESCE($3, last_seen_at),
                         updated_at = now()
                     WHERE id = $1",
                )
                .bind(id)
                .bind(patch.status.map(|s| s.as_str()))
                .bind(patch.last_seen_at)
                .execute(&self.pool)
                .await?;
            }
        }
        Ok(())
    }

    async fn sweep_inactive(
        &self,
        source: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE catalog_events SET status = 'inactive', updated_at = now()
             WHERE source = $1 AND last_seen_at < $2 AND status <> 'inactive'",
        )
        .bind(source)
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        let flipped = result.rows_affected();
        debug!(source, flipped, "inactive sweep applied");
        Ok(flipped)
    }
}

/// In-memory catalog store with the same uniqueness behavior as the Postgres
/// schema. Used by tests and throwaway local runs.
#[derive(Debug, Default)]
pub struct MemoryCatalogStore {
    records: Mutex<HashMap<(String, String), EventRecord>>,
}

impl MemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("store lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Seed a record directly, bypassing reconciliation.
    pub fn put(&self, record: EventRecord) {
        let key = (record.source.clone(), record.original_event_url.clone());
        self.records.lock().expect("store lock").insert(key, record);
    }

    pub fn get(&self, source: &str, url: &str) -> Option<EventRecord> {
        self.records
            .lock()
            .expect("store lock")
            .get(&(source.to_string(), url.to_string()))
            .cloned()
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalogStore {
    async fn find_by_source_url(
        &self,
        source: &str,
        url: &str,
    ) -> Result<Option<EventRecord>, StoreError> {
        Ok(self.get(source, url))
    }

    async fn insert(&self, record: EventRecord) -> Result<(), StoreError> {
        let key = (record.source.clone(), record.original_event_url.clone());
        let mut records = self.records.lock().expect("store lock");
        if records.contains_key(&key) {
            return Err(StoreError::Message(format!(
                "duplicate record for ({}, {})",
                key.0, key.1
            )));
        }
        records.insert(key, record);
        Ok(())
    }

    async fn update(&self, id: Uuid, patch: EventPatch) -> Result<(), StoreError> {
        let mut records = self.records.lock().expect("store lock");
        let record = records
            .values_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| StoreError::Message(format!("no record with id {id}")))?;

        if let Some(content) = patch.content {
            record.title = content.title;
            record.start_at = content.start_at;
            record.venue_name = content.venue_name;
            record.address = content.address;
            record.description = content.description;
            record.category = content.category;
            record.tags = content.tags;
            record.image_url = content.image_url;
        }
        if let Some(status) = patch.status {
            record.status = status;
        }
        if let Some(last_seen_at) = patch.last_seen_at {
            record.last_seen_at = last_seen_at;
        }
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn sweep_inactive(
        &self,
        source: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut records = self.records.lock().expect("store lock");
        let mut flipped = 0u64;
        for record in records.values_mut() {
            if record.source == source
                && record.last_seen_at < cutoff
                && record.status != EventStatus::Inactive
            {
                record.status = EventStatus::Inactive;
                record.updated_at = Utc::now();
                flipped += 1;
            }
        }
        Ok(flipped)
    }
}
