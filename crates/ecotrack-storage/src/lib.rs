//! Reading store contract, SQLite persistence and HTTP fetch utilities for EcoTrack.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ecotrack_core::{IndicatorType, NewZone, Reading, ReadingDraft, ReadingKey, Zone, ZoneId};
use thiserror::Error;

mod http;
mod sqlite;

pub use http::{FetchError, HttpClientConfig, HttpFetcher};
pub use sqlite::SqliteStore;

pub const CRATE_NAME: &str = "ecotrack-storage";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("reading already stored for zone {zone_id} {indicator_type} at {timestamp}")]
    DuplicateReading {
        zone_id: ZoneId,
        indicator_type: IndicatorType,
        timestamp: DateTime<Utc>,
    },
    #[error("zone name must not be empty")]
    InvalidZoneName,
    #[error("corrupt row in {table}: {reason}")]
    CorruptRow { table: &'static str, reason: String },
}

/// Outcome of a get-or-create zone lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneLookup {
    pub zone: Zone,
    pub created: bool,
}

/// Persistence operations the ingestion pipeline needs.
///
/// Implementations own identity assignment and must reject a second reading
/// for the same [`ReadingKey`] with [`StoreError::DuplicateReading`].
#[async_trait]
pub trait ReadingStore: Send + Sync {
    async fn find_zone_by_name(&self, name: &str) -> Result<Option<Zone>, StoreError>;

    /// Return the zone called `zone.name`, creating it from `zone` when absent.
    async fn get_or_create_zone(&self, zone: &NewZone) -> Result<ZoneLookup, StoreError>;

    async fn reading_exists(&self, key: &ReadingKey) -> Result<bool, StoreError>;

    async fn insert_reading(&self, draft: &ReadingDraft) -> Result<Reading, StoreError>;

    async fn count_readings(
        &self,
        zone_id: ZoneId,
        indicator_type: IndicatorType,
    ) -> Result<u64, StoreError>;
}
