use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ecotrack_core::{IndicatorType, NewZone, Reading, ReadingDraft, ReadingKey, Zone, ZoneId};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::debug;

use crate::{ReadingStore, StoreError, ZoneLookup};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed store holding one connection for the lifetime of a run.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    pub async fn connect_in_memory() -> Result<Self, StoreError> {
        Self::connect("sqlite::memory:").await
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn zone_from_row(row: &SqliteRow) -> Result<Zone, StoreError> {
    Ok(Zone {
        id: ZoneId(row.try_get("id")?),
        name: row.try_get("name")?,
        postal_code: row.try_get("postal_code")?,
        country: row.try_get("country")?,
    })
}

fn duplicate_or_database(err: sqlx::Error, draft: &ReadingDraft) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return StoreError::DuplicateReading {
                zone_id: draft.zone_id,
                indicator_type: draft.indicator_type,
                timestamp: draft.timestamp,
            };
        }
    }
    StoreError::Database(err)
}

#[async_trait]
impl ReadingStore for SqliteStore {
    async fn find_zone_by_name(&self, name: &str) -> Result<Option<Zone>, StoreError> {
        let row = sqlx::query("SELECT id, name, postal_code, country FROM zones WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(zone_from_row).transpose()
    }

    async fn get_or_create_zone(&self, zone: &NewZone) -> Result<ZoneLookup, StoreError> {
        if zone.name.trim().is_empty() {
            return Err(StoreError::InvalidZoneName);
        }
        if let Some(existing) = self.find_zone_by_name(&zone.name).await? {
            return Ok(ZoneLookup {
                zone: existing,
                created: false,
            });
        }

        let result = sqlx::query(
            "INSERT INTO zones (name, postal_code, country) VALUES (?, ?, ?) \
             ON CONFLICT (name) DO NOTHING",
        )
        .bind(&zone.name)
        .bind(&zone.postal_code)
        .bind(&zone.country)
        .execute(&self.pool)
        .await?;

        let stored = self
            .find_zone_by_name(&zone.name)
            .await?
            .ok_or_else(|| StoreError::CorruptRow {
                table: "zones",
                reason: format!("zone {:?} missing after insert", zone.name),
            })?;
        Ok(ZoneLookup {
            zone: stored,
            created: result.rows_affected() == 1,
        })
    }

    async fn reading_exists(&self, key: &ReadingKey) -> Result<bool, StoreError> {
        let exists: i64 = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM indicators WHERE zone_id = ? AND type = ? AND timestamp = ?)",
        )
        .bind(key.zone_id.0)
        .bind(key.indicator_type.as_str())
        .bind(key.timestamp)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists != 0)
    }

    async fn insert_reading(&self, draft: &ReadingDraft) -> Result<Reading, StoreError> {
        let result = sqlx::query(
            "INSERT INTO indicators (type, value, unit, timestamp, zone_id) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(draft.indicator_type.as_str())
        .bind(draft.value)
        .bind(&draft.unit)
        .bind(draft.timestamp)
        .bind(draft.zone_id.0)
        .execute(&self.pool)
        .await
        .map_err(|err| duplicate_or_database(err, draft))?;

        let id = result.last_insert_rowid();
        debug!(id, zone_id = %draft.zone_id, indicator_type = %draft.indicator_type, "inserted reading");
        Ok(Reading {
            id,
            indicator_type: draft.indicator_type,
            value: draft.value,
            unit: draft.unit.clone(),
            timestamp: draft.timestamp,
            zone_id: draft.zone_id,
        })
    }

    async fn count_readings(
        &self,
        zone_id: ZoneId,
        indicator_type: IndicatorType,
    ) -> Result<u64, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM indicators WHERE zone_id = ? AND type = ?")
                .bind(zone_id.0)
                .bind(indicator_type.as_str())
                .fetch_one(&self.pool)
                .await?;
        Ok(count.max(0) as u64)
    }
}

impl SqliteStore {
    /// All readings of one type for a zone, oldest first.
    pub async fn readings_for_zone(
        &self,
        zone_id: ZoneId,
        indicator_type: IndicatorType,
    ) -> Result<Vec<Reading>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, type, value, unit, timestamp, zone_id FROM indicators \
             WHERE zone_id = ? AND type = ? ORDER BY timestamp",
        )
        .bind(zone_id.0)
        .bind(indicator_type.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<Reading, StoreError> {
                let raw_type: String = row.try_get("type")?;
                let indicator_type =
                    raw_type
                        .parse::<IndicatorType>()
                        .map_err(|err| StoreError::CorruptRow {
                            table: "indicators",
                            reason: err.to_string(),
                        })?;
                let timestamp: DateTime<Utc> = row.try_get("timestamp")?;
                let unit: Option<String> = row.try_get("unit")?;
                Ok(Reading {
                    id: row.try_get("id")?,
                    indicator_type,
                    value: row.try_get("value")?,
                    unit: unit.unwrap_or_default(),
                    timestamp,
                    zone_id: ZoneId(row.try_get("zone_id")?),
                })
            })
            .collect()
    }
}
