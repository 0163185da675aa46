//! Ingestion orchestration: zone resolution, per-source fetch, dedup and persistence.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use ecotrack_adapters::{
    adapter_for_source, AdapterError, SourceAdapter, ZoneTarget, ENERGY_SOURCE_ID,
    ODRE_BASE_URL, OPEN_METEO_BASE_URL, WEATHER_SOURCE_ID,
};
use ecotrack_core::ZoneId;
use ecotrack_storage::{HttpClientConfig, HttpFetcher, ReadingStore, SqliteStore, StoreError};
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

mod gate;
mod zones;

pub use gate::{DedupGate, GateOutcome};
pub use zones::{ZoneConfig, ZoneRegistry, ZoneResolver};

pub const CRATE_NAME: &str = "ecotrack-ingest";

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub database_url: String,
    pub zones_file: PathBuf,
    pub weather_base_url: String,
    pub energy_base_url: String,
    pub user_agent: String,
    pub http_timeout_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://ecotrack.db?mode=rwc".to_string(),
            zones_file: PathBuf::from("zones.yaml"),
            weather_base_url: OPEN_METEO_BASE_URL.to_string(),
            energy_base_url: ODRE_BASE_URL.to_string(),
            user_agent: "ecotrack-ingest/0.1".to_string(),
            http_timeout_secs: 20,
        }
    }
}

impl IngestConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            zones_file: std::env::var("ECOTRACK_ZONES_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.zones_file),
            weather_base_url: std::env::var("ECOTRACK_WEATHER_BASE_URL")
                .unwrap_or(defaults.weather_base_url),
            energy_base_url: std::env::var("ECOTRACK_ENERGY_BASE_URL")
                .unwrap_or(defaults.energy_base_url),
            user_agent: std::env::var("ECOTRACK_USER_AGENT").unwrap_or(defaults.user_agent),
            http_timeout_secs: std::env::var("ECOTRACK_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|secs| *secs > 0)
                .unwrap_or(defaults.http_timeout_secs),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SourceStatus {
    Completed,
    Failed { error: String },
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceReport {
    pub source_id: String,
    pub status: SourceStatus,
    /// Readings normalized from the upstream response.
    pub fetched: usize,
    /// Upstream entries dropped individually during normalization.
    pub rejected: usize,
    pub inserted: usize,
    pub duplicates: usize,
}

impl SourceReport {
    fn empty(source_id: &str, status: SourceStatus) -> Self {
        Self {
            source_id: source_id.to_string(),
            status,
            fetched: 0,
            rejected: 0,
            inserted: 0,
            duplicates: 0,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, SourceStatus::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZoneRunReport {
    pub zone_name: String,
    pub zone_id: ZoneId,
    pub zone_created: bool,
    pub sources: Vec<SourceReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub zones: Vec<ZoneRunReport>,
}

impl IngestRunSummary {
    fn sources(&self) -> impl Iterator<Item = &SourceReport> {
        self.zones.iter().flat_map(|zone| zone.sources.iter())
    }

    pub fn inserted(&self) -> usize {
        self.sources().map(|s| s.inserted).sum()
    }

    pub fn duplicates(&self) -> usize {
        self.sources().map(|s| s.duplicates).sum()
    }

    pub fn failed_sources(&self) -> usize {
        self.sources().filter(|s| s.is_failed()).count()
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("serializing run summary")
    }

    pub fn source(&self, zone_name: &str, source_id: &str) -> Option<&SourceReport> {
        self.zones
            .iter()
            .find(|zone| zone.zone_name == zone_name)?
            .sources
            .iter()
            .find(|s| s.source_id == source_id)
    }
}

/// One pass over every configured zone, weather first, then energy.
pub struct IngestPipeline {
    zones: ZoneRegistry,
    http: HttpFetcher,
    adapters: Vec<Box<dyn SourceAdapter>>,
}

impl IngestPipeline {
    pub fn new(config: &IngestConfig, zones: ZoneRegistry) -> Result<Self> {
        let http = HttpFetcher::new(HttpClientConfig {
            timeout: Duration::from_secs(config.http_timeout_secs),
            user_agent: Some(config.user_agent.clone()),
        })?;
        let adapters = [
            (WEATHER_SOURCE_ID, config.weather_base_url.as_str()),
            (ENERGY_SOURCE_ID, config.energy_base_url.as_str()),
        ]
        .into_iter()
        .map(|(source_id, base_url)| {
            adapter_for_source(source_id, base_url)
                .with_context(|| format!("no adapter registered for {source_id}"))
        })
        .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            zones,
            http,
            adapters,
        })
    }

    pub fn with_adapters(mut self, adapters: Vec<Box<dyn SourceAdapter>>) -> Self {
        self.adapters = adapters;
        self
    }

    /// Run every zone once. Source failures are recorded; store failures abort.
    pub async fn run_once(&self, store: &dyn ReadingStore) -> Result<IngestRunSummary> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let mut zones = Vec::with_capacity(self.zones.zones.len());

        for zone in &self.zones.zones {
            let span = info_span!("ingest_zone", %run_id, zone = %zone.name);
            let report = self
                .ingest_zone(store, zone)
                .instrument(span)
                .await
                .with_context(|| format!("ingesting zone {}", zone.name))?;
            zones.push(report);
        }

        Ok(IngestRunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            zones,
        })
    }

    async fn ingest_zone(
        &self,
        store: &dyn ReadingStore,
        zone: &ZoneConfig,
    ) -> Result<ZoneRunReport, StoreError> {
        let lookup = ZoneResolver::new(store).resolve(zone).await?;
        let target = zone.target(lookup.zone.id);

        let mut sources = Vec::with_capacity(self.adapters.len());
        for adapter in &self.adapters {
            sources.push(self.ingest_source(adapter.as_ref(), store, &target).await?);
        }

        Ok(ZoneRunReport {
            zone_name: lookup.zone.name,
            zone_id: lookup.zone.id,
            zone_created: lookup.created,
            sources,
        })
    }

    /// Fetch one source for one zone and push its readings through the dedup gate.
    ///
    /// Only store errors escape; fetch and response errors become a failed report.
    pub async fn ingest_source(
        &self,
        adapter: &dyn SourceAdapter,
        store: &dyn ReadingStore,
        target: &ZoneTarget,
    ) -> Result<SourceReport, StoreError> {
        let source_id = adapter.source_id();
        let batch = match adapter.fetch(&self.http, target).await {
            Ok(batch) => batch,
            Err(AdapterError::NotApplicable { reason, .. }) => {
                info!(source_id, %reason, "source skipped");
                return Ok(SourceReport::empty(
                    source_id,
                    SourceStatus::Skipped { reason },
                ));
            }
            Err(err) => {
                let timed_out = matches!(&err, AdapterError::Fetch(fetch) if fetch.is_timeout());
                warn!(source_id, timed_out, error = %err, "source failed; continuing");
                let error = if timed_out {
                    format!("timed out: {err}")
                } else {
                    err.to_string()
                };
                return Ok(SourceReport::empty(
                    source_id,
                    SourceStatus::Failed { error },
                ));
            }
        };

        let outcome = DedupGate::new(store).persist_all(&batch.readings).await?;
        info!(
            source_id,
            fetched = batch.readings.len(),
            rejected = batch.rejected,
            inserted = outcome.inserted,
            duplicates = outcome.duplicates,
            "source ingested"
        );

        Ok(SourceReport {
            source_id: source_id.to_string(),
            status: SourceStatus::Completed,
            fetched: batch.readings.len(),
            rejected: batch.rejected,
            inserted: outcome.inserted,
            duplicates: outcome.duplicates,
        })
    }
}

/// Open the configured SQLite store and bring its schema up to date.
pub async fn open_store(config: &IngestConfig) -> Result<SqliteStore> {
    let store = SqliteStore::connect(&config.database_url)
        .await
        .with_context(|| format!("connecting to {}", config.database_url))?;
    if let Err(err) = store.migrate().await {
        store.close().await;
        return Err(err).context("applying migrations");
    }
    Ok(store)
}

/// Acquire the store, run one pass, and release the store on every exit path.
pub async fn run_ingest_once(config: &IngestConfig) -> Result<IngestRunSummary> {
    let zones = ZoneRegistry::load(&config.zones_file).await?;
    let pipeline = IngestPipeline::new(config, zones)?;
    let store = open_store(config).await?;
    let result = pipeline.run_once(&store).await;
    store.close().await;
    result
}

pub async fn run_ingest_once_from_env() -> Result<IngestRunSummary> {
    run_ingest_once(&IngestConfig::from_env()).await
}

pub async fn migrate_from_env() -> Result<()> {
    let store = open_store(&IngestConfig::from_env()).await?;
    store.close().await;
    Ok(())
}
