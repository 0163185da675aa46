//! Source adapter contracts + the Open-Meteo and ODRÉ adapters.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use ecotrack_core::{IndicatorType, ReadingDraft, ZoneId};
use ecotrack_storage::{FetchError, HttpFetcher};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

mod energy;
mod weather;

pub use energy::{
    parse_energy_records, EnergyAdapter, ECO2MIX_DATASET, ENERGY_ROWS, ENERGY_SORT,
    ENERGY_SOURCE_ID, ODRE_BASE_URL,
};
pub use weather::{
    parse_hourly_forecast, WeatherAdapter, FORECAST_PAST_DAYS, HOURLY_FIELD, OPEN_METEO_BASE_URL,
    WEATHER_SOURCE_ID,
};

pub const CRATE_NAME: &str = "ecotrack-adapters";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Everything an adapter may need to know about the zone it fetches for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneTarget {
    pub zone_id: ZoneId,
    pub zone_name: String,
    pub coordinates: Option<Coordinates>,
    pub region_label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRequest {
    pub url: String,
    pub query: Vec<(&'static str, String)>,
}

/// Readings normalized from one upstream response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedBatch {
    pub readings: Vec<ReadingDraft>,
    /// Entries dropped individually (null value, missing field, bad timestamp).
    pub rejected: usize,
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("malformed {source_id} response: {reason}")]
    Malformed {
        source_id: &'static str,
        reason: String,
    },
    #[error("{source_id} not applicable to zone {zone}: {reason}")]
    NotApplicable {
        source_id: &'static str,
        zone: String,
        reason: String,
    },
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source_id(&self) -> &'static str;

    fn indicator_type(&self) -> IndicatorType;

    fn request_for(&self, target: &ZoneTarget) -> Result<SourceRequest, AdapterError>;

    fn parse(&self, body: &[u8], zone_id: ZoneId) -> Result<ParsedBatch, AdapterError>;

    /// Issue the single upstream request for `target` and normalize the response.
    async fn fetch(
        &self,
        http: &HttpFetcher,
        target: &ZoneTarget,
    ) -> Result<ParsedBatch, AdapterError> {
        let request = self.request_for(target)?;
        let body = http
            .fetch_bytes(self.source_id(), &request.url, &request.query)
            .await?;
        self.parse(&body, target.zone_id)
    }
}

pub fn adapter_for_source(source_id: &str, base_url: &str) -> Option<Box<dyn SourceAdapter>> {
    match source_id {
        WEATHER_SOURCE_ID => Some(Box::new(WeatherAdapter::new(base_url))),
        ENERGY_SOURCE_ID => Some(Box::new(EnergyAdapter::new(base_url))),
        _ => None,
    }
}

/// Read a recorded upstream response body.
pub fn load_fixture_response(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    fs::read(path).with_context(|| format!("reading fixture {}", path.display()))
}

fn join_url(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

fn json_str<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a str> {
    let mut cur = value;
    for segment in path {
        cur = cur.get(*segment)?;
    }
    cur.as_str()
}

fn json_f64(value: &JsonValue, path: &[&str]) -> Option<f64> {
    let mut cur = value;
    for segment in path {
        cur = cur.get(*segment)?;
    }
    cur.as_f64()
}
