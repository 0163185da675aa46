use async_trait::async_trait;
use ecotrack_core::{parse_hourly_timestamp, IndicatorType, ReadingDraft, ZoneId};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::{join_url, AdapterError, ParsedBatch, SourceAdapter, SourceRequest, ZoneTarget};

pub const WEATHER_SOURCE_ID: &str = "open-meteo";
pub const OPEN_METEO_BASE_URL: &str = "https://api.open-meteo.com";
pub const HOURLY_FIELD: &str = "temperature_2m";
pub const FORECAST_PAST_DAYS: u32 = 7;

const FORECAST_PATH: &str = "/v1/forecast";

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    hourly: HourlySeries,
}

#[derive(Debug, Deserialize)]
struct HourlySeries {
    time: Vec<String>,
    temperature_2m: Vec<Option<f64>>,
}

/// Hourly 2 m temperature for a fixed point, covering the past week.
#[derive(Debug, Clone)]
pub struct WeatherAdapter {
    base_url: String,
}

impl Default for WeatherAdapter {
    fn default() -> Self {
        Self::new(OPEN_METEO_BASE_URL)
    }
}

impl WeatherAdapter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl SourceAdapter for WeatherAdapter {
    fn source_id(&self) -> &'static str {
        WEATHER_SOURCE_ID
    }

    fn indicator_type(&self) -> IndicatorType {
        IndicatorType::Temperature
    }

    fn request_for(&self, target: &ZoneTarget) -> Result<SourceRequest, AdapterError> {
        let Some(coords) = target.coordinates else {
            return Err(AdapterError::NotApplicable {
                source_id: WEATHER_SOURCE_ID,
                zone: target.zone_name.clone(),
                reason: "no coordinates configured".to_string(),
            });
        };
        Ok(SourceRequest {
            url: join_url(&self.base_url, FORECAST_PATH),
            query: vec![
                ("latitude", coords.latitude.to_string()),
                ("longitude", coords.longitude.to_string()),
                ("hourly", HOURLY_FIELD.to_string()),
                ("past_days", FORECAST_PAST_DAYS.to_string()),
            ],
        })
    }

    fn parse(&self, body: &[u8], zone_id: ZoneId) -> Result<ParsedBatch, AdapterError> {
        parse_hourly_forecast(body, zone_id)
    }
}

/// Normalize an Open-Meteo hourly response into temperature readings.
///
/// `time` and `temperature_2m` are walked pairwise; null values and
/// unparseable times are dropped one by one. A non-numeric, non-null
/// temperature fails the whole response as malformed.
pub fn parse_hourly_forecast(body: &[u8], zone_id: ZoneId) -> Result<ParsedBatch, AdapterError> {
    let response: ForecastResponse =
        serde_json::from_slice(body).map_err(|err| AdapterError::Malformed {
            source_id: WEATHER_SOURCE_ID,
            reason: err.to_string(),
        })?;
    let series = response.hourly;

    if series.time.len() != series.temperature_2m.len() {
        warn!(
            times = series.time.len(),
            values = series.temperature_2m.len(),
            "hourly arrays differ in length; extra entries ignored"
        );
    }

    let mut batch = ParsedBatch::default();
    for (raw_time, value) in series.time.iter().zip(series.temperature_2m) {
        let Some(value) = value else {
            batch.rejected += 1;
            continue;
        };
        match parse_hourly_timestamp(raw_time) {
            Ok(timestamp) => batch.readings.push(ReadingDraft::new(
                IndicatorType::Temperature,
                value,
                timestamp,
                zone_id,
            )),
            Err(err) => {
                debug!(%err, "skipping hourly entry");
                batch.rejected += 1;
            }
        }
    }
    Ok(batch)
}
