use async_trait::async_trait;
use ecotrack_core::{parse_offset_timestamp, IndicatorType, ReadingDraft, ZoneId};
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::{
    join_url, json_f64, json_str, AdapterError, ParsedBatch, SourceAdapter, SourceRequest,
    ZoneTarget,
};

pub const ENERGY_SOURCE_ID: &str = "odre-eco2mix";
pub const ODRE_BASE_URL: &str = "https://odre.opendatasoft.com";
pub const ECO2MIX_DATASET: &str = "eco2mix-regional-tr";
pub const ENERGY_ROWS: u32 = 50;
pub const ENERGY_SORT: &str = "-date_heure";

const SEARCH_PATH: &str = "/api/records/1.0/search/";

/// Latest regional consumption snapshots from the eco2mix real-time dataset.
///
/// The region filter comes from the zone being ingested, so one adapter serves
/// any number of regions.
#[derive(Debug, Clone)]
pub struct EnergyAdapter {
    base_url: String,
}

impl Default for EnergyAdapter {
    fn default() -> Self {
        Self::new(ODRE_BASE_URL)
    }
}

impl EnergyAdapter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl SourceAdapter for EnergyAdapter {
    fn source_id(&self) -> &'static str {
        ENERGY_SOURCE_ID
    }

    fn indicator_type(&self) -> IndicatorType {
        IndicatorType::ElectricityConsumption
    }

    fn request_for(&self, target: &ZoneTarget) -> Result<SourceRequest, AdapterError> {
        let region = target
            .region_label
            .as_deref()
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .ok_or_else(|| AdapterError::NotApplicable {
                source_id: ENERGY_SOURCE_ID,
                zone: target.zone_name.clone(),
                reason: "no region label configured".to_string(),
            })?;
        Ok(SourceRequest {
            url: join_url(&self.base_url, SEARCH_PATH),
            query: vec![
                ("dataset", ECO2MIX_DATASET.to_string()),
                ("q", String::new()),
                ("rows", ENERGY_ROWS.to_string()),
                ("sort", ENERGY_SORT.to_string()),
                ("refine.libelle_region", region.to_string()),
            ],
        })
    }

    fn parse(&self, body: &[u8], zone_id: ZoneId) -> Result<ParsedBatch, AdapterError> {
        parse_energy_records(body, zone_id)
    }
}

/// Normalize an OpenDataSoft record-search response into consumption readings.
///
/// A record without a numeric `consommation`, without `date_heure`, or whose
/// timestamp lacks a valid offset is skipped on its own.
pub fn parse_energy_records(body: &[u8], zone_id: ZoneId) -> Result<ParsedBatch, AdapterError> {
    let value: JsonValue = serde_json::from_slice(body).map_err(|err| AdapterError::Malformed {
        source_id: ENERGY_SOURCE_ID,
        reason: err.to_string(),
    })?;
    let records = value
        .get("records")
        .and_then(JsonValue::as_array)
        .ok_or_else(|| AdapterError::Malformed {
            source_id: ENERGY_SOURCE_ID,
            reason: "missing records array".to_string(),
        })?;

    let mut batch = ParsedBatch::default();
    for (index, record) in records.iter().enumerate() {
        let consumption = json_f64(record, &["fields", "consommation"]);
        let stamp = json_str(record, &["fields", "date_heure"]);
        let (Some(consumption), Some(stamp)) = (consumption, stamp) else {
            debug!(index, "record lacks consommation or date_heure");
            batch.rejected += 1;
            continue;
        };

        match parse_offset_timestamp(stamp) {
            Ok(timestamp) => batch.readings.push(ReadingDraft::new(
                IndicatorType::ElectricityConsumption,
                consumption,
                timestamp,
                zone_id,
            )),
            Err(err) => {
                debug!(index, %err, "skipping record");
                batch.rejected += 1;
            }
        }
    }
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn record_missing_consumption_is_skipped() {
        let body = br#"{"records":[
            {"fields":{"date_heure":"2024-01-01T00:15:00+01:00"}},
            {"fields":{"consommation":8123,"date_heure":"2024-01-01T00:00:00+01:00"}}
        ]}"#;
        let batch = parse_energy_records(body, ZoneId(4)).unwrap();

        assert_eq!(batch.readings.len(), 1);
        assert_eq!(batch.rejected, 1);
        let reading = &batch.readings[0];
        assert_eq!(reading.value, 8123.0);
        assert_eq!(reading.unit, "MW");
        assert_eq!(reading.zone_id, ZoneId(4));
        assert_eq!(
            reading.timestamp,
            Utc.with_ymd_and_hms(2023, 12, 31, 23, 0, 0).single().unwrap()
        );
    }

    #[test]
    fn unparseable_or_naive_timestamp_skips_record_only() {
        let body = br#"{"records":[
            {"fields":{"consommation":1,"date_heure":"hier"}},
            {"fields":{"consommation":2,"date_heure":"2024-01-01T00:00:00"}},
            {"fields":{"consommation":3,"date_heure":"2024-01-01T00:30:00+01:00"}},
            {"fields":{"consommation":null,"date_heure":"2024-01-01T00:45:00+01:00"}},
            {}
        ]}"#;
        let batch = parse_energy_records(body, ZoneId(1)).unwrap();
        assert_eq!(batch.readings.len(), 1);
        assert_eq!(batch.readings[0].value, 3.0);
        assert_eq!(batch.rejected, 4);
    }

    #[test]
    fn missing_records_is_malformed() {
        let err = parse_energy_records(br#"{"error":"Unknown dataset"}"#, ZoneId(1)).unwrap_err();
        assert!(matches!(err, AdapterError::Malformed { .. }));
    }

    #[test]
    fn request_filters_by_zone_region() {
        let adapter = EnergyAdapter::new("http://localhost:9001");
        let target = ZoneTarget {
            zone_id: ZoneId(1),
            zone_name: "Lyon".into(),
            coordinates: None,
            region_label: Some("Auvergne-Rhône-Alpes".into()),
        };
        let request = adapter.request_for(&target).unwrap();
        assert_eq!(request.url, "http://localhost:9001/api/records/1.0/search/");
        assert!(request
            .query
            .contains(&("refine.libelle_region", "Auvergne-Rhône-Alpes".to_string())));
        assert!(request.query.contains(&("rows", "50".to_string())));
        assert!(request.query.contains(&("sort", "-date_heure".to_string())));
        assert!(request
            .query
            .contains(&("dataset", "eco2mix-regional-tr".to_string())));
    }

    #[test]
    fn zone_without_region_is_not_applicable() {
        let target = ZoneTarget {
            zone_id: ZoneId(1),
            zone_name: "Somewhere".into(),
            coordinates: None,
            region_label: Some("   ".into()),
        };
        let err = EnergyAdapter::default().request_for(&target).unwrap_err();
        assert!(matches!(err, AdapterError::NotApplicable { .. }));
    }
}
