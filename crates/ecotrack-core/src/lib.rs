//! Core domain model for EcoTrack: zones, canonical readings and their dedup key.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod timestamp;

pub use timestamp::{parse_hourly_timestamp, parse_offset_timestamp, TimestampError};

pub const CRATE_NAME: &str = "ecotrack-core";

pub const DEFAULT_COUNTRY: &str = "France";
pub const PLACEHOLDER_POSTAL_CODE: &str = "00000";

pub const UNIT_CELSIUS: &str = "°C";
pub const UNIT_MEGAWATT: &str = "MW";

/// Store-assigned zone identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoneId(pub i64);

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,
    pub name: String,
    pub postal_code: Option<String>,
    pub country: String,
}

/// Zone attributes used when the resolver has to create a missing zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewZone {
    pub name: String,
    pub postal_code: String,
    pub country: String,
}

impl NewZone {
    /// A zone with the placeholder postal code and the default country.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            postal_code: PLACEHOLDER_POSTAL_CODE.to_string(),
            country: DEFAULT_COUNTRY.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorType {
    Temperature,
    ElectricityConsumption,
}

impl IndicatorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::ElectricityConsumption => "electricity_consumption",
        }
    }

    /// Unit every reading of this type is recorded in.
    pub fn unit(&self) -> &'static str {
        match self {
            Self::Temperature => UNIT_CELSIUS,
            Self::ElectricityConsumption => UNIT_MEGAWATT,
        }
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown indicator type: {0}")]
pub struct UnknownIndicatorType(pub String);

impl FromStr for IndicatorType {
    type Err = UnknownIndicatorType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "temperature" => Ok(Self::Temperature),
            "electricity_consumption" => Ok(Self::ElectricityConsumption),
            other => Err(UnknownIndicatorType(other.to_string())),
        }
    }
}

/// Identity of a reading for idempotent ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReadingKey {
    pub zone_id: ZoneId,
    pub indicator_type: IndicatorType,
    pub timestamp: DateTime<Utc>,
}

/// Normalized reading produced by an adapter, before the store assigns identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingDraft {
    pub indicator_type: IndicatorType,
    pub value: f64,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
    pub zone_id: ZoneId,
}

impl ReadingDraft {
    pub fn new(
        indicator_type: IndicatorType,
        value: f64,
        timestamp: DateTime<Utc>,
        zone_id: ZoneId,
    ) -> Self {
        Self {
            indicator_type,
            value,
            unit: indicator_type.unit().to_string(),
            timestamp,
            zone_id,
        }
    }

    pub fn key(&self) -> ReadingKey {
        ReadingKey {
            zone_id: self.zone_id,
            indicator_type: self.indicator_type,
            timestamp: self.timestamp,
        }
    }
}

/// Persisted reading (the `indicators` table).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub id: i64,
    pub indicator_type: IndicatorType,
    pub value: f64,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
    pub zone_id: ZoneId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn indicator_type_round_trips_through_its_column_value() {
        for ty in [IndicatorType::Temperature, IndicatorType::ElectricityConsumption] {
            assert_eq!(ty.as_str().parse::<IndicatorType>().unwrap(), ty);
        }
        assert!("air_quality".parse::<IndicatorType>().is_err());
    }

    #[test]
    fn draft_takes_unit_from_indicator_type() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap();
        let draft = ReadingDraft::new(IndicatorType::Temperature, 12.5, ts, ZoneId(7));
        assert_eq!(draft.unit, "°C");
        assert_eq!(
            draft.key(),
            ReadingKey {
                zone_id: ZoneId(7),
                indicator_type: IndicatorType::Temperature,
                timestamp: ts,
            }
        );

        let energy = ReadingDraft::new(IndicatorType::ElectricityConsumption, 8123.0, ts, ZoneId(7));
        assert_eq!(energy.unit, "MW");
    }

    #[test]
    fn indicator_type_serializes_snake_case() {
        let json = serde_json::to_string(&IndicatorType::ElectricityConsumption).unwrap();
        assert_eq!(json, "\"electricity_consumption\"");
    }

    #[test]
    fn new_zone_defaults() {
        let zone = NewZone::named("Lyon");
        assert_eq!(zone.postal_code, PLACEHOLDER_POSTAL_CODE);
        assert_eq!(zone.country, "France");
    }
}
