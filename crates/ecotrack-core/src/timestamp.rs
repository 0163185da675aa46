use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimestampError {
    #[error("empty timestamp")]
    Empty,
    #[error("invalid naive timestamp {input:?}: {reason}")]
    Naive { input: String, reason: String },
    #[error("invalid offset timestamp {input:?}: {reason}")]
    Offset { input: String, reason: String },
}

const HOURLY_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S"];

/// Parse an hourly forecast timestamp (`YYYY-MM-DDTHH:MM`, no offset).
///
/// Forecast times are requested without a `timezone` parameter, so the
/// upstream reports them in GMT and they are read as UTC.
pub fn parse_hourly_timestamp(input: &str) -> Result<DateTime<Utc>, TimestampError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(TimestampError::Empty);
    }
    let mut last_err = None;
    for format in HOURLY_FORMATS {
        match NaiveDateTime::parse_from_str(trimmed, format) {
            Ok(naive) => return Ok(naive.and_utc()),
            Err(err) => last_err = Some(err),
        }
    }
    Err(TimestampError::Naive {
        input: input.to_string(),
        reason: last_err.map(|e| e.to_string()).unwrap_or_default(),
    })
}

/// Parse an RFC 3339 timestamp carrying a UTC offset and normalize it to UTC.
pub fn parse_offset_timestamp(input: &str) -> Result<DateTime<Utc>, TimestampError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(TimestampError::Empty);
    }
    DateTime::parse_from_rfc3339(trimmed)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| TimestampError::Offset {
            input: input.to_string(),
            reason: err.to_string(),
        })
}
