//! Text encodings for values SQLite has no native type for
//!
//! UUIDs are stored hyphenated. Timestamps are stored as RFC 3339 UTC text
//! with exactly six fractional digits and a `Z` suffix, so every stored
//! timestamp has the same width and string order is time order.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Layout produced by SQLite's own `datetime()` and `CURRENT_TIMESTAMP`.
const SQLITE_DATETIME: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("invalid UUID {text:?}: {source}")]
    Uuid { text: String, source: uuid::Error },

    #[error("invalid timestamp {0:?}")]
    Timestamp(String),
}

pub fn uuid_to_str(id: Uuid) -> String {
    id.hyphenated().to_string()
}

pub fn str_to_uuid(text: &str) -> Result<Uuid, ConversionError> {
    Uuid::parse_str(text).map_err(|source| ConversionError::Uuid {
        text: text.to_string(),
        source,
    })
}

pub fn datetime_to_str(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Accepts stored RFC 3339 text and SQLite's `datetime()` layout, which is
/// what rows written by hand or by SQL defaults carry.
pub fn str_to_datetime(text: &str) -> Result<DateTime<Utc>, ConversionError> {
    if let Ok(at) = DateTime::parse_from_rfc3339(text) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, SQLITE_DATETIME)
        .map(|naive| naive.and_utc())
        .map_err(|_| ConversionError::Timestamp(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{Duration, TimeZone, Timelike};

    fn sample() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 45).unwrap() + Duration::microseconds(123_456)
    }

    #[test]
    fn test_timestamps_are_fixed_width() {
        assert_eq!(datetime_to_str(sample()), "2024-01-15T10:30:45.123456Z");

        let whole = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 45).unwrap();
        assert_eq!(datetime_to_str(whole), "2024-01-15T10:30:45.000000Z");
    }

    #[test]
    fn test_timestamp_text_decodes_back() {
        assert_eq!(str_to_datetime(&datetime_to_str(sample())).unwrap(), sample());
    }

    #[test]
    fn test_string_order_is_time_order() {
        let later = sample() + Duration::microseconds(1);
        assert!(datetime_to_str(sample()) < datetime_to_str(later));
    }

    #[test]
    fn test_sqlite_datetime_layout() {
        let parsed = str_to_datetime("2024-01-15 10:30:45").unwrap();
        assert_eq!(parsed.hour(), 10);
        assert_eq!(parsed.second(), 45);
        assert_matches!(str_to_datetime("yesterday"), Err(ConversionError::Timestamp(_)));
    }

    #[test]
    fn test_uuid_text() {
        let id = Uuid::new_v4();
        let text = uuid_to_str(id);
        assert_eq!(text.len(), 36);
        assert_eq!(str_to_uuid(&text).unwrap(), id);
        assert_matches!(str_to_uuid("not-a-uuid"), Err(ConversionError::Uuid { .. }));
    }
}
