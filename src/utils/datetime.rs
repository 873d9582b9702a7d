//! DateTime parsing and formatting helpers for bitemporal store timestamps.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};

/// Parse a datetime string in various common formats into a UTC [`DateTime`].
///
/// Supported formats (attempted in order):
/// 1. RFC 3339 / ISO 8601 with timezone: `"2024-01-15T10:30:00Z"`, `"2024-01-15T10:30:00+05:00"`
/// 2. Nanosecond-precision store format: `"2024-01-15T10:30:00.000000000Z"`
/// 3. ISO 8601 without timezone (assumed UTC): `"2024-01-15T10:30:00"`
/// 4. ISO 8601 with sub-seconds but no timezone: `"2024-01-15T10:30:00.123"`
/// 5. Date only (midnight UTC): `"2024-01-15"`
/// 6. US date format (midnight UTC): `"01/15/2024"`
///
/// Returns `None` for empty input or unrecognised formats. Empty string is the
/// storage encoding for "unset", so `None` is the correct reading of it.
pub fn parse_flexible_datetime(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }

    // 1. RFC 3339 (covers the nanosecond format with Z suffix too).
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    // 2. ISO 8601 with sub-seconds but no timezone.
    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&ndt));
    }

    // 3. ISO 8601 without sub-seconds, no timezone.
    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(Utc.from_utc_datetime(&ndt));
    }

    // 4. Date only (midnight UTC).
    if let Ok(nd) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return nd
            .and_hms_opt(0, 0, 0)
            .map(|ndt| Utc.from_utc_datetime(&ndt));
    }

    // 5. US date format MM/DD/YYYY (midnight UTC).
    if let Ok(nd) = NaiveDate::parse_from_str(s, "%m/%d/%Y") {
        return nd
            .and_hms_opt(0, 0, 0)
            .map(|ndt| Utc.from_utc_datetime(&ndt));
    }

    None
}

/// Format a [`DateTime<Utc>`] as the RFC 3339 string written to the store.
///
/// Output format: `"2024-01-15T10:30:00Z"` (second precision, UTC).
pub fn format_rfc3339(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Format an optional timestamp, encoding `None` as the empty string.
///
/// Used for `invalid_at` / `expired_at`, whose unset state is stored as `""`.
pub fn format_optional_rfc3339(dt: &Option<DateTime<Utc>>) -> String {
    dt.as_ref().map(format_rfc3339).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_rfc3339_utc() {
        let dt = parse_flexible_datetime("2024-01-15T10:30:00Z").expect("should parse");
        assert_eq!(dt, Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_rfc3339_with_offset() {
        // +05:00 offset → 10:30 local = 05:30 UTC
        let dt = parse_flexible_datetime("2024-01-15T10:30:00+05:00").expect("should parse");
        assert_eq!(dt, Utc.with_ymd_and_hms(2024, 1, 15, 5, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_iso_no_tz() {
        let dt = parse_flexible_datetime("2024-01-15T10:30:00").expect("should parse");
        assert_eq!(dt, Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap());
    }

    #[test]
    fn test_parse_date_only() {
        let dt = parse_flexible_datetime("2024-01-15").expect("should parse");
        assert_eq!(dt, Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_us_date_format() {
        let dt = parse_flexible_datetime("01/15/2024").expect("should parse");
        assert_eq!(dt, Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_nanosecond_precision() {
        let dt = parse_flexible_datetime("2024-06-01T12:00:00.123456789Z").expect("should parse");
        assert_eq!(dt.nanosecond(), 123_456_789);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(parse_flexible_datetime("not a date").is_none());
        assert!(parse_flexible_datetime("2024-13-01").is_none());
    }

    #[test]
    fn test_parse_empty_is_unset() {
        assert!(parse_flexible_datetime("").is_none());
    }

    #[test]
    fn test_format_rfc3339() {
        let dt = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        assert_eq!(format_rfc3339(&dt), "2024-01-15T10:30:00Z");
    }

    #[test]
    fn test_format_roundtrip() {
        let dt = Utc.with_ymd_and_hms(2024, 6, 15, 8, 45, 30).unwrap();
        let formatted = format_rfc3339(&dt);
        let parsed = parse_flexible_datetime(&formatted).expect("roundtrip should parse");
        assert_eq!(dt, parsed);
    }

    #[test]
    fn test_format_optional_none_is_empty() {
        assert_eq!(format_optional_rfc3339(&None), "");
    }

    #[test]
    fn test_format_optional_some() {
        let dt = Utc.with_ymd_and_hms(2024, 12, 31, 0, 0, 0).unwrap();
        assert_eq!(format_optional_rfc3339(&Some(dt)), "2024-12-31T00:00:00Z");
    }
}

// Bring chrono time component accessors into scope for tests.
#[cfg(test)]
use chrono::Timelike;
