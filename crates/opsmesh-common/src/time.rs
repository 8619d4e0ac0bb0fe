//! ---
//! mesh_section: "01-core-functionality"
//! mesh_subsection: "module"
//! mesh_type: "source"
//! mesh_scope: "code"
//! mesh_description: "Shared primitives and utilities for the OpsMesh services."
//! mesh_version: "v0.1.0"
//! mesh_owner: "tbd"
//! ---
use chrono::{DateTime, Duration, SecondsFormat, Utc};

/// Capture the current wall-clock instant in UTC, truncated to the
/// millisecond precision of the cell format. A record stamped with this
/// value reads back from the store equal to itself.
pub fn utc_now() -> DateTime<Utc> {
    let now = Utc::now();
    now - Duration::nanoseconds(i64::from(now.timestamp_subsec_nanos() % 1_000_000))
}

/// Serialize a timestamp the way the backing store expects it (RFC 3339,
/// millisecond precision, `Z` suffix).
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a timestamp cell. Accepts any RFC 3339 offset and normalizes to UTC.
pub fn parse_timestamp(cell: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(cell.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_cell_format() {
        let now = utc_now();
        let parsed = parse_timestamp(&format_timestamp(now)).unwrap();
        assert_eq!(parsed.timestamp_millis(), now.timestamp_millis());
    }

    #[test]
    fn now_carries_no_sub_millisecond_component() {
        let now = utc_now();
        assert_eq!(now.timestamp_subsec_nanos() % 1_000_000, 0);
        // Stamp and cell form agree exactly, not just to the millisecond.
        assert_eq!(parse_timestamp(&format_timestamp(now)), Some(now));
    }

    #[test]
    fn parses_offset_timestamps_to_utc() {
        let parsed = parse_timestamp("2026-03-01T10:00:00+02:00").unwrap();
        assert_eq!(format_timestamp(parsed), "2026-03-01T08:00:00.000Z");
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_timestamp("not-a-timestamp").is_none());
        assert!(parse_timestamp("").is_none());
    }
}
