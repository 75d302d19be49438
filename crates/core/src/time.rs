//! Timestamp handling
//!
//! The container stores times as RFC 3339 text (`2024-05-01T12:00:00Z`).
//! All in-memory timestamps are `chrono::DateTime<Utc>`; comparisons between
//! them are the merge engine's conflict-resolution signal, so parsing must
//! be deterministic and lossless at second precision.

use chrono::{DateTime, TimeZone, Utc};

/// Timestamp type used throughout the engine.
pub type Timestamp = DateTime<Utc>;

/// The default timestamp: the Unix epoch.
///
/// Used for "never happened" markers (e.g. `LocationChanged` of a node that
/// was never moved) so that any real event compares newer.
pub fn epoch() -> Timestamp {
    Utc.timestamp_opt(0, 0).unwrap()
}

/// Parse a container timestamp.
///
/// Malformed values fall back to the epoch rather than failing the whole
/// decode; the anomaly is logged so tampering remains visible.
pub fn parse_kdbx(text: &str) -> Timestamp {
    match DateTime::parse_from_rfc3339(text.trim()) {
        Ok(dt) => dt.with_timezone(&Utc),
        Err(_) => {
            tracing::warn!(value = text, "unparseable timestamp, using epoch");
            epoch()
        }
    }
}

/// Format a timestamp in the container's textual form.
pub fn format_kdbx(ts: &Timestamp) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trip() {
        let ts = parse_kdbx("2024-05-01T12:34:56Z");
        assert_eq!(format_kdbx(&ts), "2024-05-01T12:34:56Z");
    }

    #[test]
    fn test_parse_with_offset_normalizes_to_utc() {
        let ts = parse_kdbx("2024-05-01T14:34:56+02:00");
        assert_eq!(format_kdbx(&ts), "2024-05-01T12:34:56Z");
    }

    #[test]
    fn test_malformed_falls_back_to_epoch() {
        assert_eq!(parse_kdbx("not a time"), epoch());
        assert_eq!(parse_kdbx(""), epoch());
    }

    #[test]
    fn test_epoch_compares_older_than_any_real_time() {
        let real = parse_kdbx("1999-01-01T00:00:00Z");
        assert!(epoch() < real);
    }
}
