//! Timestamp and duration formatting shared by exports and UIs.
//!
//! All timestamps travel as RFC 3339 UTC strings with millisecond precision
//! and a `Z` suffix (`2024-01-01T08:00:00.000Z`). The first ten characters of
//! such a string are the UTC calendar date, which is how history dates are
//! derived.

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

/// Render a timestamp in the wire format.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a wire timestamp (any RFC 3339 offset is accepted and normalized to UTC).
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|source| Error::Timestamp {
            value: value.to_string(),
            source,
        })
}

/// Calendar day of a timestamp, equivalent to truncating its wire form to `YYYY-MM-DD`.
pub fn date_of(ts: DateTime<Utc>) -> NaiveDate {
    ts.date_naive()
}

/// Whole seconds between `start` and `end`, floored and clamped at zero.
pub fn duration_secs(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    let millis = end.signed_duration_since(start).num_milliseconds();
    millis.div_euclid(1000).max(0) as u64
}

/// Format seconds as zero-padded `HH:MM:SS`; hours are not wrapped at 24.
pub fn format_hms(secs: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60
    )
}

/// Format a timestamp as relative time (e.g., "2m ago").
pub fn format_relative_time(ts: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = now.signed_duration_since(ts);

    if duration.num_seconds() < 0 {
        "just now".to_string()
    } else if duration.num_seconds() < 60 {
        format!("{}s ago", duration.num_seconds())
    } else if duration.num_minutes() < 60 {
        format!("{}m ago", duration.num_minutes())
    } else if duration.num_hours() < 24 {
        format!("{}h ago", duration.num_hours())
    } else {
        ts.format("%b %d").to_string()
    }
}

/// Serde adapter writing timestamps in the wire format.
pub mod iso_millis {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_timestamp(*ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw).map_err(serde::de::Error::custom)
    }

    /// Same as the parent module for nullable fields (`null` while open).
    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            ts: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match ts {
                Some(ts) => serializer.serialize_str(&super::super::format_timestamp(*ts)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(raw) => super::super::parse_timestamp(&raw)
                    .map(Some)
                    .map_err(serde::de::Error::custom),
                None => Ok(None),
            }
        }
    }
}
