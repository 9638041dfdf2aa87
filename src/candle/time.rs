//! Timestamp codecs
//!
//! Storage uses fixed-width UTC RFC 3339 text so that lexical order in SQL
//! matches instant order. The API wants local ISO-8601 with an explicit offset.

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};

/// Format an instant for the `start`/`end` columns, e.g. `2024-01-01T14:31:00.000000Z`
pub fn format_storage_timestamp(ts: &DateTime<FixedOffset>) -> String {
    ts.with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Format an instant for API query parameters, e.g. `2014-01-02T00:00:00.000000-05:00`
pub fn format_api_timestamp(ts: &DateTime<FixedOffset>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.6f%:z").to_string()
}

/// Parse an RFC 3339 timestamp with an explicit offset
pub fn parse_timestamp(value: &str) -> Result<DateTime<FixedOffset>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value.trim())
}
