use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};

use crate::sinks::Table;

/// Fixed-width RFC 3339 so stored timestamps sort lexicographically.
pub fn format_datetime(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_optional_datetime(
    value: Option<String>,
    field: &str,
) -> Result<Option<DateTime<Utc>>> {
    match value {
        Some(raw) => parse_datetime(&raw, field).map(Some),
        None => Ok(None),
    }
}

pub fn parse_table(value: &str) -> Result<Table> {
    match value {
        "rotation_data" => Ok(Table::RotationData),
        "rotation_device" => Ok(Table::RotationDevice),
        other => bail!("unknown table {other}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn formatted_timestamps_parse_back() {
        let ts = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let text = format_datetime(&ts);
        assert_eq!(text, "2023-11-14T22:13:20.123Z");
        assert_eq!(parse_datetime(&text, "timestamp").unwrap(), ts);
    }

    #[test]
    fn table_names_round_trip() {
        for table in [Table::RotationData, Table::RotationDevice] {
            assert_eq!(parse_table(table.as_str()).unwrap(), table);
        }
        assert!(parse_table("sessions").is_err());
    }
}
