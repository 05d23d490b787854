use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

/// Whole seconds of a `[days.]HH:MM:SS[.fraction]` duration; 0 when absent or unparsable.
pub fn parse_duration_seconds(value: Option<&str>) -> i64 {
    value.and_then(try_parse_duration).unwrap_or(0)
}

fn try_parse_duration(value: &str) -> Option<i64> {
    let parts: Vec<&str> = value.trim().split(':').collect();
    if parts.len() != 3 {
        return None;
    }

    let (days, hours) = match parts[0].split_once('.') {
        Some((days, hours)) => (parse_part(days)?, parse_part(hours)?),
        None => (0, parse_part(parts[0])?),
    };
    let minutes = parse_part(parts[1])?;
    // fractional seconds are truncated
    let seconds = match parts[2].split_once('.') {
        Some((whole, fraction)) => {
            if !fraction.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            parse_part(whole)?
        }
        None => parse_part(parts[2])?,
    };

    days.checked_mul(86_400)?
        .checked_add(hours.checked_mul(3_600)?)?
        .checked_add(minutes.checked_mul(60)?)?
        .checked_add(seconds)
}

fn parse_part(value: &str) -> Option<i64> {
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    value.parse::<i64>().ok()
}

/// Parses the server's timestamps into an absolute UTC instant.
///
/// Offsets are honoured; timestamps without one are taken as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Some(parsed.and_utc());
        }
    }
    None
}

/// Canonical text form used for storage and for the dedup lookup.
///
/// Always nine fractional digits, so stored text sorts in time order.
pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}
