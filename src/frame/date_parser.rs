use chrono::{NaiveDate, NaiveDateTime};

/// The format `mdb-export -D` is asked to emit.
pub const EXPORT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Older mdbtools ignore `-D` for some column kinds and fall back to these.
const FALLBACK_DATETIME_FORMATS: &[&str] = &["%m/%d/%y %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];
const DATE_ONLY_FORMAT: &str = "%Y-%m-%d";

/// Parse an exported date/time cell → millis since the epoch, wall-clock time.
pub fn parse_timestamp_millis(s: &str) -> Option<i64> {
    let s = s.trim().trim_matches('"');
    if s.is_empty() {
        return None;
    }

    std::iter::once(EXPORT_DATE_FORMAT)
        .chain(FALLBACK_DATETIME_FORMATS.iter().copied())
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, DATE_ONLY_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .map(|naive| naive.and_utc().timestamp_millis())
}
