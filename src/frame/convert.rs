use arrow::array::{Array, ArrayRef, BooleanBuilder, StringArray, TimestampMillisecondBuilder};
use std::sync::Arc;
use tracing::warn;

use super::date_parser;
use super::FrameError;

/// Text → Timestamp(ms). Returns `None` when any non-empty cell fails to
/// parse, in which case the column stays text.
pub fn convert_dates(arr: &ArrayRef, column: &str) -> Result<Option<ArrayRef>, FrameError> {
    let sarr = as_strings(arr, column)?;
    let mut b = TimestampMillisecondBuilder::with_capacity(sarr.len());
    let mut rejected = 0usize;
    let mut first_rejected = None;
    for opt in sarr.iter() {
        let ts = opt.and_then(|s| {
            let parsed = date_parser::parse_timestamp_millis(s);
            if parsed.is_none() && !s.trim().is_empty() {
                rejected += 1;
                first_rejected.get_or_insert(s);
            }
            parsed
        });
        b.append_option(ts);
    }
    if rejected > 0 {
        warn!(
            column = %column,
            rejected,
            first = ?first_rejected,
            "Unparseable date values, column kept as text"
        );
        return Ok(None);
    }
    Ok(Some(Arc::new(b.finish()) as ArrayRef))
}

/// Text → Boolean, accepting the spellings mdb-export and friends use.
pub fn convert_booleans(arr: &ArrayRef, column: &str) -> Result<ArrayRef, FrameError> {
    let sarr = as_strings(arr, column)?;
    let mut b = BooleanBuilder::with_capacity(sarr.len());
    let mut rejected = 0usize;
    for opt in sarr.iter() {
        let v = opt.and_then(|s| {
            let parsed = parse_bool(s);
            if parsed.is_none() && !s.trim().is_empty() {
                rejected += 1;
            }
            parsed
        });
        b.append_option(v);
    }
    if rejected > 0 {
        warn!(column = %column, rejected, "Unparseable boolean values read as null");
    }
    Ok(Arc::new(b.finish()) as ArrayRef)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" => Some(true),
        "0" | "false" | "f" | "no" | "n" => Some(false),
        _ => None,
    }
}

fn as_strings<'a>(arr: &'a ArrayRef, column: &str) -> Result<&'a StringArray, FrameError> {
    arr.as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| FrameError::Conversion {
            column: column.to_string(),
            found: arr.data_type().clone(),
        })
}
