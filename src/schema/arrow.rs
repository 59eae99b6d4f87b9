// src/schema/arrow.rs

use arrow::datatypes::{DataType, TimeUnit};

use super::types::ColumnType;

/// Map a resolved column type onto the Arrow DataType it is decoded into.
///
/// - Float32 → Float32
/// - Float64 → Float64
/// - Int64   → Int64
/// - Int     → Int32
/// - Utf8    → Utf8
/// - Boolean → Boolean
pub fn map_to_arrow_type(ty: ColumnType) -> DataType {
    match ty {
        ColumnType::Float32 => DataType::Float32,
        ColumnType::Float64 => DataType::Float64,
        ColumnType::Int64 => DataType::Int64,
        ColumnType::Int => DataType::Int32,
        ColumnType::Utf8 => DataType::Utf8,
        ColumnType::Boolean => DataType::Boolean,
    }
}

/// DateTime columns are exported as local wall-clock time with no zone.
pub fn timestamp_type() -> DataType {
    DataType::Timestamp(TimeUnit::Millisecond, None)
}
