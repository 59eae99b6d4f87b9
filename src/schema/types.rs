// src/schema/types.rs

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::MdbError;

/// Semantic column type resolved from an Access type name.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Copy, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Float32,
    Float64,
    /// 64-bit signed integer (Access "Long Integer").
    Int64,
    /// Default-width signed integer (Access "Integer").
    Int,
    Utf8,
    Boolean,
}

impl ColumnType {
    pub fn is_integer(self) -> bool {
        matches!(self, ColumnType::Int | ColumnType::Int64)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ColumnType::Float32 => "float32",
            ColumnType::Float64 => "float64",
            ColumnType::Int64 => "int64",
            ColumnType::Int => "int",
            ColumnType::Utf8 => "utf8",
            ColumnType::Boolean => "boolean",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = MdbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "float32" | "f32" => Ok(ColumnType::Float32),
            "float64" | "f64" | "float" => Ok(ColumnType::Float64),
            "int64" | "i64" => Ok(ColumnType::Int64),
            "int" | "int32" | "i32" => Ok(ColumnType::Int),
            "utf8" | "str" | "string" => Ok(ColumnType::Utf8),
            "boolean" | "bool" => Ok(ColumnType::Boolean),
            other => Err(MdbError::InvalidOption(format!(
                "unknown column type `{}`",
                other
            ))),
        }
    }
}

/// Integer → float widening applied when projecting column types.
#[derive(Debug, Default, PartialEq, Clone, Copy, Eq)]
pub enum Promote {
    #[default]
    None,
    /// Every integer column becomes Float64.
    IntToFloat,
    /// Only integer columns not marked `NOT NULL` become Float64.
    NullableIntToFloat,
}

impl Promote {
    pub fn as_str(self) -> &'static str {
        match self {
            Promote::None => "none",
            Promote::IntToFloat => "int_to_float",
            Promote::NullableIntToFloat => "nullable_int_to_float",
        }
    }
}

impl fmt::Display for Promote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Promote {
    type Err = MdbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" | "" => Ok(Promote::None),
            "int_to_float" => Ok(Promote::IntToFloat),
            "nullable_int_to_float" => Ok(Promote::NullableIntToFloat),
            other => Err(MdbError::InvalidOption(format!(
                "unknown promote mode `{}` (expected `int_to_float` or `nullable_int_to_float`)",
                other
            ))),
        }
    }
}
