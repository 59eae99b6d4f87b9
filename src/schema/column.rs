// src/schema/column.rs

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::types::{ColumnType, Promote};

/// Access type-name prefixes, checked in order against the lowercased type.
const TYPE_PREFIXES: &[(&str, ColumnType)] = &[
    ("single", ColumnType::Float32),
    ("double", ColumnType::Float64),
    ("long integer", ColumnType::Int64),
    ("integer", ColumnType::Int),
    ("text", ColumnType::Utf8),
    ("long text", ColumnType::Utf8),
    ("boolean", ColumnType::Boolean),
    // read as text, turned into timestamps by the CSV reader
    ("datetime", ColumnType::Utf8),
];

/// `[Name]   Type (size) NOT NULL,`
static COLUMN_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*\[(\w+)\]\s*(.*?)(?:\s+(NOT NULL))?,?\s*$").unwrap()
});

/// A single column definition as parsed from an `mdb-schema` dump.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Eq)]
pub struct Column {
    name: String,
    source_type: String,
    not_null: bool,
    resolved_type: Option<ColumnType>,
}

impl Column {
    pub fn new(name: impl Into<String>, source_type: impl Into<String>, not_null: bool) -> Self {
        let source_type = source_type.into();
        let resolved_type = resolve_type(&source_type);
        Self {
            name: name.into(),
            source_type,
            not_null,
            resolved_type,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The type token exactly as it appeared in the schema text.
    pub fn source_type(&self) -> &str {
        &self.source_type
    }

    pub fn is_not_null(&self) -> bool {
        self.not_null
    }

    pub fn maybe_null(&self) -> bool {
        !self.not_null
    }

    pub fn is_datetime(&self) -> bool {
        self.source_type
            .trim()
            .to_ascii_lowercase()
            .starts_with("datetime")
    }

    /// Resolved type after applying `promote`. Promotion never changes the stored type.
    pub fn get_type(&self, promote: Promote) -> Option<ColumnType> {
        match self.resolved_type {
            Some(ty) if ty.is_integer() => match promote {
                Promote::IntToFloat => Some(ColumnType::Float64),
                Promote::NullableIntToFloat if self.maybe_null() => Some(ColumnType::Float64),
                _ => Some(ty),
            },
            other => other,
        }
    }

    pub fn set_type(&mut self, ty: Option<ColumnType>) {
        self.resolved_type = ty;
    }
}

/// Map an Access type name onto a semantic type by case-insensitive prefix.
pub fn resolve_type(source_type: &str) -> Option<ColumnType> {
    let lower = source_type.trim().to_ascii_lowercase();
    TYPE_PREFIXES
        .iter()
        .find(|(prefix, _)| lower.starts_with(prefix))
        .map(|&(_, ty)| ty)
}

/// Parse one column line of a `CREATE TABLE` body.
///
/// Returns `None` for anything that is not a column definition (blank lines,
/// the `CREATE TABLE` header, the closing paren).
pub fn parse_column_line(line: &str) -> Option<Column> {
    let caps = COLUMN_LINE_RE.captures(line)?;
    let name = caps.get(1)?.as_str();
    let source_type = caps.get(2).map_or("", |m| m.as_str());
    // the suffix is recognised in any case but only the uppercase form
    // mdb-schema prints marks the column as required
    let not_null = caps.get(3).is_some_and(|m| m.as_str() == "NOT NULL");

    let column = Column::new(name, source_type, not_null);
    trace!(
        name = %column.name,
        ty = %column.source_type,
        not_null,
        resolved = ?column.resolved_type,
        "Parsed column"
    );
    Some(column)
}
