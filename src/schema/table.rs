// src/schema/table.rs

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::column::{parse_column_line, Column};
use super::types::{ColumnType, Promote};

/// An ordered list of columns for one table.
///
/// Column order is the order of the schema dump, which is also the column
/// order of `mdb-export`; date columns are handed to the CSV reader by position.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Eq)]
pub struct Table {
    name: String,
    columns: Vec<Column>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name() == name)
    }

    /// Override column types by name. Unknown names are ignored.
    pub fn update_types(&mut self, overrides: &HashMap<String, ColumnType>) {
        for col in &mut self.columns {
            if let Some(ty) = overrides.get(col.name()) {
                col.set_type(Some(*ty));
            }
        }
    }

    /// `{column name → type}` with `promote` applied per column.
    pub fn dtype_map(&self, promote: Promote) -> HashMap<String, Option<ColumnType>> {
        self.columns
            .iter()
            .map(|c| (c.name().to_string(), c.get_type(promote)))
            .collect()
    }

    /// Zero-based positions of all DateTime columns.
    pub fn date_column_positions(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_datetime())
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Replace the columns from a `CREATE TABLE` body such as
    ///
    /// ```text
    ///     [FieldA]   Text (100) NOT NULL,
    ///     [FieldB]   DateTime NOT NULL
    /// ```
    ///
    /// A table name inside `defs` is ignored. With `implicit_string`,
    /// columns of unknown type are read as text.
    pub fn parse_columns(&mut self, defs: &str, implicit_string: bool) {
        let mut columns = Vec::new();
        for line in defs.lines() {
            let Some(mut col) = parse_column_line(line) else {
                continue;
            };
            if col.get_type(Promote::None).is_none() && implicit_string {
                debug!(
                    table = %self.name,
                    column = %col.name(),
                    ty = %col.source_type(),
                    "Unknown type, reading as utf8"
                );
                col.set_type(Some(ColumnType::Utf8));
            }
            columns.push(col);
        }
        self.columns = columns;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GREAT_TABLE: &str = "CREATE TABLE [ThisNameIsIgnored]\n \
        (\n\
        \t[SomeDate]\t\t\tDateTime, \n\
        \t[SomeTime]\t\t\tDateTime NOT NULL, \n\
        \t[UserName]\t\t\tText (100), \n\
        \t[IsTested]\t\t\tBoolean NOT NULL, \n\
        \t[Value]\t\t\tDouble, \n\
        \t[Number]\t\t\tLong Integer \n\
        );";

    #[test]
    fn parses_definition_block() {
        let mut t = Table::new("GreatTable");
        t.parse_columns(GREAT_TABLE, true);

        assert_eq!(t.name(), "GreatTable");
        let cols = t.columns();
        assert_eq!(cols.len(), 6);
        assert_eq!(cols[0].name(), "SomeDate");
        assert_eq!(cols[0].get_type(Promote::None), Some(ColumnType::Utf8));
        assert!(cols[0].maybe_null());
        assert!(!cols[1].maybe_null());
        assert_eq!(cols[3].get_type(Promote::None), Some(ColumnType::Boolean));
        assert_eq!(cols[4].name(), "Value");
        assert_eq!(cols[4].get_type(Promote::None), Some(ColumnType::Float64));
        assert_eq!(cols[5].name(), "Number");
        assert_eq!(cols[5].get_type(Promote::None), Some(ColumnType::Int64));
        assert_eq!(t.date_column_positions(), vec![0, 1]);
    }

    #[test]
    fn parse_columns_replaces() {
        let mut t = Table::new("GreatTable");
        t.parse_columns(GREAT_TABLE, true);
        let first = t.columns().to_vec();
        t.parse_columns(GREAT_TABLE, true);
        assert_eq!(t.columns(), first.as_slice());
    }

    #[test]
    fn implicit_string_controls_unknown_types() {
        let defs = "\t[Price]\tCurrency,\n\t[Id]\tLong Integer NOT NULL\n";

        let mut t = Table::new("Orders");
        t.parse_columns(defs, true);
        assert_eq!(
            t.column("Price").unwrap().get_type(Promote::None),
            Some(ColumnType::Utf8)
        );

        t.parse_columns(defs, false);
        assert_eq!(t.column("Price").unwrap().get_type(Promote::None), None);
        assert_eq!(t.dtype_map(Promote::None)["Price"], None);
    }

    #[test]
    fn update_types_ignores_unknown_names() {
        let mut t = Table::new("GreatTable");
        t.parse_columns(GREAT_TABLE, true);
        let before = t.clone();

        let overrides = HashMap::from([("Missing".to_string(), ColumnType::Float32)]);
        t.update_types(&overrides);
        assert_eq!(t, before);

        let overrides = HashMap::from([("Number".to_string(), ColumnType::Utf8)]);
        t.update_types(&overrides);
        assert_eq!(
            t.column("Number").unwrap().get_type(Promote::IntToFloat),
            Some(ColumnType::Utf8)
        );
        assert_eq!(
            t.column("Value").unwrap().get_type(Promote::None),
            Some(ColumnType::Float64)
        );
    }

    #[test]
    fn dtype_map_applies_promotion_per_call() {
        let mut t = Table::new("Counts");
        t.parse_columns("[A] Integer NOT NULL,\n[B] Long Integer,\n[C] Single\n", true);

        let plain = t.dtype_map(Promote::None);
        assert_eq!(plain["A"], Some(ColumnType::Int));
        assert_eq!(plain["B"], Some(ColumnType::Int64));
        assert_eq!(plain["C"], Some(ColumnType::Float32));

        let nullable = t.dtype_map(Promote::NullableIntToFloat);
        assert_eq!(nullable["A"], Some(ColumnType::Int));
        assert_eq!(nullable["B"], Some(ColumnType::Float64));

        let all = t.dtype_map(Promote::IntToFloat);
        assert_eq!(all["A"], Some(ColumnType::Float64));
        assert_eq!(all["C"], Some(ColumnType::Float32));

        // promotion is not stored
        assert_eq!(t.dtype_map(Promote::None), plain);
    }
}
