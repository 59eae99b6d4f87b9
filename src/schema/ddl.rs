// src/schema/ddl.rs

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, instrument, trace};

use super::catalog::Catalog;
use super::table::Table;

static CREATE_TABLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)CREATE TABLE \[(\w+)\]\s+\((.*?\));").unwrap());

/// Drop `-- comment` lines and blank lines from an `mdb-schema` dump.
pub fn strip_schema_noise(dump: &str) -> String {
    dump.lines()
        .filter(|l| !l.is_empty() && !l.starts_with('-'))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Every `CREATE TABLE [name] (...);` block as `(name, body)`, in dump order.
pub fn extract_table_blocks(ddl: &str) -> Vec<(String, String)> {
    CREATE_TABLE_RE
        .captures_iter(ddl)
        .map(|caps| {
            let name = caps[1].to_string();
            trace!(table = %name, "Found CREATE TABLE block");
            (name, caps[2].to_string())
        })
        .collect()
}

/// Parse a full `mdb-schema` dump into a catalog of tables.
#[instrument(level = "debug", skip(dump), fields(dump_len = dump.len()))]
pub fn parse_schema(dump: &str, implicit_string: bool) -> Catalog {
    let ddl = strip_schema_noise(dump);

    let mut catalog = Catalog::default();
    for (name, defs) in extract_table_blocks(&ddl) {
        let mut table = Table::new(name);
        table.parse_columns(&defs, implicit_string);
        trace!(table = %table.name(), columns = table.columns().len(), "Parsed table");
        catalog.insert(table);
    }

    debug!(tables = catalog.len(), "Finished schema parsing");
    catalog
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnType, Promote};

    const DUMP: &str = r#"-- ----------------------------------------------------------
-- MDB Tools - A library for reading MS Access database files
-- Copyright (C) 2000-2011 Brian Bruns and others.
-- ----------------------------------------------------------

-- That file uses encoding UTF-8

CREATE TABLE [Users]
 (
	[Id]			Long Integer NOT NULL,
	[Name]			Text (50),
	[Joined]			DateTime
);

-- CREATE INDEXES ...

CREATE TABLE [Orders]
 (
	[OrderId]			Long Integer NOT NULL,
	[UserId]			Long Integer,
	[Total]			Double,
	[Paid]			Boolean NOT NULL,
	[Notes]			Memo/Hyperlink (255)
);

-- CREATE Relationships ...
"#;

    #[test]
    fn strips_comments_and_blank_lines() {
        let ddl = strip_schema_noise("-- a\n\nCREATE TABLE [T]\n\n (\n-- b\n);\n");
        assert_eq!(ddl, "CREATE TABLE [T]\n (\n);");
    }

    #[test]
    fn extracts_blocks_in_order() {
        let blocks = extract_table_blocks(&strip_schema_noise(DUMP));
        let names: Vec<&str> = blocks.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["Users", "Orders"]);
        assert!(blocks[0].1.contains("[Joined]"));
        assert!(!blocks[0].1.contains("[OrderId]"));
    }

    #[test]
    fn no_blocks_is_empty() {
        assert!(extract_table_blocks("").is_empty());
        assert!(extract_table_blocks("-- nothing to see\nCREATE INDEX foo;").is_empty());
        assert!(parse_schema("-- only comments\n", true).is_empty());
    }

    #[test]
    fn parses_whole_dump() {
        let catalog = parse_schema(DUMP, true);
        assert_eq!(catalog.len(), 2);

        let users = catalog.get("Users").unwrap();
        assert_eq!(users.columns().len(), 3);
        assert_eq!(users.date_column_positions(), vec![2]);

        let orders = catalog.get("Orders").unwrap();
        let dtypes = orders.dtype_map(Promote::NullableIntToFloat);
        assert_eq!(dtypes["OrderId"], Some(ColumnType::Int64));
        assert_eq!(dtypes["UserId"], Some(ColumnType::Float64));
        assert_eq!(dtypes["Paid"], Some(ColumnType::Boolean));
        assert_eq!(dtypes["Notes"], Some(ColumnType::Utf8));

        let strict = parse_schema(DUMP, false);
        assert_eq!(strict.get("Orders").unwrap().dtype_map(Promote::None)["Notes"], None);
    }
}
