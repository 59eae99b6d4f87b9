//! Read Microsoft Access tables into Arrow record batches through mdbtools.
//!
//! `mdb-schema` output is parsed into typed column definitions which then
//! drive the decoding of `mdb-export` CSV output.

pub mod error;
pub mod export;
pub mod frame;
pub mod reader;
pub mod schema;
pub mod tools;

pub use error::{MdbError, MdbResult};
pub use reader::{list_tables, read_export, read_schema, read_table, ReadOptions, TableChunks, TableRead};
pub use schema::{Catalog, Column, ColumnType, Promote, Table};
pub use tools::{Encoding, MdbTools};
