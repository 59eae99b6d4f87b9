pub mod arrow;
pub mod catalog;
pub mod column;
pub mod ddl;
pub mod table;
pub mod types;

pub use self::arrow::{map_to_arrow_type, timestamp_type};
pub use catalog::Catalog;
pub use column::{parse_column_line, resolve_type, Column};
pub use ddl::{extract_table_blocks, parse_schema, strip_schema_noise};
pub use table::Table;
pub use types::{ColumnType, Promote};
