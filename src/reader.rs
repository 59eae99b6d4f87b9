// src/reader.rs

use std::{
    collections::{BTreeMap, HashMap},
    io::Read,
    path::Path,
};

use arrow::{datatypes::SchemaRef, record_batch::RecordBatch};
use tracing::{debug, info, instrument};

use crate::error::{MdbError, MdbResult};
use crate::frame::{self, CsvChunks, CsvOptions};
use crate::schema::{parse_schema, Catalog, ColumnType, Promote, Table};
use crate::tools::{Encoding, ExportStream, MdbTools};

/// Options for [`MdbTools::read_table`].
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Per-column type overrides; win over the schema.
    pub dtype: HashMap<String, ColumnType>,
    pub promote: Promote,
    /// Take column types from `mdb-schema`. When false every column is inferred.
    pub use_schema_types: bool,
    pub schema_encoding: Encoding,
    /// Read columns of unknown Access type as text.
    pub implicit_string: bool,
    /// Return an iterator of batches of this many rows instead of one batch.
    pub chunk_size: Option<usize>,
    /// Forwarded to the CSV reader as-is.
    pub passthrough: BTreeMap<String, String>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            dtype: HashMap::new(),
            promote: Promote::None,
            use_schema_types: true,
            schema_encoding: Encoding::utf_8(),
            implicit_string: true,
            chunk_size: None,
            passthrough: BTreeMap::new(),
        }
    }
}

impl ReadOptions {
    pub fn with_dtype(mut self, column: impl Into<String>, ty: ColumnType) -> Self {
        self.dtype.insert(column.into(), ty);
        self
    }

    pub fn with_promote(mut self, promote: Promote) -> Self {
        self.promote = promote;
        self
    }

    pub fn with_schema_types(mut self, use_schema_types: bool) -> Self {
        self.use_schema_types = use_schema_types;
        self
    }

    pub fn with_schema_encoding(mut self, encoding: Encoding) -> Self {
        self.schema_encoding = encoding;
        self
    }

    pub fn with_implicit_string(mut self, implicit_string: bool) -> Self {
        self.implicit_string = implicit_string;
        self
    }

    pub fn with_chunk_size(mut self, rows: usize) -> Self {
        self.chunk_size = Some(rows);
        self
    }

    pub fn with_passthrough(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.passthrough.insert(key.into(), value.into());
        self
    }

    /// Directives for the CSV reader. Without a table only the explicit
    /// `dtype` overrides are typed; everything else is inferred.
    pub fn csv_options(&self, table: Option<&Table>) -> CsvOptions {
        let mut csv = CsvOptions {
            batch_size: self.chunk_size,
            passthrough: self.passthrough.clone(),
            ..Default::default()
        };
        match table {
            Some(table) => {
                csv.dtype = table
                    .dtype_map(self.promote)
                    .into_iter()
                    .filter_map(|(name, ty)| ty.map(|ty| (name, ty)))
                    .collect();
                csv.parse_dates = table.date_column_positions();
            }
            None => csv.dtype = self.dtype.clone(),
        }
        csv
    }
}

/// Result of a table read.
#[derive(Debug)]
pub enum TableRead<R: Read = ExportStream> {
    Frame(RecordBatch),
    Chunks(TableChunks<R>),
}

impl<R: Read> TableRead<R> {
    /// All rows as one batch, draining chunks if needed.
    pub fn into_frame(self) -> MdbResult<RecordBatch> {
        match self {
            TableRead::Frame(batch) => Ok(batch),
            TableRead::Chunks(chunks) => chunks.collect_frame(),
        }
    }
}

/// Lazy batches of a table export. Dropping it stops the export process.
#[derive(Debug)]
pub struct TableChunks<R: Read = ExportStream> {
    inner: CsvChunks<R>,
}

impl<R: Read> TableChunks<R> {
    pub fn schema(&self) -> SchemaRef {
        self.inner.schema()
    }

    fn collect_frame(self) -> MdbResult<RecordBatch> {
        self.inner.read_all().map_err(MdbError::from)
    }
}

impl<R: Read> Iterator for TableChunks<R> {
    type Item = MdbResult<RecordBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|r| r.map_err(MdbError::from))
    }
}

/// Decode an export stream according to `options`, translating CSV failures.
pub fn read_export<R: Read>(
    source: R,
    table: Option<&Table>,
    options: &ReadOptions,
) -> MdbResult<TableRead<R>> {
    let csv = options.csv_options(table);
    debug!(
        typed = csv.dtype.len(),
        dates = ?csv.parse_dates,
        chunk_size = ?options.chunk_size,
        "CSV directives"
    );

    if options.chunk_size.is_some() {
        let inner = frame::open_csv(source, &csv)?;
        Ok(TableRead::Chunks(TableChunks { inner }))
    } else {
        Ok(TableRead::Frame(frame::read_csv(source, &csv)?))
    }
}

impl MdbTools {
    /// Table names in the order `mdb-tables` prints them.
    #[instrument(level = "debug", skip(self))]
    pub fn list_tables(&self, db: &Path, encoding: Encoding) -> MdbResult<Vec<String>> {
        let raw = self.run_tables(db)?;
        let text = encoding.decode("mdb-tables", raw)?;
        let tables: Vec<String> = text.lines().map(str::to_string).collect();
        debug!(tables = tables.len(), "Listed tables");
        Ok(tables)
    }

    /// Parse `mdb-schema` output into a catalog.
    #[instrument(level = "debug", skip(self))]
    pub fn read_schema(
        &self,
        db: &Path,
        encoding: Encoding,
        implicit_string: bool,
    ) -> MdbResult<Catalog> {
        let raw = self.run_schema(db)?;
        let text = encoding.decode("mdb-schema", raw)?;
        Ok(parse_schema(&text, implicit_string))
    }

    /// Read a table, typing its columns from the database schema.
    #[instrument(level = "info", skip(self, options), fields(chunked = options.chunk_size.is_some()))]
    pub fn read_table(
        &self,
        db: &Path,
        table_name: &str,
        options: &ReadOptions,
    ) -> MdbResult<TableRead> {
        if !options.use_schema_types {
            let stream = self.spawn_export(db, table_name)?;
            return read_export(stream, None, options);
        }

        let mut catalog = self.read_schema(db, options.schema_encoding, options.implicit_string)?;
        let table = catalog
            .take(table_name)
            .ok_or_else(|| MdbError::TableNotFound(table_name.to_string()))?;
        self.read_typed(db, table, options)
    }

    /// Read a table with a schema the caller already holds, e.g. from an
    /// earlier [`MdbTools::read_schema`].
    pub fn read_table_with_schema(
        &self,
        db: &Path,
        table: &Table,
        options: &ReadOptions,
    ) -> MdbResult<TableRead> {
        self.read_typed(db, table.clone(), options)
    }

    fn read_typed(&self, db: &Path, mut table: Table, options: &ReadOptions) -> MdbResult<TableRead> {
        table.update_types(&options.dtype);
        info!(
            table = %table.name(),
            columns = table.columns().len(),
            promote = %options.promote,
            "Reading table"
        );
        let stream = self.spawn_export(db, table.name())?;
        read_export(stream, Some(&table), options)
    }
}

/// [`MdbTools::list_tables`] with tools from the environment.
pub fn list_tables<P: AsRef<Path>>(db: P, encoding: Encoding) -> MdbResult<Vec<String>> {
    MdbTools::from_env().list_tables(db.as_ref(), encoding)
}

/// [`MdbTools::read_schema`] with tools from the environment.
pub fn read_schema<P: AsRef<Path>>(
    db: P,
    encoding: Encoding,
    implicit_string: bool,
) -> MdbResult<Catalog> {
    MdbTools::from_env().read_schema(db.as_ref(), encoding, implicit_string)
}

/// [`MdbTools::read_table`] with tools from the environment.
pub fn read_table<P: AsRef<Path>>(
    db: P,
    table_name: &str,
    options: &ReadOptions,
) -> MdbResult<TableRead> {
    MdbTools::from_env().read_table(db.as_ref(), table_name, options)
}
