//! Typed CSV → Arrow decoding for `mdb-export` output.
//!
//! The caller supplies per-column types by name and date columns by
//! position. Columns with neither are typed by sampling the first rows.

pub mod convert;
pub mod date_parser;

use std::{
    collections::{BTreeMap, HashMap},
    io::{BufRead, BufReader, Chain, Cursor, Read},
    sync::Arc,
};

use arrow::{
    array::{Array, ArrayRef},
    compute::concat_batches,
    csv::{reader::Format, Reader, ReaderBuilder},
    datatypes::{DataType, Field, Schema, SchemaRef},
    error::ArrowError,
    record_batch::RecordBatch,
};
use regex::Regex;
use thiserror::Error;
use tracing::{debug, trace};

use crate::schema::{map_to_arrow_type, timestamp_type, ColumnType};

const DEFAULT_BATCH_SIZE: usize = 8192;
const DEFAULT_INFER_RECORDS: usize = 1000;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("Integer column has NA values in column {position}")]
    IntegerNulls { column: String, position: usize },

    #[error("cannot convert column `{column}` from {found}")]
    Conversion { column: String, found: DataType },

    #[error("invalid CSV option: {0}")]
    InvalidOption(String),

    #[error("CSV input has no header row")]
    MissingHeader,
}

/// Parsing directives handed over by the reader.
#[derive(Debug, Clone, Default)]
pub struct CsvOptions {
    /// Column name → type. Columns without an entry are inferred.
    pub dtype: HashMap<String, ColumnType>,
    /// Positions of columns to parse as timestamps.
    pub parse_dates: Vec<usize>,
    /// Rows per decoded batch.
    pub batch_size: Option<usize>,
    /// `delimiter`, `quote`, `escape`, `null_regex`, `batch_size`, `infer_records`.
    pub passthrough: BTreeMap<String, String>,
}

/// Resolved CSV dialect.
#[derive(Debug)]
struct Dialect {
    delimiter: u8,
    quote: u8,
    escape: Option<u8>,
    null_regex: Option<Regex>,
    batch_size: usize,
    infer_records: usize,
}

impl Dialect {
    fn from_options(options: &CsvOptions) -> Result<Self, FrameError> {
        let mut dialect = Dialect {
            delimiter: b',',
            quote: b'"',
            escape: None,
            null_regex: None,
            batch_size: DEFAULT_BATCH_SIZE,
            infer_records: DEFAULT_INFER_RECORDS,
        };
        let mut batch_size = None;

        for (key, value) in &options.passthrough {
            match key.as_str() {
                "delimiter" | "sep" => dialect.delimiter = single_byte(key, value)?,
                "quote" | "quotechar" => dialect.quote = single_byte(key, value)?,
                "escape" | "escapechar" => dialect.escape = Some(single_byte(key, value)?),
                "null_regex" => {
                    let re = Regex::new(value).map_err(|e| {
                        FrameError::InvalidOption(format!("null_regex `{}`: {}", value, e))
                    })?;
                    dialect.null_regex = Some(re);
                }
                "batch_size" => batch_size = Some(positive(key, value)?),
                "infer_records" => dialect.infer_records = positive(key, value)?,
                other => {
                    return Err(FrameError::InvalidOption(format!(
                        "unrecognised option `{}`",
                        other
                    )))
                }
            }
        }

        if let Some(n) = options.batch_size.or(batch_size) {
            if n == 0 {
                return Err(FrameError::InvalidOption("batch_size must be > 0".into()));
            }
            dialect.batch_size = n;
        }
        Ok(dialect)
    }

    fn format(&self) -> Format {
        let mut format = Format::default()
            .with_header(true)
            .with_delimiter(self.delimiter)
            .with_quote(self.quote);
        if let Some(escape) = self.escape {
            format = format.with_escape(escape);
        }
        if let Some(re) = &self.null_regex {
            format = format.with_null_regex(re.clone());
        }
        format
    }
}

fn single_byte(key: &str, value: &str) -> Result<u8, FrameError> {
    match value {
        "\\t" | "\t" => Ok(b'\t'),
        v if v.len() == 1 && v.is_ascii() => Ok(v.as_bytes()[0]),
        v => Err(FrameError::InvalidOption(format!(
            "`{}` must be a single ASCII character, got `{}`",
            key, v
        ))),
    }
}

fn positive(key: &str, value: &str) -> Result<usize, FrameError> {
    value
        .parse::<usize>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| {
            FrameError::InvalidOption(format!("`{}` must be a positive integer, got `{}`", key, value))
        })
}

/// How each decoded column is finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Finish {
    Keep,
    /// Declared integer: must not contain nulls.
    Integer,
    Date,
    Boolean,
}

#[derive(Debug)]
struct ColumnPlan {
    finish: Vec<Finish>,
    schema: SchemaRef,
}

impl ColumnPlan {
    /// Build the read schema (what Arrow decodes) and the output plan from
    /// the header-derived schema.
    fn build(inferred: &Schema, options: &CsvOptions) -> (Schema, ColumnPlan) {
        let mut read_fields = Vec::with_capacity(inferred.fields().len());
        let mut out_fields = Vec::with_capacity(inferred.fields().len());
        let mut finish = Vec::with_capacity(inferred.fields().len());

        for (idx, field) in inferred.fields().iter().enumerate() {
            let name = field.name();
            let (read_ty, out_ty, how) = if options.parse_dates.contains(&idx) {
                (DataType::Utf8, timestamp_type(), Finish::Date)
            } else {
                match options.dtype.get(name) {
                    Some(ColumnType::Boolean) => {
                        (DataType::Utf8, DataType::Boolean, Finish::Boolean)
                    }
                    Some(ty) => {
                        let dt = map_to_arrow_type(*ty);
                        let how = if ty.is_integer() {
                            Finish::Integer
                        } else {
                            Finish::Keep
                        };
                        (dt.clone(), dt, how)
                    }
                    None => {
                        let dt = match field.data_type() {
                            DataType::Null => DataType::Utf8,
                            other => other.clone(),
                        };
                        (dt.clone(), dt, Finish::Keep)
                    }
                }
            };
            trace!(column = %name, read = ?read_ty, out = ?out_ty, finish = ?how, "Column plan");
            read_fields.push(Field::new(name, read_ty, true));
            out_fields.push(Field::new(name, out_ty, how != Finish::Integer));
            finish.push(how);
        }

        let plan = ColumnPlan {
            finish,
            schema: Arc::new(Schema::new(out_fields)),
        };
        (Schema::new(read_fields), plan)
    }

    /// Finish one decoded batch. A date column whose text does not parse is
    /// switched to `Keep` for this and every later batch, and the output
    /// schema follows.
    fn apply(&mut self, batch: RecordBatch) -> Result<RecordBatch, FrameError> {
        let read_schema = batch.schema();
        let mut out = Vec::with_capacity(batch.num_columns());
        for (idx, arr) in batch.columns().iter().enumerate() {
            let name = read_schema.field(idx).name();
            let how = self.finish[idx];
            let col: ArrayRef = match how {
                Finish::Integer if arr.null_count() > 0 => {
                    return Err(FrameError::IntegerNulls {
                        column: name.clone(),
                        position: idx,
                    })
                }
                Finish::Integer | Finish::Keep => Arc::clone(arr),
                Finish::Date => match convert::convert_dates(arr, name)? {
                    Some(col) => col,
                    None => {
                        self.keep_as_read(idx, read_schema.field(idx));
                        Arc::clone(arr)
                    }
                },
                Finish::Boolean => convert::convert_booleans(arr, name)?,
            };
            out.push(col);
        }
        RecordBatch::try_new(Arc::clone(&self.schema), out).map_err(Into::into)
    }

    fn keep_as_read(&mut self, idx: usize, field: &Field) {
        self.finish[idx] = Finish::Keep;
        let mut fields: Vec<Field> = self
            .schema
            .fields()
            .iter()
            .map(|f| f.as_ref().clone())
            .collect();
        fields[idx] = field.clone();
        self.schema = Arc::new(Schema::new(fields));
    }
}

type Source<R> = Chain<Cursor<Vec<u8>>, BufReader<R>>;

/// Lazily decoded batches over a CSV stream. Single pass; stops after the first error.
pub struct CsvChunks<R: Read> {
    reader: Reader<Source<R>>,
    read_schema: SchemaRef,
    plan: ColumnPlan,
    finished: bool,
}

impl<R: Read> std::fmt::Debug for CsvChunks<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvChunks")
            .field("schema", &self.plan.schema)
            .field("finished", &self.finished)
            .finish()
    }
}

impl<R: Read> CsvChunks<R> {
    /// Output schema of the next batch. It only changes when a date column
    /// falls back to text.
    pub fn schema(&self) -> SchemaRef {
        Arc::clone(&self.plan.schema)
    }

    /// Decode every remaining row, then finish them as one batch so a date
    /// fallback covers the whole column.
    pub fn read_all(mut self) -> Result<RecordBatch, FrameError> {
        let raw = (&mut self.reader).collect::<Result<Vec<_>, _>>()?;
        let batch = if raw.is_empty() {
            RecordBatch::new_empty(Arc::clone(&self.read_schema))
        } else {
            concat_batches(&self.read_schema, &raw)?
        };
        self.plan.apply(batch)
    }
}

impl<R: Read> Iterator for CsvChunks<R> {
    type Item = Result<RecordBatch, FrameError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let item = match self.reader.next()? {
            Ok(batch) => self.plan.apply(batch),
            Err(e) => Err(e.into()),
        };
        if item.is_err() {
            self.finished = true;
        }
        Some(item)
    }
}

/// Open a CSV stream for chunked decoding.
pub fn open_csv<R: Read>(source: R, options: &CsvOptions) -> Result<CsvChunks<R>, FrameError> {
    let dialect = Dialect::from_options(options)?;
    let mut input = BufReader::new(source);

    let mut sample = Vec::new();
    if input.read_until(b'\n', &mut sample)? == 0 {
        return Err(FrameError::MissingHeader);
    }
    let header_only = dialect
        .format()
        .infer_schema(Cursor::new(&sample), Some(0))?
        .0;

    let needs_inference = header_only
        .fields()
        .iter()
        .enumerate()
        .any(|(idx, f)| !options.parse_dates.contains(&idx) && !options.dtype.contains_key(f.name()));

    let inferred = if needs_inference {
        let rows = read_sample(&mut input, &mut sample, &dialect)?;
        debug!(rows, "Inferring untyped columns from sample");
        dialect
            .format()
            .infer_schema(Cursor::new(&sample), Some(rows))?
            .0
    } else {
        header_only
    };

    let (read_schema, plan) = ColumnPlan::build(&inferred, options);
    let read_schema = Arc::new(read_schema);
    debug!(
        columns = read_schema.fields().len(),
        batch_size = dialect.batch_size,
        "Opening CSV reader"
    );

    let mut builder = ReaderBuilder::new(Arc::clone(&read_schema))
        .with_header(true)
        .with_batch_size(dialect.batch_size)
        .with_delimiter(dialect.delimiter)
        .with_quote(dialect.quote);
    if let Some(escape) = dialect.escape {
        builder = builder.with_escape(escape);
    }
    if let Some(re) = dialect.null_regex {
        builder = builder.with_null_regex(re);
    }
    let reader = builder.build(Cursor::new(sample).chain(input))?;

    Ok(CsvChunks {
        reader,
        read_schema,
        plan,
        finished: false,
    })
}

/// Decode a whole CSV stream into one batch.
pub fn read_csv<R: Read>(source: R, options: &CsvOptions) -> Result<RecordBatch, FrameError> {
    open_csv(source, options)?.read_all()
}

/// Append up to `dialect.infer_records` rows to `sample`, never stopping
/// inside a quoted field. Returns the number of rows read.
fn read_sample<R: BufRead>(
    input: &mut R,
    sample: &mut Vec<u8>,
    dialect: &Dialect,
) -> Result<usize, FrameError> {
    let mut rows = 0;
    let mut in_quotes = false;
    while rows < dialect.infer_records {
        let start = sample.len();
        if input.read_until(b'\n', sample)? == 0 {
            break;
        }
        let quotes = sample[start..].iter().filter(|b| **b == dialect.quote).count();
        if quotes % 2 == 1 {
            in_quotes = !in_quotes;
        }
        if !in_quotes {
            rows += 1;
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{
        BooleanArray, Float64Array, Int32Array, Int64Array, StringArray,
        TimestampMillisecondArray,
    };

    fn options(dtype: &[(&str, ColumnType)], parse_dates: &[usize]) -> CsvOptions {
        CsvOptions {
            dtype: dtype
                .iter()
                .map(|(n, t)| (n.to_string(), *t))
                .collect(),
            parse_dates: parse_dates.to_vec(),
            ..Default::default()
        }
    }

    const USERS: &str = "Id,Name,Joined,Active,Score\n\
        1,ann,2020-01-01 00:00:00,1,1.5\n\
        2,\"bob, jr\",2021-06-30 12:00:00,0,\n\
        3,cy,,1,3\n";

    #[test]
    fn typed_columns() {
        let opts = options(
            &[
                ("Id", ColumnType::Int64),
                ("Name", ColumnType::Utf8),
                ("Joined", ColumnType::Utf8),
                ("Active", ColumnType::Boolean),
                ("Score", ColumnType::Float64),
            ],
            &[2],
        );
        let batch = read_csv(Cursor::new(USERS), &opts).unwrap();
        assert_eq!(batch.num_rows(), 3);

        let schema = batch.schema();
        assert_eq!(schema.field(0).data_type(), &DataType::Int64);
        assert!(!schema.field(0).is_nullable());
        assert_eq!(schema.field(2).data_type(), &timestamp_type());
        assert_eq!(schema.field(3).data_type(), &DataType::Boolean);

        let ids = batch.column(0).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(ids.values().to_vec(), vec![1, 2, 3]);
        let names = batch.column(1).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(names.value(1), "bob, jr");
        let joined = batch
            .column(2)
            .as_any()
            .downcast_ref::<TimestampMillisecondArray>()
            .unwrap();
        assert_eq!(joined.value(0), 1_577_836_800_000);
        assert!(joined.is_null(2));
        let active = batch.column(3).as_any().downcast_ref::<BooleanArray>().unwrap();
        assert!(active.value(0));
        assert!(!active.value(1));
        let score = batch.column(4).as_any().downcast_ref::<Float64Array>().unwrap();
        assert!(score.is_null(1));
        assert_eq!(score.value(2), 3.0);
    }

    #[test]
    fn integer_column_with_missing_value_fails() {
        let opts = options(&[("Id", ColumnType::Int), ("Score", ColumnType::Int)], &[]);
        let err = read_csv(Cursor::new("Id,Score\n1,2\n2,\n"), &opts).unwrap_err();
        match err {
            FrameError::IntegerNulls { column, position } => {
                assert_eq!(column, "Score");
                assert_eq!(position, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn float_column_accepts_missing_values() {
        let opts = options(&[("Id", ColumnType::Int), ("Score", ColumnType::Float64)], &[]);
        let batch = read_csv(Cursor::new("Id,Score\n1,2\n2,\n"), &opts).unwrap();
        let ids = batch.column(0).as_any().downcast_ref::<Int32Array>().unwrap();
        assert_eq!(ids.values().to_vec(), vec![1, 2]);
        assert_eq!(batch.column(1).null_count(), 1);
    }

    #[test]
    fn untyped_columns_are_inferred() {
        let opts = options(&[("Name", ColumnType::Utf8)], &[]);
        let batch = read_csv(Cursor::new("Name,Count,Ratio\nx,1,0.5\ny,2,1.5\n"), &opts).unwrap();
        let schema = batch.schema();
        assert_eq!(schema.field(0).data_type(), &DataType::Utf8);
        assert_eq!(schema.field(1).data_type(), &DataType::Int64);
        assert_eq!(schema.field(2).data_type(), &DataType::Float64);
        // inferred integers may hold nulls
        assert!(schema.field(1).is_nullable());
    }

    #[test]
    fn sample_does_not_split_quoted_newlines() {
        let opts = CsvOptions {
            passthrough: BTreeMap::from([("infer_records".to_string(), "1".to_string())]),
            ..Default::default()
        };
        let csv = "Note,N\n\"line one\nline two\",1\nplain,2\n";
        let batch = read_csv(Cursor::new(csv), &opts).unwrap();
        assert_eq!(batch.num_rows(), 2);
        let notes = batch.column(0).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(notes.value(0), "line one\nline two");
    }

    #[test]
    fn chunks_follow_batch_size() {
        let opts = CsvOptions {
            dtype: HashMap::from([("N".to_string(), ColumnType::Int64)]),
            batch_size: Some(2),
            ..Default::default()
        };
        let chunks = open_csv(Cursor::new("N\n1\n2\n3\n4\n5\n"), &opts).unwrap();
        let sizes: Vec<usize> = chunks.map(|b| b.unwrap().num_rows()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn unparseable_date_keeps_whole_column_as_text() {
        let opts = CsvOptions {
            passthrough: BTreeMap::from([("batch_size".to_string(), "1".to_string())]),
            ..options(&[("Id", ColumnType::Int64), ("When", ColumnType::Utf8)], &[1])
        };
        let csv = "Id,When\n1,2020-01-01 00:00:00\n2,someday\n3,\n";

        let batch = read_csv(Cursor::new(csv), &opts).unwrap();
        assert_eq!(batch.schema().field(1).data_type(), &DataType::Utf8);
        let when = batch.column(1).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(when.value(0), "2020-01-01 00:00:00");
        assert_eq!(when.value(1), "someday");

        let mut chunks = open_csv(Cursor::new(csv), &opts).unwrap();
        let first = chunks.next().unwrap().unwrap();
        assert_eq!(first.schema().field(1).data_type(), &timestamp_type());
        let second = chunks.next().unwrap().unwrap();
        assert_eq!(second.schema().field(1).data_type(), &DataType::Utf8);
        assert_eq!(chunks.schema().field(1).data_type(), &DataType::Utf8);
    }

    #[test]
    fn header_only_gives_empty_batch() {
        let opts = options(&[("A", ColumnType::Int64), ("B", ColumnType::Utf8)], &[]);
        let batch = read_csv(Cursor::new("A,B\n"), &opts).unwrap();
        assert_eq!(batch.num_rows(), 0);
        assert_eq!(batch.num_columns(), 2);
    }

    #[test]
    fn empty_input_has_no_header() {
        let err = read_csv(Cursor::new(""), &CsvOptions::default()).unwrap_err();
        assert!(matches!(err, FrameError::MissingHeader));
    }

    #[test]
    fn passthrough_dialect() {
        let opts = CsvOptions {
            dtype: HashMap::from([
                ("A".to_string(), ColumnType::Utf8),
                ("B".to_string(), ColumnType::Float64),
            ]),
            passthrough: BTreeMap::from([
                ("delimiter".to_string(), ";".to_string()),
                ("null_regex".to_string(), "^(NULL)?$".to_string()),
            ]),
            ..Default::default()
        };
        let batch = read_csv(Cursor::new("A;B\nx;1,5\nNULL;2\n"), &opts);
        // `1,5` is not a float under `;` delimiting either
        assert!(matches!(batch, Err(FrameError::Arrow(_))));

        let batch = read_csv(Cursor::new("A;B\nx;1.5\nNULL;2\n"), &opts).unwrap();
        assert_eq!(batch.column(0).null_count(), 1);
    }

    #[test]
    fn unknown_passthrough_option_is_rejected() {
        let opts = CsvOptions {
            passthrough: BTreeMap::from([("skiprows".to_string(), "3".to_string())]),
            ..Default::default()
        };
        let err = read_csv(Cursor::new("A\n1\n"), &opts).unwrap_err();
        assert!(matches!(err, FrameError::InvalidOption(_)));
    }
}
