use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use mdbframe::{export, ColumnType, Encoding, MdbTools, Promote, ReadOptions};
use std::{path::PathBuf, process::exit};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "mdbframe",
    version,
    about = "Read Microsoft Access tables through mdbtools"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print table names, one per line.
    Tables {
        db: PathBuf,
        /// Encoding of the `mdb-tables` output.
        #[arg(long, value_name = "ENC", default_value = "utf-8")]
        encoding: Encoding,
    },
    /// Print the schema catalog as JSON.
    Schema {
        db: PathBuf,
        /// Encoding of the `mdb-schema` output.
        #[arg(long, value_name = "ENC", default_value = "utf-8")]
        encoding: Encoding,
        /// Leave columns of unknown Access type untyped instead of text.
        #[arg(long)]
        strict_types: bool,
    },
    /// Write a table to a Parquet file.
    Export(ExportArgs),
}

#[derive(Args, Debug)]
struct ExportArgs {
    db: PathBuf,
    table: String,
    out: PathBuf,
    /// Integer widening: none, int_to_float or nullable_int_to_float.
    #[arg(long, value_name = "MODE", default_value = "none")]
    promote: Promote,
    /// Stream the table in batches of this many rows.
    #[arg(long, value_name = "ROWS", value_parser = parse_chunk_size)]
    chunk_size: Option<usize>,
    /// Override a column type, e.g. --dtype Id=int64. Repeatable.
    #[arg(long = "dtype", value_name = "COLUMN=TYPE", value_parser = parse_dtype)]
    dtypes: Vec<(String, ColumnType)>,
    /// Encoding of the `mdb-schema` output.
    #[arg(long, value_name = "ENC", default_value = "utf-8")]
    encoding: Encoding,
    /// Infer every column instead of typing from the schema.
    #[arg(long)]
    no_schema_types: bool,
    /// Leave columns of unknown Access type to inference.
    #[arg(long)]
    strict_types: bool,
}

impl ExportArgs {
    fn read_options(&self) -> ReadOptions {
        let mut options = ReadOptions::default()
            .with_promote(self.promote)
            .with_schema_encoding(self.encoding)
            .with_schema_types(!self.no_schema_types)
            .with_implicit_string(!self.strict_types);
        if let Some(rows) = self.chunk_size {
            options = options.with_chunk_size(rows);
        }
        for (column, ty) in &self.dtypes {
            options = options.with_dtype(column.as_str(), *ty);
        }
        options
    }
}

fn parse_chunk_size(value: &str) -> Result<usize, String> {
    let rows = value
        .parse::<usize>()
        .map_err(|err| format!("invalid chunk size '{value}': {err}"))?;
    if rows == 0 {
        return Err("chunk size must be greater than zero".into());
    }
    Ok(rows)
}

fn parse_dtype(raw: &str) -> Result<(String, ColumnType), String> {
    let (column, ty) = raw
        .split_once('=')
        .ok_or_else(|| "expected COLUMN=TYPE".to_string())?;
    let ty = ty.parse::<ColumnType>().map_err(|err| err.to_string())?;
    Ok((column.to_string(), ty))
}

fn main() {
    // ─── 1) init logging ─────────────────────────────────────────────
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,mdbframe=info"));
    fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        error!("{:#}", e);
        exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    // ─── 2) resolve mdbtools ─────────────────────────────────────────
    let tools = MdbTools::from_env();

    match cli.command {
        Command::Tables { db, encoding } => {
            for name in tools.list_tables(&db, encoding)? {
                println!("{}", name);
            }
        }
        Command::Schema {
            db,
            encoding,
            strict_types,
        } => {
            let catalog = tools
                .read_schema(&db, encoding, !strict_types)
                .with_context(|| format!("reading schema of {}", db.display()))?;
            println!("{}", serde_json::to_string_pretty(&catalog)?);
        }
        Command::Export(args) => {
            let options = args.read_options();
            info!(db = %args.db.display(), table = %args.table, out = %args.out.display(), "export");
            let read = tools
                .read_table(&args.db, &args.table, &options)
                .with_context(|| format!("reading table {}", args.table))?;
            let (rows, bytes) = export::write_parquet(read, &args.out)?;
            println!("{} rows, {} bytes → {}", rows, bytes, args.out.display());
        }
    }
    Ok(())
}
