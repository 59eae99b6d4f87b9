// src/export.rs

use std::{
    fs::{self, File},
    io::Read,
    path::Path,
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use parquet::{
    arrow::ArrowWriter,
    basic::{BrotliLevel, Compression},
    file::properties::WriterProperties,
};
use tracing::{debug, info};

use crate::reader::TableRead;

/// Write a table read to `output_path`. Returns `(rows, bytes on disk)`.
pub fn write_parquet<R: Read>(read: TableRead<R>, output_path: &Path) -> Result<(u64, u64)> {
    let props = WriterProperties::builder()
        .set_compression(Compression::BROTLI(BrotliLevel::try_new(5)?))
        .build();

    let file = File::create(output_path)
        .with_context(|| format!("creating file {}", output_path.display()))?;

    let mut rows = 0u64;
    match read {
        TableRead::Frame(batch) => {
            let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
                .context("creating parquet writer")?;
            writer.write(&batch).context("writing batch to parquet")?;
            rows += batch.num_rows() as u64;
            writer.close().context("closing parquet writer")?;
        }
        TableRead::Chunks(chunks) => {
            let schema = chunks.schema();
            let mut writer = ArrowWriter::try_new(file, Arc::clone(&schema), Some(props))
                .context("creating parquet writer")?;
            for (idx, batch) in chunks.enumerate() {
                let batch = batch.with_context(|| format!("reading chunk {}", idx))?;
                if batch.schema() != schema {
                    bail!(
                        "chunk {} kept a date column as text; export without a chunk size",
                        idx
                    );
                }
                writer.write(&batch).context("writing batch to parquet")?;
                rows += batch.num_rows() as u64;
                debug!(chunk = idx, rows = batch.num_rows(), "Wrote chunk");
            }
            writer.close().context("closing parquet writer")?;
        }
    }

    let bytes = fs::metadata(output_path)
        .context("getting file metadata")?
        .len();
    info!(path = %output_path.display(), rows, bytes, "Wrote parquet");
    Ok((rows, bytes))
}
