//! Bounded-size batch readers over source files
pub mod csv;
pub mod parquet;

use std::{fmt, path::Path};

use serde::{Deserialize, Serialize};

use crate::{error::SourceReadError, value::RawRow};

pub const DEFAULT_BATCH_SIZE: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Parquet,
    Csv,
}

impl SourceFormat {
    /// `.parquet`/`.pq` are columnar, anything else is delimited text.
    pub fn from_path(path: &Path) -> SourceFormat {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("parquet") || ext.eq_ignore_ascii_case("pq") => {
                SourceFormat::Parquet
            }
            _ => SourceFormat::Csv,
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFormat::Parquet => write!(f, "Parquet"),
            SourceFormat::Csv => write!(f, "CSV"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// max rows per batch
    pub batch_size: usize,
    /// field delimiter for delimited text
    pub delimiter: u8,
    /// columnar sources decode only these columns; `None` reads all of them
    pub projection: Option<Vec<String>>,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        ReaderOptions {
            batch_size: DEFAULT_BATCH_SIZE,
            delimiter: b',',
            projection: None,
        }
    }
}

/// Lazy, finite, non-restartable sequence of row batches.
///
/// No batch holds more than the configured batch size; `Ok(None)` marks the
/// end of the source and every later call returns it again.
pub trait ChunkedReader {
    fn columns(&self) -> &[String];
    fn next_batch(&mut self) -> Result<Option<Vec<RawRow>>, SourceReadError>;
}

impl<R: ChunkedReader + ?Sized> ChunkedReader for Box<R> {
    fn columns(&self) -> &[String] {
        (**self).columns()
    }

    fn next_batch(&mut self) -> Result<Option<Vec<RawRow>>, SourceReadError> {
        (**self).next_batch()
    }
}

/// Opens `path` with the reader matching `format`.
pub fn open(
    path: &Path,
    format: SourceFormat,
    opts: &ReaderOptions,
) -> Result<Box<dyn ChunkedReader + Send>, SourceReadError> {
    Ok(match format {
        SourceFormat::Parquet => Box::new(parquet::ParquetReader::open(
            path,
            opts.batch_size,
            opts.projection.as_deref(),
        )?),
        SourceFormat::Csv => Box::new(csv::CsvReader::open(path, opts.batch_size, opts.delimiter)?),
    })
}
