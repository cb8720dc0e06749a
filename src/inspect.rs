//! Source file utilities: metadata inspection and CSV sample generation.
use std::{
    fmt,
    fs::File,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Timelike};
use parquet::file::reader::{FileReader, SerializedFileReader};
use tracing::{info, warn};

use crate::{
    error::SourceReadError,
    reader::{parquet::ParquetReader, ChunkedReader},
    value::{RawRow, RawValue, TimeUnit},
};

pub const DEFAULT_SAMPLE_ROWS: usize = 50_000;
/// rows shown by `inspect`
pub const PREVIEW_ROWS: usize = 5;

#[derive(Debug, Clone)]
pub struct ParquetSummary {
    pub path: PathBuf,
    pub num_rows: i64,
    pub num_row_groups: usize,
    pub columns: Vec<String>,
    /// first rows of the file, empty when they could not be decoded
    pub preview: Vec<RawRow>,
}

impl fmt::Display for ParquetSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.path.display())?;
        writeln!(f, "  total rows:   {}", self.num_rows)?;
        writeln!(f, "  row groups:   {}", self.num_row_groups)?;
        writeln!(f, "  columns ({}):", self.columns.len())?;
        for (i, name) in self.columns.iter().enumerate() {
            writeln!(f, "    {:>3}. {name}", i + 1)?;
        }
        if let Some(first) = self.preview.first() {
            writeln!(f, "  first {} rows:", self.preview.len())?;
            writeln!(f, "    {}", first.columns().join(" | "))?;
            for row in &self.preview {
                let cells: Vec<String> = row.values().iter().map(csv_cell).collect();
                writeln!(f, "    {}", cells.join(" | "))?;
            }
        }
        Ok(())
    }
}

/// Reads the footer plus the first [`PREVIEW_ROWS`] rows.
pub fn inspect_parquet(path: &Path) -> Result<ParquetSummary, SourceReadError> {
    let file = File::open(path).map_err(|source| SourceReadError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = SerializedFileReader::new(file)?;
    let meta = reader.metadata();
    let columns = meta
        .file_metadata()
        .schema_descr()
        .root_schema()
        .get_fields()
        .iter()
        .map(|f| f.name().to_string())
        .collect();
    let preview = match read_preview(path) {
        Ok(rows) => rows,
        Err(e) => {
            warn!("no preview for {}: {e}", path.display());
            Vec::new()
        }
    };
    Ok(ParquetSummary {
        path: path.to_path_buf(),
        num_rows: meta.file_metadata().num_rows(),
        num_row_groups: meta.num_row_groups(),
        columns,
        preview,
    })
}

fn read_preview(path: &Path) -> Result<Vec<RawRow>, SourceReadError> {
    let mut reader = ParquetReader::open(path, PREVIEW_ROWS, None)?;
    Ok(reader.next_batch()?.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    /// target already existed and was left alone
    Skipped,
    Written { rows: usize },
}

/// Streams the first `rows` rows of a Parquet file into a CSV file with a
/// header row. An existing target is never overwritten.
pub fn write_csv_sample(
    parquet: &Path,
    target: &Path,
    rows: usize,
    batch_size: usize,
) -> Result<SampleOutcome, SourceReadError> {
    if target.exists() {
        info!("{} already exists, skipping sample", target.display());
        return Ok(SampleOutcome::Skipped);
    }
    let mut reader = ParquetReader::open(parquet, batch_size, None)?;
    let file = File::create(target).map_err(|source| SourceReadError::Write {
        path: target.to_path_buf(),
        source,
    })?;
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(reader.columns())?;

    let mut written = 0;
    while written < rows {
        let Some(batch) = reader.next_batch()? else {
            break;
        };
        for row in batch.iter().take(rows - written) {
            writer.write_record(row.values().iter().map(csv_cell))?;
            written += 1;
        }
    }
    writer.flush().map_err(|source| SourceReadError::Write {
        path: target.to_path_buf(),
        source,
    })?;
    info!("wrote {written} rows to {}", target.display());
    Ok(SampleOutcome::Written { rows: written })
}

/// Text rendering of a cell, readable back by the normalizer.
fn csv_cell(value: &RawValue) -> String {
    match value {
        RawValue::Null => String::new(),
        RawValue::Boolean(b) => (if *b { "True" } else { "False" }).to_string(),
        RawValue::Integer(i) => i.to_string(),
        RawValue::Float(f) if f.is_nan() => String::new(),
        RawValue::Float(f) => format!("{f:?}"),
        RawValue::Text(s) => s.clone(),
        RawValue::Timestamp { value, unit } => {
            let dt = unit
                .convert(*value, TimeUnit::Micros)
                .and_then(DateTime::from_timestamp_micros);
            match dt {
                Some(dt) if dt.num_seconds_from_midnight() == 0 && dt.nanosecond() == 0 => {
                    dt.format("%Y-%m-%d").to_string()
                }
                Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
                None => value.to_string(),
            }
        }
    }
}
