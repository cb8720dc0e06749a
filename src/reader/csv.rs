//! Delimited-text source with a header row.
//!
//! Records are parsed incrementally from a buffered stream; cells are kept as
//! text and typed later by the normalizer.
use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
    sync::Arc,
};

use csv::{ReaderBuilder, StringRecord};

use super::ChunkedReader;
use crate::{
    error::SourceReadError,
    value::{RawRow, RawValue},
};

pub struct CsvReader<R: Read = BufReader<File>> {
    columns: Arc<[String]>,
    reader: csv::Reader<R>,
    batch_size: usize,
    record: StringRecord,
    done: bool,
}

impl CsvReader {
    pub fn open(path: &Path, batch_size: usize, delimiter: u8) -> Result<CsvReader, SourceReadError> {
        let file = File::open(path).map_err(|source| SourceReadError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        CsvReader::from_reader(BufReader::new(file), batch_size, delimiter)
    }
}

impl<R: Read> CsvReader<R> {
    pub fn from_reader(
        rdr: R,
        batch_size: usize,
        delimiter: u8,
    ) -> Result<CsvReader<R>, SourceReadError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .delimiter(delimiter)
            .from_reader(rdr);
        let columns: Arc<[String]> = reader.headers()?.iter().map(str::to_string).collect();
        Ok(CsvReader {
            columns,
            reader,
            batch_size: batch_size.max(1),
            record: StringRecord::new(),
            done: false,
        })
    }
}

impl<R: Read> ChunkedReader for CsvReader<R> {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next_batch(&mut self) -> Result<Option<Vec<RawRow>>, SourceReadError> {
        if self.done {
            return Ok(None);
        }
        let mut batch = Vec::with_capacity(self.batch_size);
        while batch.len() < self.batch_size {
            if !self.reader.read_record(&mut self.record)? {
                self.done = true;
                break;
            }
            let values = self
                .record
                .iter()
                .map(|cell| RawValue::Text(cell.to_string()))
                .collect();
            batch.push(RawRow::new(self.columns.clone(), values));
        }
        Ok(if batch.is_empty() { None } else { Some(batch) })
    }
}
