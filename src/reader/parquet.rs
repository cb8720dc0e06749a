//! Columnar source: Parquet files read through Arrow record batches.
//!
//! Opening touches only the footer metadata. Each [`ChunkedReader::next_batch`]
//! decodes at most `batch_size` rows, pulling row groups in on demand, so
//! memory stays bounded by the batch rather than the file.
use std::{fs::File, path::Path, sync::Arc};

use arrow::{
    array::{Array, ArrayRef, ArrowPrimitiveType, AsArray},
    compute::{can_cast_types, cast},
    datatypes::{
        DataType, Date32Type, Date64Type, Float16Type, Float32Type, Float64Type, Int16Type,
        Int32Type, Int64Type, Int8Type, TimeUnit as ArrowTimeUnit, TimestampMicrosecondType,
        TimestampMillisecondType, TimestampNanosecondType, TimestampSecondType, UInt16Type,
        UInt32Type, UInt64Type, UInt8Type,
    },
    record_batch::{RecordBatch, RecordBatchReader},
};
use parquet::arrow::{
    arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder},
    ProjectionMask,
};
use tracing::debug;

use super::ChunkedReader;
use crate::{
    error::SourceReadError,
    value::{RawRow, RawValue, TimeUnit},
};

const MILLIS_PER_DAY: i64 = 86_400_000;

pub struct ParquetReader {
    columns: Arc<[String]>,
    reader: ParquetRecordBatchReader,
    num_rows: i64,
    num_row_groups: usize,
}

impl ParquetReader {
    /// Opens `path`, decoding only the top-level columns named in `projection`
    /// when one is given. Other columns are never read, whatever their type.
    pub fn open(
        path: &Path,
        batch_size: usize,
        projection: Option<&[String]>,
    ) -> Result<ParquetReader, SourceReadError> {
        let file = File::open(path).map_err(|source| SourceReadError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
        let meta = builder.metadata();
        let num_rows = meta.file_metadata().num_rows();
        let num_row_groups = meta.num_row_groups();
        let mask = match projection {
            None => ProjectionMask::all(),
            Some(wanted) => {
                let roots = builder
                    .parquet_schema()
                    .root_schema()
                    .get_fields()
                    .iter()
                    .enumerate()
                    .filter(|(_, f)| wanted.iter().any(|w| w == f.name()))
                    .map(|(i, _)| i)
                    .collect::<Vec<_>>();
                ProjectionMask::roots(builder.parquet_schema(), roots)
            }
        };
        let reader = builder
            .with_projection(mask)
            .with_batch_size(batch_size.max(1))
            .build()?;
        let columns: Arc<[String]> = reader
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        debug!(
            path = %path.display(),
            num_rows,
            num_row_groups,
            columns = columns.len(),
            "opened parquet source"
        );
        Ok(ParquetReader {
            columns,
            reader,
            num_rows,
            num_row_groups,
        })
    }

    /// Row count from the footer.
    pub fn num_rows(&self) -> i64 {
        self.num_rows
    }

    pub fn num_row_groups(&self) -> usize {
        self.num_row_groups
    }
}

impl ChunkedReader for ParquetReader {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next_batch(&mut self) -> Result<Option<Vec<RawRow>>, SourceReadError> {
        match self.reader.next() {
            None => Ok(None),
            Some(Err(e)) => Err(e.into()),
            Some(Ok(batch)) => Ok(Some(batch_to_rows(&self.columns, &batch)?)),
        }
    }
}

/// Transposes a columnar batch into rows.
pub fn batch_to_rows(
    columns: &Arc<[String]>,
    batch: &RecordBatch,
) -> Result<Vec<RawRow>, SourceReadError> {
    let num_rows = batch.num_rows();
    let mut rows: Vec<Vec<RawValue>> = (0..num_rows)
        .map(|_| Vec::with_capacity(batch.num_columns()))
        .collect();
    for (name, array) in columns.iter().zip(batch.columns()) {
        for (row, value) in rows.iter_mut().zip(column_values(name, array)?) {
            row.push(value);
        }
    }
    Ok(rows
        .into_iter()
        .map(|values| RawRow::new(columns.clone(), values))
        .collect())
}

fn column_values(name: &str, array: &ArrayRef) -> Result<Vec<RawValue>, SourceReadError> {
    let values = match array.data_type() {
        DataType::Null => vec![RawValue::Null; array.len()],
        DataType::Boolean => {
            let arr = array.as_boolean();
            (0..arr.len())
                .map(|i| match arr.is_null(i) {
                    true => RawValue::Null,
                    false => RawValue::Boolean(arr.value(i)),
                })
                .collect()
        }
        DataType::Int8 => primitive::<Int8Type>(array, |v| RawValue::Integer(v.into())),
        DataType::Int16 => primitive::<Int16Type>(array, |v| RawValue::Integer(v.into())),
        DataType::Int32 => primitive::<Int32Type>(array, |v| RawValue::Integer(v.into())),
        DataType::Int64 => primitive::<Int64Type>(array, RawValue::Integer),
        DataType::UInt8 => primitive::<UInt8Type>(array, |v| RawValue::Integer(v.into())),
        DataType::UInt16 => primitive::<UInt16Type>(array, |v| RawValue::Integer(v.into())),
        DataType::UInt32 => primitive::<UInt32Type>(array, |v| RawValue::Integer(v.into())),
        DataType::UInt64 => primitive::<UInt64Type>(array, |v| match i64::try_from(v) {
            Ok(i) => RawValue::Integer(i),
            Err(_) => RawValue::Float(v as f64),
        }),
        DataType::Float16 => primitive::<Float16Type>(array, |v| RawValue::Float(v.to_f64())),
        DataType::Float32 => primitive::<Float32Type>(array, |v| RawValue::Float(v.into())),
        DataType::Float64 => primitive::<Float64Type>(array, RawValue::Float),
        DataType::Utf8 => {
            let arr = array.as_string::<i32>();
            (0..arr.len())
                .map(|i| match arr.is_null(i) {
                    true => RawValue::Null,
                    false => RawValue::Text(arr.value(i).to_string()),
                })
                .collect()
        }
        DataType::LargeUtf8 => {
            let arr = array.as_string::<i64>();
            (0..arr.len())
                .map(|i| match arr.is_null(i) {
                    true => RawValue::Null,
                    false => RawValue::Text(arr.value(i).to_string()),
                })
                .collect()
        }
        DataType::Timestamp(unit, _) => match unit {
            ArrowTimeUnit::Second => {
                primitive::<TimestampSecondType>(array, |v| timestamp(v, TimeUnit::Seconds))
            }
            ArrowTimeUnit::Millisecond => {
                primitive::<TimestampMillisecondType>(array, |v| timestamp(v, TimeUnit::Millis))
            }
            ArrowTimeUnit::Microsecond => {
                primitive::<TimestampMicrosecondType>(array, |v| timestamp(v, TimeUnit::Micros))
            }
            ArrowTimeUnit::Nanosecond => {
                primitive::<TimestampNanosecondType>(array, |v| timestamp(v, TimeUnit::Nanos))
            }
        },
        DataType::Date32 => primitive::<Date32Type>(array, |days| {
            timestamp(i64::from(days) * MILLIS_PER_DAY, TimeUnit::Millis)
        }),
        DataType::Date64 => primitive::<Date64Type>(array, |ms| timestamp(ms, TimeUnit::Millis)),
        // dictionaries, decimals, views and friends go through their text form
        other if can_cast_types(other, &DataType::Utf8) => {
            return column_values(name, &cast(array, &DataType::Utf8)?)
        }
        other => {
            return Err(SourceReadError::UnsupportedColumn {
                column: name.to_string(),
                data_type: other.to_string(),
            })
        }
    };
    Ok(values)
}

fn timestamp(value: i64, unit: TimeUnit) -> RawValue {
    RawValue::Timestamp { value, unit }
}

fn primitive<T: ArrowPrimitiveType>(
    array: &ArrayRef,
    f: impl Fn(T::Native) -> RawValue,
) -> Vec<RawValue> {
    let arr = array.as_primitive::<T>();
    (0..arr.len())
        .map(|i| match arr.is_null(i) {
            true => RawValue::Null,
            false => f(arr.value(i)),
        })
        .collect()
}
