//! Error taxonomy of the ingestion pipeline.
//!
//! Severity decides where an error is caught:
//! - [`SchemaLoadError`] is fatal and aborts the process before any run.
//! - [`SourceReadError`] and [`PublisherError`] fail the current run only.
//! - [`NormalizationError`], [`EncodeError`] and [`SendError::Rejected`] are
//!   per-record: counted, logged, and skipped.
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchemaLoadError {
    #[error("cannot read schema file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed schema definition: {0}")]
    Malformed(String),

    #[error("schema must be a record, got {0}")]
    NotARecord(String),

    #[error("field '{field}' has unsupported type {found}")]
    UnsupportedType { field: String, found: String },

    #[error("avro rejected schema: {0}")]
    Avro(#[from] apache_avro::Error),
}

#[derive(Error, Debug)]
pub enum SourceReadError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parquet: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("arrow: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("column '{column}' has unsupported type {data_type}")]
    UnsupportedColumn { column: String, data_type: String },

    #[error("source has no column for required field '{0}'")]
    SchemaMismatch(String),
}

#[derive(Error, Debug, PartialEq)]
pub enum NormalizationError {
    #[error("field '{field}': cannot coerce {value} to {expected}")]
    Incompatible {
        field: String,
        expected: &'static str,
        value: String,
    },

    #[error("field '{field}': value {value} out of range for {expected}")]
    OutOfRange {
        field: String,
        expected: &'static str,
        value: String,
    },

    #[error("field '{field}': unparsable timestamp '{value}'")]
    Timestamp { field: String, value: String },
}

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("record has no entry for field '{0}'")]
    MissingField(String),

    #[error("field '{0}' is not nullable but the value is absent")]
    NullNotAllowed(String),

    #[error("field '{field}': expected {expected}, found {found}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("avro: {0}")]
    Avro(#[from] apache_avro::Error),

    #[error("decoded datum is not a record")]
    NotARecord,
}

#[derive(Error, Debug)]
pub enum PublisherError {
    #[error("kafka: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),
}

/// Rejection of a single `send`.
#[derive(Error, Debug)]
pub enum SendError {
    /// Local buffer is at its high-water mark; poll and retry.
    #[error("local queue is full")]
    QueueFull,

    #[error("rejected by client: {0}")]
    Rejected(String),
}

/// Errors that fail a whole run.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Source(#[from] SourceReadError),

    #[error(transparent)]
    Publisher(#[from] PublisherError),
}
