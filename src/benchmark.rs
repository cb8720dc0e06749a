//! Runs every configured source through the pipeline and collects metrics.
use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::{
    encoder::AvroEncoder,
    error::RunError,
    ingester::{CancelFlag, Ingester, RecordCounts},
    normalizer::Normalizer,
    publisher::{DeliveryReport, DeliveryTracker, PublisherFactory},
    reader::{self, ReaderOptions, SourceFormat, DEFAULT_BATCH_SIZE},
    schema::Schema,
};

pub const DEFAULT_RECORD_LIMIT: u64 = 20_000;
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// rows per read chunk
    pub batch_size: usize,
    /// max records taken from each source
    pub record_limit: u64,
    /// how long the drain barrier may block at run end
    pub drain_timeout: Duration,
    /// fields coerced to the canonical epoch resolution
    pub timestamp_fields: Vec<String>,
    pub delimiter: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            batch_size: DEFAULT_BATCH_SIZE,
            record_limit: DEFAULT_RECORD_LIMIT,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            timestamp_fields: vec!["FlightDate".to_string()],
            delimiter: b',',
        }
    }
}

impl PipelineConfig {
    /// Columnar reads are narrowed to the fields of `schema`.
    fn reader_options(&self, schema: &Schema) -> ReaderOptions {
        ReaderOptions {
            batch_size: self.batch_size,
            delimiter: self.delimiter,
            projection: Some(schema.fields().iter().map(|f| f.name.clone()).collect()),
        }
    }
}

/// One input file to benchmark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    pub name: String,
    pub path: PathBuf,
    pub format: SourceFormat,
}

impl SourceSpec {
    /// Infers the format from the extension and names the source after its file.
    pub fn from_path(path: impl Into<PathBuf>) -> SourceSpec {
        let path = path.into();
        let format = SourceFormat::from_path(&path);
        SourceSpec {
            name: display_name(&path),
            path,
            format,
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct RunMetrics {
    pub source: String,
    pub format: SourceFormat,
    #[serde(flatten)]
    pub status: RunStatus,
    #[serde(flatten)]
    pub counts: RecordCounts,
    pub delivery: DeliveryReport,
    #[serde(rename = "elapsed_seconds", serialize_with = "as_secs")]
    pub elapsed: Duration,
    pub throughput: f64,
}

fn as_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl RunMetrics {
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

/// Records sent per second of wall time, 0 for an instantaneous run.
pub fn throughput(records_sent: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        records_sent as f64 / secs
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BenchmarkReport {
    pub runs: Vec<RunMetrics>,
}

impl BenchmarkReport {
    pub fn has_failures(&self) -> bool {
        self.runs.iter().any(|r| !r.is_completed())
    }
}

impl fmt::Display for BenchmarkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:=<100}", "")?;
        writeln!(f, "BENCHMARK RESULTS")?;
        writeln!(f, "{:=<100}", "")?;
        writeln!(
            f,
            "{:<32} {:<8} {:>10} {:>10} {:>8} {:>10} {:>14}  {}",
            "source", "format", "sent", "delivered", "errors", "elapsed", "records/sec", "status"
        )?;
        for run in &self.runs {
            let errors = run.counts.normalization_errors
                + run.counts.encode_errors
                + run.counts.send_errors
                + run.delivery.failed;
            let status = match &run.status {
                RunStatus::Completed => "completed".to_string(),
                RunStatus::Failed(reason) => format!("failed: {reason}"),
            };
            writeln!(
                f,
                "{:<32} {:<8} {:>10} {:>10} {:>8} {:>9.2}s {:>14.2}  {}",
                run.source,
                run.format.to_string(),
                run.counts.records_sent,
                run.delivery.delivered,
                errors,
                run.elapsed.as_secs_f64(),
                run.throughput,
                status
            )?;
        }
        write!(f, "{:=<100}", "")
    }
}

/// Sequentially benchmarks sources against publishers built by `F`.
pub struct Benchmark<F: PublisherFactory> {
    config: PipelineConfig,
    factory: F,
    schema: Arc<Schema>,
    encoder: AvroEncoder,
    cancel: CancelFlag,
}

impl<F: PublisherFactory> Benchmark<F> {
    pub fn new(schema: Arc<Schema>, config: PipelineConfig, factory: F) -> Benchmark<F> {
        Benchmark {
            encoder: AvroEncoder::new(schema.clone()),
            schema,
            config,
            factory,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Benchmark<F> {
        self.cancel = cancel;
        self
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// A failed source never stops the ones queued after it; cancellation does.
    pub fn run_all(&self, sources: &[SourceSpec]) -> BenchmarkReport {
        let mut report = BenchmarkReport::default();
        for (i, source) in sources.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!("cancelled, skipping {} remaining source(s)", sources.len() - i);
                break;
            }
            report.runs.push(self.run_source(source));
        }
        report
    }

    pub fn run_source(&self, source: &SourceSpec) -> RunMetrics {
        info!(
            ">>> starting ingestion from {}: {}",
            source.format,
            source.path.display()
        );
        let tracker = DeliveryTracker::new();
        let start = Instant::now();
        let (counts, result) = self.ingest(source, &tracker);
        let elapsed = start.elapsed();

        let status = match result {
            Ok(()) => RunStatus::Completed,
            Err(e) => {
                error!("[{}] run failed: {e}", source.format);
                RunStatus::Failed(e.to_string())
            }
        };
        let metrics = RunMetrics {
            source: source.name.clone(),
            format: source.format,
            status,
            counts,
            delivery: tracker.report(),
            elapsed,
            throughput: throughput(counts.records_sent, elapsed),
        };
        info!(
            "[{}] finished: {} records in {:.2}s ({:.2} records/sec)",
            source.format,
            metrics.counts.records_sent,
            elapsed.as_secs_f64(),
            metrics.throughput
        );
        metrics
    }

    /// Counts are returned even when the run fails part-way.
    fn ingest(
        &self,
        source: &SourceSpec,
        tracker: &DeliveryTracker,
    ) -> (RecordCounts, Result<(), RunError>) {
        let opts = self.config.reader_options(&self.schema);
        let mut reader = match reader::open(&source.path, source.format, &opts) {
            Ok(reader) => reader,
            Err(e) => return (RecordCounts::default(), Err(e.into())),
        };
        if let Err(e) = self.schema.check_columns(reader.columns()) {
            return (RecordCounts::default(), Err(e.into()));
        }
        let publisher = match self.factory.create(tracker.clone()) {
            Ok(publisher) => publisher,
            Err(e) => return (RecordCounts::default(), Err(e.into())),
        };

        // pandas-style NA markers only mean "missing" in text sources
        let normalizer = Normalizer::new(self.schema.clone(), &self.config.timestamp_fields)
            .with_text_markers(source.format == SourceFormat::Csv);
        let mut ingester = Ingester::new(
            &normalizer,
            &self.encoder,
            publisher,
            self.config.record_limit,
            &self.cancel,
            source.format,
        );
        let result = ingester.run(&mut reader);
        // whatever was accepted still has to settle, failed run or not
        let (state, counts) = ingester.finish(self.config.drain_timeout);
        debug!("[{}] run ended in {state:?}", source.format);
        (counts, result.map_err(RunError::from))
    }
}
