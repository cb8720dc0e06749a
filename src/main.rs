use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand};
use flightbench::{
    benchmark::{Benchmark, BenchmarkReport, PipelineConfig, SourceSpec},
    ingester::CancelFlag,
    inspect::{self, SampleOutcome, DEFAULT_SAMPLE_ROWS},
    publisher::{kafka::KafkaBroker, memory::MemoryBroker, PublisherFactory},
    reader::DEFAULT_BATCH_SIZE,
    schema::Schema,
    settings::Settings,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[doc(hidden)]
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// config file, layered over config/default
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Benchmark every configured source (default)
    Run(RunArgs),
    /// Print row, column and row-group counts and the first rows of a Parquet file
    Inspect { path: PathBuf },
    /// Write the first rows of a Parquet file as CSV
    Sample {
        parquet: PathBuf,
        csv: PathBuf,
        #[arg(long, default_value_t = DEFAULT_SAMPLE_ROWS)]
        rows: usize,
    },
}

#[derive(clap::Args, Debug, Default)]
struct RunArgs {
    /// override pipeline.record_limit
    #[arg(long)]
    limit: Option<u64>,
    /// publish to an in-process queue instead of Kafka
    #[arg(long)]
    dry_run: bool,
    /// also write the report as JSON
    #[arg(long)]
    report_json: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();

    match args.command.unwrap_or(Command::Run(RunArgs::default())) {
        Command::Run(run) => {
            let settings = Settings::new(args.config.as_deref()).context("cannot load config")?;
            benchmark(settings, run).await
        }
        Command::Inspect { path } => {
            let summary = inspect::inspect_parquet(&path)
                .with_context(|| format!("cannot inspect {}", path.display()))?;
            print!("{summary}");
            Ok(())
        }
        Command::Sample { parquet, csv, rows } => {
            match inspect::write_csv_sample(&parquet, &csv, rows, DEFAULT_BATCH_SIZE)
                .with_context(|| format!("cannot sample {}", parquet.display()))?
            {
                SampleOutcome::Skipped => println!("{} exists, nothing to do", csv.display()),
                SampleOutcome::Written { rows } => {
                    println!("wrote {rows} rows to {}", csv.display())
                }
            }
            Ok(())
        }
    }
}

async fn benchmark(settings: Settings, run: RunArgs) -> anyhow::Result<()> {
    let schema_file = settings.schema_file();
    let schema = Schema::load(&schema_file)
        .with_context(|| format!("cannot load schema {}", schema_file.display()))?;
    info!(
        "loaded schema {} ({} fields)",
        schema.name(),
        schema.fields().len()
    );
    let schema = Arc::new(schema);

    let mut pipeline = settings.pipeline_config();
    if let Some(limit) = run.limit {
        pipeline.record_limit = limit;
    }
    let sources = settings.sources();
    if sources.is_empty() {
        warn!("no sources configured, nothing to benchmark");
    }

    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, stopping after the current batch");
                cancel.cancel();
            }
        });
    }

    let report = if run.dry_run {
        let broker = MemoryBroker::new(settings.memory_config());
        execute(schema, pipeline, broker, sources, cancel).await?
    } else {
        let broker = KafkaBroker::new(settings.kafka_config());
        execute(schema, pipeline, broker, sources, cancel).await?
    };

    println!("{report}");
    if let Some(path) = run.report_json {
        let json = serde_json::to_vec_pretty(&report)?;
        std::fs::write(&path, json)
            .with_context(|| format!("cannot write report {}", path.display()))?;
    }
    Ok(())
}

/// The pipeline is synchronous; keep it off the runtime's worker threads.
async fn execute<F>(
    schema: Arc<Schema>,
    pipeline: PipelineConfig,
    factory: F,
    sources: Vec<SourceSpec>,
    cancel: CancelFlag,
) -> anyhow::Result<BenchmarkReport>
where
    F: PublisherFactory + Send + 'static,
{
    let report = tokio::task::spawn_blocking(move || {
        Benchmark::new(schema, pipeline, factory)
            .with_cancel(cancel)
            .run_all(&sources)
    })
    .await?;
    Ok(report)
}
