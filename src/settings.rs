//! Application config
use std::{path::PathBuf, time::Duration};

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::{
    benchmark::{PipelineConfig, SourceSpec},
    publisher::{kafka::KafkaConfig, memory::MemoryConfig},
    reader::SourceFormat,
};

pub const DEFAULT_SCHEMA_FILE: &str = "schemas/flight_schema.avsc";

/// Broker connection
#[derive(Deserialize, Default)]
pub struct Broker {
    /// bootstrap servers (default: localhost:9092)
    pub brokers: Option<String>,
    /// destination topic (default: raw_flights)
    pub topic: Option<String>,
    /// client id reported to the broker (default: flights-benchmark-producer)
    pub client_id: Option<String>,
    /// delivery timeout per message (default: 30000)
    pub message_timeout_ms: Option<u64>,
    /// max messages per broker request (default: 1000)
    pub batch_num_messages: Option<usize>,
}

/// Ingestion loop tuning
#[derive(Deserialize, Default)]
pub struct Pipeline {
    /// rows per read chunk (default: 1000)
    pub batch_size: Option<usize>,
    /// max records per source (default: 20000)
    pub record_limit: Option<u64>,
    /// max pending unacknowledged payloads (default: 100000)
    pub buffer_high_water_mark: Option<usize>,
    /// client-side linger before a forced send (default: 10ms)
    pub linger_ms: Option<u64>,
    /// drain barrier timeout at run end (default: 60s)
    pub drain_timeout_seconds: Option<u64>,
    /// fields converged to epoch milliseconds (default: ["FlightDate"])
    pub timestamp_fields: Option<Vec<String>>,
    /// single-byte field delimiter of text sources (default: ",")
    pub csv_delimiter: Option<String>,
}

/// One source file
#[derive(Deserialize)]
pub struct Source {
    pub path: PathBuf,
    /// parquet or csv (default: inferred from the extension)
    pub format: Option<SourceFormat>,
    /// label used in logs and the report (default: file name)
    pub name: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct Settings {
    /// Avro schema of the published records
    pub schema_file: Option<PathBuf>,
    #[serde(default)]
    pub broker: Broker,
    #[serde(default)]
    pub pipeline: Pipeline,
    /// Sources, benchmarked in order
    #[serde(default)]
    pub sources: Vec<Source>,
}

impl Settings {
    /// Layers `config/default`, then `cfgfile` (if given), then `FLIGHTBENCH__*`
    /// environment variables.
    pub fn new(cfgfile: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder =
            Config::builder().add_source(File::with_name("config/default").required(false));
        if let Some(cfgfile) = cfgfile {
            builder = builder.add_source(File::with_name(cfgfile).required(true));
        }
        let cfg = builder
            .add_source(
                Environment::with_prefix("FLIGHTBENCH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let settings: Settings = cfg.try_deserialize()?;
        settings.delimiter()?;
        Ok(settings)
    }

    pub fn schema_file(&self) -> PathBuf {
        self.schema_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SCHEMA_FILE))
    }

    fn delimiter(&self) -> Result<u8, ConfigError> {
        match self.pipeline.csv_delimiter.as_deref() {
            None => Ok(b','),
            Some(d) if d.len() == 1 => Ok(d.as_bytes()[0]),
            Some(d) => Err(ConfigError::Message(format!(
                "pipeline.csv_delimiter must be a single ASCII character, got {d:?}"
            ))),
        }
    }

    pub fn kafka_config(&self) -> KafkaConfig {
        let defaults = KafkaConfig::default();
        let b = &self.broker;
        let p = &self.pipeline;
        KafkaConfig {
            brokers: b.brokers.clone().unwrap_or(defaults.brokers),
            topic: b.topic.clone().unwrap_or(defaults.topic),
            client_id: b.client_id.clone().unwrap_or(defaults.client_id),
            linger: p.linger_ms.map(Duration::from_millis).unwrap_or(defaults.linger),
            batch_num_messages: b.batch_num_messages.unwrap_or(defaults.batch_num_messages),
            queue_high_water_mark: p
                .buffer_high_water_mark
                .unwrap_or(defaults.queue_high_water_mark),
            message_timeout: b
                .message_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.message_timeout),
        }
    }

    /// In-process stand-in for the broker, sized like the real client buffer.
    pub fn memory_config(&self) -> MemoryConfig {
        MemoryConfig {
            capacity: self.kafka_config().queue_high_water_mark,
            ..MemoryConfig::default()
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        let defaults = PipelineConfig::default();
        let p = &self.pipeline;
        PipelineConfig {
            batch_size: p.batch_size.unwrap_or(defaults.batch_size),
            record_limit: p.record_limit.unwrap_or(defaults.record_limit),
            drain_timeout: p
                .drain_timeout_seconds
                .map(Duration::from_secs)
                .unwrap_or(defaults.drain_timeout),
            timestamp_fields: p
                .timestamp_fields
                .clone()
                .unwrap_or(defaults.timestamp_fields),
            // validated in `new`
            delimiter: self.delimiter().unwrap_or(defaults.delimiter),
        }
    }

    pub fn sources(&self) -> Vec<SourceSpec> {
        self.sources
            .iter()
            .map(|s| {
                let mut spec = SourceSpec::from_path(&s.path);
                if let Some(format) = s.format {
                    spec.format = format;
                }
                if let Some(name) = &s.name {
                    spec.name = name.clone();
                }
                spec
            })
            .collect()
    }
}
