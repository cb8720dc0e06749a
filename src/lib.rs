//! ## flightbench
//! Bounded-memory ingestion benchmark: rows from Parquet and CSV files are
//! normalized against an Avro schema, encoded, and published to Kafka, and
//! throughput is reported per source.
//!
//! ## Installation
//! Just use cargo. Building needs librdkafka's build prerequisites (cmake, a C toolchain).
//!
//! ## Configuration
//! Example config:
//! ```toml
//! schema_file = "schemas/flight_schema.avsc"
//!
//! [broker]
//! brokers = "localhost:9092"
//! topic = "raw_flights"
//!
//! [pipeline]
//! batch_size = 1000                 # rows per read chunk
//! record_limit = 20000              # max records per source
//! buffer_high_water_mark = 100000   # max unacknowledged payloads
//! linger_ms = 10
//! timestamp_fields = ["FlightDate"] # converged to epoch milliseconds
//!
//! [[sources]]
//! path = "data/Combined_Flights_2022.parquet"
//!
//! [[sources]]
//! path = "data/flights_sample.csv"
//! ```
//! Every option can also be set from the environment, e.g.
//! `FLIGHTBENCH__PIPELINE__RECORD_LIMIT=5000`.
//!
//! ## Pipeline
//! Each source is one run: a [ChunkedReader] yields batches of at most
//! `batch_size` rows, the [Normalizer] converges nulls and timestamps, the
//! [AvroEncoder] produces a schema-bound datum, and a [Publisher] enqueues it.
//! A full publisher queue is backpressure: the run polls and retries, it never
//! drops the record. Records that fail normalization or encoding are counted
//! and skipped. Delivery failures are counted, not retried.
//!
//! At run end the publisher is drained, and the run's [RunMetrics] are added to
//! the final report.
//!
//! [ChunkedReader]: reader::ChunkedReader
//! [Normalizer]: normalizer::Normalizer
//! [AvroEncoder]: encoder::AvroEncoder
//! [Publisher]: publisher::Publisher
//! [RunMetrics]: benchmark::RunMetrics

pub mod benchmark;
pub mod encoder;
pub mod error;
pub mod ingester;
pub mod inspect;
pub mod normalizer;
pub mod publisher;
pub mod reader;
pub mod schema;
pub mod settings;
pub mod value;
