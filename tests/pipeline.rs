use std::{
    fs::File,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use arrow::{
    array::{
        ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray, StructArray,
        TimestampMicrosecondArray,
    },
    datatypes::{DataType, Field, Fields, Schema as ArrowSchema, TimeUnit},
    record_batch::RecordBatch,
};
use flightbench::{
    benchmark::{Benchmark, PipelineConfig, RunStatus, SourceSpec},
    encoder::AvroEncoder,
    inspect::{self, SampleOutcome},
    publisher::memory::{MemoryBroker, MemoryConfig},
    schema::Schema,
    value::{FieldValue, NormalizedRecord},
};
use parquet::{arrow::ArrowWriter, file::properties::WriterProperties};

/// 2022-01-15T00:00:00Z
const JAN_15_MICROS: i64 = 1_642_204_800_000_000;
const DAY_MICROS: i64 = 86_400_000_000;

fn flight_schema() -> Arc<Schema> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("schemas/flight_schema.avsc");
    Arc::new(Schema::load(path).unwrap())
}

/// Columns named like the flights dataset, one day apart per row.
fn write_flights_parquet(path: &Path, rows: usize, row_group_size: usize) {
    let schema = Arc::new(ArrowSchema::new(vec![
        Field::new(
            "FlightDate",
            DataType::Timestamp(TimeUnit::Microsecond, None),
            false,
        ),
        Field::new("Airline", DataType::Utf8, true),
        Field::new("Origin", DataType::Utf8, true),
        Field::new("Cancelled", DataType::Boolean, true),
        Field::new("DepDelay", DataType::Float64, true),
        Field::new("Distance", DataType::Float64, true),
        Field::new("Year", DataType::Int64, true),
        Field::new("Flight_Number_Operating_Airline", DataType::Int64, true),
    ]));
    let props = WriterProperties::builder()
        .set_max_row_group_size(row_group_size)
        .build();
    let mut writer =
        ArrowWriter::try_new(File::create(path).unwrap(), schema.clone(), Some(props)).unwrap();

    // written in slices so the fixture itself stays small in memory
    for start in (0..rows).step_by(5_000) {
        let end = (start + 5_000).min(rows);
        let idx = start as i64..end as i64;
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(TimestampMicrosecondArray::from_iter_values(
                    idx.clone().map(|i| JAN_15_MICROS + (i % 365) * DAY_MICROS),
                )),
                Arc::new(StringArray::from_iter(idx.clone().map(|i| {
                    (i % 7 != 0).then(|| ["Endeavor Air Inc.", "Delta Air Lines Inc."][i as usize % 2].to_string())
                }))),
                Arc::new(StringArray::from_iter_values(idx.clone().map(|i| {
                    ["GJT", "HOU", "ATL"][i as usize % 3]
                }))),
                Arc::new(BooleanArray::from_iter(idx.clone().map(|i| Some(i % 11 == 0)))),
                Arc::new(Float64Array::from_iter(idx.clone().map(|i| {
                    Some(if i % 4 == 0 { f64::NAN } else { (i % 90) as f64 - 10.0 })
                }))),
                Arc::new(Float64Array::from_iter(
                    idx.clone().map(|i| Some(300.0 + (i % 1500) as f64)),
                )),
                Arc::new(Int64Array::from_iter_values(idx.clone().map(|_| 2022))),
                Arc::new(Int64Array::from_iter(
                    idx.map(|i| (i % 13 != 0).then_some(4000 + i)),
                )),
            ],
        )
        .unwrap();
        writer.write(&batch).unwrap();
    }
    writer.close().unwrap();
}

fn write_flights_csv(path: &Path, rows: usize, bad_row: Option<usize>) {
    let mut f = File::create(path).unwrap();
    writeln!(f, "FlightDate,Airline,Origin,Cancelled,DepDelay,Distance,Year").unwrap();
    for i in 0..rows {
        let distance = match bad_row {
            Some(bad) if bad == i => "not-a-number".to_string(),
            _ => format!("{}.0", 300 + i),
        };
        writeln!(
            f,
            "2022-04-{:02},Commutair Aka Champlain Enterprises Inc.,GJT,False,-6.0,{distance},2022",
            i % 28 + 1
        )
        .unwrap();
    }
}

fn retaining_broker() -> MemoryBroker {
    MemoryBroker::new(MemoryConfig {
        retain: true,
        ..MemoryConfig::default()
    })
}

fn config(record_limit: u64) -> PipelineConfig {
    PipelineConfig {
        record_limit,
        drain_timeout: Duration::from_secs(5),
        ..PipelineConfig::default()
    }
}

fn decode_all(schema: &Arc<Schema>, broker: &MemoryBroker) -> Vec<NormalizedRecord> {
    let encoder = AvroEncoder::new(schema.clone());
    broker
        .delivered()
        .iter()
        .map(|payload| encoder.decode(payload).unwrap())
        .collect()
}

#[test]
fn columnar_source_stops_at_record_limit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flights.parquet");
    write_flights_parquet(&path, 25_000, 10_000);

    let report = Benchmark::new(flight_schema(), config(20_000), MemoryBroker::default())
        .run_all(&[SourceSpec::from_path(&path)]);

    let run = &report.runs[0];
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.counts.records_read, 20_000);
    assert_eq!(run.counts.records_sent, 20_000);
    assert_eq!(run.delivery.delivered, 20_000);
    assert_eq!(run.counts.batches, 20);
    assert!(run.elapsed > Duration::ZERO);
    assert!(run.throughput > 0.0);
}

#[test]
fn bad_text_value_is_skipped_and_counted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flights_sample.csv");
    write_flights_csv(&path, 40, Some(12));

    let report = Benchmark::new(flight_schema(), config(25), MemoryBroker::default())
        .run_all(&[SourceSpec::from_path(&path)]);

    let run = &report.runs[0];
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.counts.records_read, 25);
    assert_eq!(run.counts.records_sent, 24);
    assert_eq!(run.counts.normalization_errors, 1);
    assert_eq!(run.counts.encode_errors, 0);
}

#[test]
fn delivery_failures_do_not_fail_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flights_sample.csv");
    write_flights_csv(&path, 100, None);
    let broker = MemoryBroker::new(MemoryConfig {
        failure: Some("Local: Message timed out".to_string()),
        ..MemoryConfig::default()
    });

    let report =
        Benchmark::new(flight_schema(), config(20_000), broker).run_all(&[SourceSpec::from_path(&path)]);

    let run = &report.runs[0];
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.counts.records_sent, 100);
    assert_eq!(run.delivery.delivered, 0);
    assert_eq!(run.delivery.failed, 100);
}

#[test]
fn published_count_never_exceeds_limit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flights.parquet");
    write_flights_parquet(&path, 2_500, 1_000);

    for limit in [0u64, 1, 999, 1_000, 1_001, 2_500, 10_000] {
        let report = Benchmark::new(flight_schema(), config(limit), MemoryBroker::default())
            .run_all(&[SourceSpec::from_path(&path)]);
        let sent = report.runs[0].counts.records_sent;
        assert_eq!(sent, limit.min(2_500), "limit {limit}");
    }
}

#[test]
fn small_buffer_applies_backpressure_without_loss() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flights.parquet");
    write_flights_parquet(&path, 3_000, 1_000);
    let broker = MemoryBroker::new(MemoryConfig {
        capacity: 64,
        acks_per_poll: 16,
        retain: true,
        ..MemoryConfig::default()
    });
    let schema = flight_schema();

    let report = Benchmark::new(schema.clone(), config(20_000), broker.clone())
        .run_all(&[SourceSpec::from_path(&path)]);

    let run = &report.runs[0];
    assert_eq!(run.counts.records_sent, 3_000);
    assert!(run.counts.backpressure_waits > 0);
    assert_eq!(run.delivery.delivered, 3_000);

    // submission order follows source order
    let numbers: Vec<_> = decode_all(&schema, &broker)
        .iter()
        .map(|r| r.get("Flight_Number_Operating_Airline").cloned())
        .collect();
    let expected: Vec<_> = (0..3_000i64)
        .map(|i| {
            Some(if i % 13 != 0 {
                FieldValue::Long(4000 + i)
            } else {
                FieldValue::Absent
            })
        })
        .collect();
    assert_eq!(numbers, expected);
}

#[test]
fn both_formats_converge_to_identical_records() {
    let dir = tempfile::tempdir().unwrap();
    let parquet = dir.path().join("Combined_Flights_2022.parquet");
    let csv = dir.path().join("flights_sample.csv");
    write_flights_parquet(&parquet, 1_200, 500);
    assert_eq!(
        inspect::write_csv_sample(&parquet, &csv, 1_000, 300).unwrap(),
        SampleOutcome::Written { rows: 1_000 }
    );

    let schema = flight_schema();
    let columnar = retaining_broker();
    let text = retaining_broker();
    Benchmark::new(schema.clone(), config(20_000), columnar.clone())
        .run_all(&[SourceSpec::from_path(&parquet)]);
    Benchmark::new(schema.clone(), config(20_000), text.clone())
        .run_all(&[SourceSpec::from_path(&csv)]);

    let from_parquet = decode_all(&schema, &columnar);
    let from_csv = decode_all(&schema, &text);
    assert_eq!(from_parquet.len(), 1_200);
    assert_eq!(from_csv.len(), 1_000);
    assert_eq!(from_parquet[..1_000], from_csv[..]);
    assert_eq!(
        from_csv[0].get("FlightDate"),
        Some(&FieldValue::Long(JAN_15_MICROS / 1_000))
    );
}

#[test]
fn inspect_reports_metadata_and_first_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flights.parquet");
    write_flights_parquet(&path, 25_000, 10_000);

    let summary = inspect::inspect_parquet(&path).unwrap();
    assert_eq!(summary.num_rows, 25_000);
    assert_eq!(summary.num_row_groups, 3);
    assert_eq!(summary.columns.len(), 8);
    assert_eq!(summary.columns[0], "FlightDate");
    assert_eq!(summary.preview.len(), inspect::PREVIEW_ROWS);

    let text = summary.to_string();
    assert!(text.contains("total rows:   25000"));
    assert!(text.contains("first 5 rows:"));
    assert!(text.contains("FlightDate | Airline | Origin"));
    assert!(text.contains("2022-01-16 | Delta Air Lines Inc. | HOU"));
}

#[test]
fn unused_nested_column_does_not_fail_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested.parquet");
    let leg = Field::new("Leg", DataType::Int64, true);
    let schema = Arc::new(ArrowSchema::new(vec![
        Field::new(
            "FlightDate",
            DataType::Timestamp(TimeUnit::Microsecond, None),
            false,
        ),
        Field::new("Route", DataType::Struct(Fields::from(vec![leg.clone()])), true),
    ]));
    let route = StructArray::from(vec![(
        Arc::new(leg),
        Arc::new(Int64Array::from(vec![Some(1), Some(2), None])) as ArrayRef,
    )]);
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(TimestampMicrosecondArray::from_iter_values(
                (0..3).map(|i| JAN_15_MICROS + i * DAY_MICROS),
            )),
            Arc::new(route),
        ],
    )
    .unwrap();
    let mut writer = ArrowWriter::try_new(File::create(&path).unwrap(), schema, None).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();

    let report = Benchmark::new(flight_schema(), config(20_000), MemoryBroker::default())
        .run_all(&[SourceSpec::from_path(&path)]);

    let run = &report.runs[0];
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.counts.records_sent, 3);
}

#[test]
fn sample_keeps_existing_target() {
    let dir = tempfile::tempdir().unwrap();
    let parquet = dir.path().join("flights.parquet");
    let csv: PathBuf = dir.path().join("flights_sample.csv");
    write_flights_parquet(&parquet, 10, 10);
    std::fs::write(&csv, "untouched\n").unwrap();

    assert_eq!(
        inspect::write_csv_sample(&parquet, &csv, 5, 100).unwrap(),
        SampleOutcome::Skipped
    );
    assert_eq!(std::fs::read_to_string(&csv).unwrap(), "untouched\n");
}
