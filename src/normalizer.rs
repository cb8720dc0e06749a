//! Per-row coercion of raw source values into schema-conformant records.
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::{
    error::NormalizationError,
    schema::{FieldType, Schema},
    value::{FieldValue, NormalizedRecord, RawRow, RawValue, TimeUnit},
};

/// Text cells treated as missing, matching the pandas `read_csv` defaults.
pub const NA_MARKERS: &[&str] = &[
    "", "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "-nan", "null", "NULL", "None", "#N/A", "<NA>",
    "NaT",
];

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Target {
    Plain(FieldType),
    /// epoch offset in the given unit, encoded as `long`
    Epoch(TimeUnit),
    /// days since epoch, encoded as `int`
    Days,
}

#[derive(Debug)]
struct Slot {
    name: String,
    target: Target,
}

/// Maps [`RawRow`]s onto the field list of a [`Schema`].
///
/// Besides schema-declared `date`/`timestamp-*` fields, any `long` field
/// listed in `timestamp_fields` is treated as a millisecond epoch timestamp.
///
/// Text cells matching [`NA_MARKERS`] count as missing unless disabled with
/// [`Normalizer::with_text_markers`]; typed sources carry real nulls and keep
/// strings like `"NA"` or `""` as values.
#[derive(Debug)]
pub struct Normalizer {
    slots: Vec<Slot>,
    text_markers: bool,
}

impl Normalizer {
    pub fn new(schema: Arc<Schema>, timestamp_fields: &[String]) -> Normalizer {
        let slots = schema
            .fields()
            .iter()
            .map(|f| {
                let designated = timestamp_fields.iter().any(|t| t == &f.name);
                let target = match f.field_type {
                    FieldType::TimestampMillis => Target::Epoch(TimeUnit::Millis),
                    FieldType::TimestampMicros => Target::Epoch(TimeUnit::Micros),
                    FieldType::Date => Target::Days,
                    FieldType::Long if designated => Target::Epoch(TimeUnit::Millis),
                    other => Target::Plain(other),
                };
                Slot {
                    name: f.name.clone(),
                    target,
                }
            })
            .collect();
        Normalizer {
            slots,
            text_markers: true,
        }
    }

    pub fn with_text_markers(mut self, enabled: bool) -> Normalizer {
        self.text_markers = enabled;
        self
    }

    pub fn normalize(&self, row: &RawRow) -> Result<NormalizedRecord, NormalizationError> {
        let mut record = NormalizedRecord::with_capacity(self.slots.len());
        for slot in &self.slots {
            let value = match row.get(&slot.name) {
                Some(raw) if !is_null_equivalent(raw, self.text_markers) => {
                    coerce(&slot.name, slot.target, raw)?
                }
                _ => FieldValue::Absent,
            };
            record.push(slot.name.as_str(), value);
        }
        Ok(record)
    }
}

pub fn is_null_equivalent(v: &RawValue, text_markers: bool) -> bool {
    match v {
        RawValue::Null => true,
        RawValue::Float(x) => x.is_nan(),
        RawValue::Text(s) => text_markers && NA_MARKERS.contains(&s.as_str()),
        _ => false,
    }
}

fn coerce(field: &str, target: Target, raw: &RawValue) -> Result<FieldValue, NormalizationError> {
    let ctx = Ctx { field, target, raw };
    match target {
        Target::Plain(FieldType::Boolean) => ctx.to_bool().map(FieldValue::Boolean),
        Target::Plain(FieldType::Int) => {
            let v = ctx.to_i64()?;
            i32::try_from(v)
                .map(FieldValue::Int)
                .map_err(|_| ctx.out_of_range())
        }
        Target::Plain(FieldType::Long) => ctx.to_i64().map(FieldValue::Long),
        Target::Plain(FieldType::Float) => ctx.to_f64().map(|x| FieldValue::Float(x as f32)),
        Target::Plain(FieldType::Double) => ctx.to_f64().map(FieldValue::Double),
        Target::Plain(FieldType::String) => Ok(FieldValue::String(ctx.to_text())),
        Target::Plain(FieldType::TimestampMillis) => ctx.to_epoch(TimeUnit::Millis).map(FieldValue::Long),
        Target::Plain(FieldType::TimestampMicros) => ctx.to_epoch(TimeUnit::Micros).map(FieldValue::Long),
        Target::Epoch(unit) => ctx.to_epoch(unit).map(FieldValue::Long),
        Target::Plain(FieldType::Date) | Target::Days => {
            let days = ctx.to_days()?;
            i32::try_from(days)
                .map(FieldValue::Int)
                .map_err(|_| ctx.out_of_range())
        }
    }
}

struct Ctx<'a> {
    field: &'a str,
    target: Target,
    raw: &'a RawValue,
}

impl Ctx<'_> {
    fn expected(&self) -> &'static str {
        match self.target {
            Target::Plain(t) => t.name(),
            Target::Epoch(TimeUnit::Micros) => "timestamp-micros",
            Target::Epoch(_) => "timestamp-millis",
            Target::Days => "date",
        }
    }

    fn incompatible(&self) -> NormalizationError {
        NormalizationError::Incompatible {
            field: self.field.to_string(),
            expected: self.expected(),
            value: self.raw.to_string(),
        }
    }

    fn out_of_range(&self) -> NormalizationError {
        NormalizationError::OutOfRange {
            field: self.field.to_string(),
            expected: self.expected(),
            value: self.raw.to_string(),
        }
    }

    fn to_bool(&self) -> Result<bool, NormalizationError> {
        match self.raw {
            RawValue::Boolean(b) => Ok(*b),
            RawValue::Integer(0) => Ok(false),
            RawValue::Integer(1) => Ok(true),
            RawValue::Float(x) if *x == 0.0 => Ok(false),
            RawValue::Float(x) if *x == 1.0 => Ok(true),
            RawValue::Text(s) => match s.trim() {
                "true" | "True" | "TRUE" | "1" | "1.0" => Ok(true),
                "false" | "False" | "FALSE" | "0" | "0.0" => Ok(false),
                _ => Err(self.incompatible()),
            },
            _ => Err(self.incompatible()),
        }
    }

    fn to_i64(&self) -> Result<i64, NormalizationError> {
        match self.raw {
            RawValue::Integer(i) => Ok(*i),
            RawValue::Boolean(b) => Ok(i64::from(*b)),
            RawValue::Float(x) => self.integral(*x),
            RawValue::Text(s) => {
                let s = s.trim();
                match s.parse::<i64>() {
                    Ok(i) => Ok(i),
                    Err(_) => self.integral(s.parse::<f64>().map_err(|_| self.incompatible())?),
                }
            }
            RawValue::Timestamp { .. } | RawValue::Null => Err(self.incompatible()),
        }
    }

    /// Accepts floats with no fractional part, as written for nullable integer columns.
    fn integral(&self, x: f64) -> Result<i64, NormalizationError> {
        if x.fract() != 0.0 || !x.is_finite() {
            return Err(self.incompatible());
        }
        if x < i64::MIN as f64 || x >= i64::MAX as f64 {
            return Err(self.out_of_range());
        }
        Ok(x as i64)
    }

    fn to_f64(&self) -> Result<f64, NormalizationError> {
        match self.raw {
            RawValue::Float(x) => Ok(*x),
            RawValue::Integer(i) => Ok(*i as f64),
            RawValue::Text(s) => s.trim().parse::<f64>().map_err(|_| self.incompatible()),
            _ => Err(self.incompatible()),
        }
    }

    fn to_text(&self) -> String {
        match self.raw {
            RawValue::Text(s) => s.clone(),
            RawValue::Timestamp { value, unit } => unit
                .convert(*value, TimeUnit::Micros)
                .and_then(DateTime::from_timestamp_micros)
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_else(|| self.raw.to_string()),
            other => other.to_string(),
        }
    }

    fn to_epoch(&self, unit: TimeUnit) -> Result<i64, NormalizationError> {
        match self.raw {
            RawValue::Timestamp { value, unit: native } => {
                native.convert(*value, unit).ok_or_else(|| self.out_of_range())
            }
            // plain numbers are already in the canonical unit
            RawValue::Integer(i) => Ok(*i),
            RawValue::Float(x) => self.integral(*x),
            RawValue::Text(s) => {
                let s = s.trim();
                if let Ok(i) = s.parse::<i64>() {
                    return Ok(i);
                }
                let nanos = parse_text_timestamp(s).ok_or_else(|| NormalizationError::Timestamp {
                    field: self.field.to_string(),
                    value: s.to_string(),
                })?;
                TimeUnit::Nanos
                    .convert(nanos, unit)
                    .ok_or_else(|| self.out_of_range())
            }
            RawValue::Boolean(_) | RawValue::Null => Err(self.incompatible()),
        }
    }

    fn to_days(&self) -> Result<i64, NormalizationError> {
        match self.raw {
            RawValue::Timestamp { value, unit } => unit
                .convert(*value, TimeUnit::Seconds)
                .map(|secs| secs.div_euclid(SECONDS_PER_DAY))
                .ok_or_else(|| self.out_of_range()),
            RawValue::Text(s) if s.trim().parse::<i64>().is_err() => {
                let nanos = parse_text_timestamp(s.trim()).ok_or_else(|| {
                    NormalizationError::Timestamp {
                        field: self.field.to_string(),
                        value: s.clone(),
                    }
                })?;
                Ok(nanos.div_euclid(SECONDS_PER_DAY * 1_000_000_000))
            }
            _ => self.to_i64(),
        }
    }
}

/// Parses a text date or date-time as UTC, returning nanoseconds since epoch.
pub fn parse_text_timestamp(s: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.timestamp_nanos_opt();
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return dt.and_utc().timestamp_nanos_opt();
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()?
        .and_hms_opt(0, 0, 0)?
        .and_utc()
        .timestamp_nanos_opt()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"
    {
        "type": "record",
        "name": "Flight",
        "fields": [
            {"name": "FlightDate", "type": "long"},
            {"name": "Airline", "type": ["null", "string"]},
            {"name": "Distance", "type": ["null", "int"]},
            {"name": "DepDelay", "type": ["null", "double"]},
            {"name": "Cancelled", "type": "boolean"},
            {"name": "Arrival", "type": ["null", {"type": "long", "logicalType": "timestamp-micros"}]},
            {"name": "Day", "type": ["null", {"type": "int", "logicalType": "date"}]}
        ]
    }"#;

    // 2022-01-15T00:00:00Z
    const JAN_15_MS: i64 = 1_642_204_800_000;

    fn normalizer() -> Normalizer {
        let schema = Arc::new(Schema::parse_str(SCHEMA).unwrap());
        Normalizer::new(schema, &["FlightDate".to_string()])
    }

    fn text(s: &str) -> RawValue {
        RawValue::Text(s.to_string())
    }

    #[test]
    fn unifies_null_equivalents() {
        let n = normalizer();
        let row = RawRow::from_pairs([
            ("FlightDate", RawValue::Integer(JAN_15_MS)),
            ("Airline", text("")),
            ("DepDelay", RawValue::Float(f64::NAN)),
            ("Distance", text("NaN")),
            ("Cancelled", RawValue::Boolean(false)),
            ("Arrival", RawValue::Null),
        ]);
        let rec = n.normalize(&row).unwrap();
        assert_eq!(rec.len(), 7);
        assert_eq!(rec.get("Airline"), Some(&FieldValue::Absent));
        assert_eq!(rec.get("DepDelay"), Some(&FieldValue::Absent));
        assert_eq!(rec.get("Distance"), Some(&FieldValue::Absent));
        assert_eq!(rec.get("Arrival"), Some(&FieldValue::Absent));
        // missing column
        assert_eq!(rec.get("Day"), Some(&FieldValue::Absent));
    }

    #[test]
    fn typed_sources_keep_marker_strings() {
        let schema = Arc::new(Schema::parse_str(SCHEMA).unwrap());
        let n = Normalizer::new(schema, &["FlightDate".to_string()]).with_text_markers(false);
        let row = RawRow::from_pairs([
            ("FlightDate", RawValue::Integer(JAN_15_MS)),
            ("Airline", text("NA")),
            ("DepDelay", RawValue::Float(f64::NAN)),
            ("Cancelled", RawValue::Boolean(false)),
            ("Arrival", RawValue::Null),
        ]);
        let rec = n.normalize(&row).unwrap();
        assert_eq!(rec.get("Airline"), Some(&FieldValue::String("NA".to_string())));
        assert_eq!(rec.get("DepDelay"), Some(&FieldValue::Absent));
        assert_eq!(rec.get("Arrival"), Some(&FieldValue::Absent));

        let empty = RawRow::from_pairs([
            ("FlightDate", RawValue::Integer(JAN_15_MS)),
            ("Airline", text("")),
            ("Cancelled", RawValue::Boolean(true)),
        ]);
        assert_eq!(
            n.normalize(&empty).unwrap().get("Airline"),
            Some(&FieldValue::String(String::new()))
        );
    }

    #[test]
    fn timestamp_sources_converge() {
        let n = normalizer();
        let columnar = RawRow::from_pairs([
            (
                "FlightDate",
                RawValue::Timestamp {
                    value: JAN_15_MS * 1_000,
                    unit: TimeUnit::Micros,
                },
            ),
            ("Cancelled", RawValue::Boolean(false)),
        ]);
        let delimited = RawRow::from_pairs([
            ("FlightDate", text("2022-01-15")),
            ("Cancelled", text("False")),
        ]);
        let a = n.normalize(&columnar).unwrap();
        let b = n.normalize(&delimited).unwrap();
        assert_eq!(a.get("FlightDate"), Some(&FieldValue::Long(JAN_15_MS)));
        assert_eq!(a, b);
    }

    #[test]
    fn parses_text_timestamp_formats() {
        let midnight = JAN_15_MS * 1_000_000;
        assert_eq!(parse_text_timestamp("2022-01-15"), Some(midnight));
        assert_eq!(parse_text_timestamp("2022-01-15 00:00:00"), Some(midnight));
        assert_eq!(parse_text_timestamp("2022-01-15T00:00:01"), Some(midnight + 1_000_000_000));
        assert_eq!(parse_text_timestamp("2022-01-15T00:00:00.5Z"), Some(midnight + 500_000_000));
        assert_eq!(parse_text_timestamp("2022-01-15T01:00:00+01:00"), Some(midnight));
        assert_eq!(parse_text_timestamp("15/01/2022"), None);
    }

    #[test]
    fn coerces_text_to_declared_types() {
        let n = normalizer();
        let row = RawRow::from_pairs([
            ("FlightDate", text("2022-01-15 06:30:00")),
            ("Airline", text("Endeavor Air Inc.")),
            ("Distance", text("1048.0")),
            ("DepDelay", text("-3")),
            ("Cancelled", text("True")),
            ("Arrival", text("2022-01-15T08:00:00")),
            ("Day", text("2022-01-15")),
        ]);
        let rec = n.normalize(&row).unwrap();
        assert_eq!(
            rec.get("FlightDate"),
            Some(&FieldValue::Long(JAN_15_MS + 6 * 3_600_000 + 30 * 60_000))
        );
        assert_eq!(
            rec.get("Airline"),
            Some(&FieldValue::String("Endeavor Air Inc.".to_string()))
        );
        assert_eq!(rec.get("Distance"), Some(&FieldValue::Int(1048)));
        assert_eq!(rec.get("DepDelay"), Some(&FieldValue::Double(-3.0)));
        assert_eq!(rec.get("Cancelled"), Some(&FieldValue::Boolean(true)));
        assert_eq!(
            rec.get("Arrival"),
            Some(&FieldValue::Long((JAN_15_MS + 8 * 3_600_000) * 1_000))
        );
        assert_eq!(rec.get("Day"), Some(&FieldValue::Int(19_007)));
    }

    #[test]
    fn rejects_non_numeric_in_numeric_field() {
        let n = normalizer();
        let row = RawRow::from_pairs([
            ("FlightDate", text("2022-01-15")),
            ("Distance", text("far")),
            ("Cancelled", text("False")),
        ]);
        let err = n.normalize(&row).unwrap_err();
        assert!(matches!(err, NormalizationError::Incompatible { ref field, .. } if field == "Distance"));

        let row = RawRow::from_pairs([
            ("FlightDate", text("2022-01-15")),
            ("Distance", text("12.5")),
            ("Cancelled", text("False")),
        ]);
        assert!(n.normalize(&row).is_err());

        let row = RawRow::from_pairs([
            ("FlightDate", text("2022-01-15")),
            ("Distance", RawValue::Integer(i64::from(i32::MAX) + 1)),
            ("Cancelled", text("False")),
        ]);
        assert!(matches!(
            n.normalize(&row),
            Err(NormalizationError::OutOfRange { .. })
        ));

        let row = RawRow::from_pairs([("FlightDate", text("someday")), ("Cancelled", text("False"))]);
        assert!(matches!(
            n.normalize(&row),
            Err(NormalizationError::Timestamp { .. })
        ));
    }

    #[test]
    fn normalization_is_idempotent() {
        let n = normalizer();
        let row = RawRow::from_pairs([
            (
                "FlightDate",
                RawValue::Timestamp {
                    value: JAN_15_MS * 1_000,
                    unit: TimeUnit::Micros,
                },
            ),
            ("Airline", text("NA")),
            ("Distance", RawValue::Float(300.0)),
            ("DepDelay", RawValue::Float(12.25)),
            ("Cancelled", RawValue::Boolean(true)),
            (
                "Arrival",
                RawValue::Timestamp {
                    value: 5,
                    unit: TimeUnit::Seconds,
                },
            ),
            ("Day", text("2022-01-15")),
        ]);
        let once = n.normalize(&row).unwrap();
        let twice = n.normalize(&once.clone().into_raw()).unwrap();
        assert_eq!(once, twice);
    }
}
