//! Tagged values flowing between reader, normalizer and encoder.
use std::{fmt, sync::Arc};

/// Native resolution of a timestamp read from a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Millis,
    Micros,
    Nanos,
}

impl TimeUnit {
    /// Ticks of this unit per second.
    pub fn per_second(self) -> i64 {
        match self {
            TimeUnit::Seconds => 1,
            TimeUnit::Millis => 1_000,
            TimeUnit::Micros => 1_000_000,
            TimeUnit::Nanos => 1_000_000_000,
        }
    }

    /// Rescales `value` from `self` to `target`, truncating toward negative infinity.
    pub fn convert(self, value: i64, target: TimeUnit) -> Option<i64> {
        let (from, to) = (self.per_second(), target.per_second());
        if from >= to {
            Some(value.div_euclid(from / to))
        } else {
            value.checked_mul(to / from)
        }
    }
}

/// A single cell as produced by a source reader.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Timestamp { value: i64, unit: TimeUnit },
}

impl RawValue {
    pub fn kind(&self) -> &'static str {
        match self {
            RawValue::Null => "null",
            RawValue::Boolean(_) => "boolean",
            RawValue::Integer(_) => "integer",
            RawValue::Float(_) => "float",
            RawValue::Text(_) => "text",
            RawValue::Timestamp { .. } => "timestamp",
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Null => write!(f, "null"),
            RawValue::Boolean(b) => write!(f, "{b}"),
            RawValue::Integer(i) => write!(f, "{i}"),
            RawValue::Float(x) => write!(f, "{x}"),
            RawValue::Text(s) => write!(f, "{s:?}"),
            RawValue::Timestamp { value, unit } => write!(f, "{value} ({unit:?})"),
        }
    }
}

/// One source row: values aligned with a column list shared by the whole batch.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    columns: Arc<[String]>,
    values: Vec<RawValue>,
}

impl RawRow {
    pub fn new(columns: Arc<[String]>, values: Vec<RawValue>) -> RawRow {
        debug_assert_eq!(columns.len(), values.len());
        RawRow { columns, values }
    }

    pub fn from_pairs<I, S>(pairs: I) -> RawRow
    where
        I: IntoIterator<Item = (S, RawValue)>,
        S: Into<String>,
    {
        let (columns, values): (Vec<String>, Vec<RawValue>) =
            pairs.into_iter().map(|(k, v)| (k.into(), v)).unzip();
        RawRow {
            columns: columns.into(),
            values,
        }
    }

    pub fn get(&self, column: &str) -> Option<&RawValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[RawValue] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A schema-conformant value. `Absent` is the single null marker.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Absent,
    Boolean(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
}

impl FieldValue {
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::Absent => "absent",
            FieldValue::Boolean(_) => "boolean",
            FieldValue::Int(_) => "int",
            FieldValue::Long(_) => "long",
            FieldValue::Float(_) => "float",
            FieldValue::Double(_) => "double",
            FieldValue::String(_) => "string",
        }
    }
}

impl From<FieldValue> for RawValue {
    fn from(v: FieldValue) -> RawValue {
        match v {
            FieldValue::Absent => RawValue::Null,
            FieldValue::Boolean(b) => RawValue::Boolean(b),
            FieldValue::Int(i) => RawValue::Integer(i64::from(i)),
            FieldValue::Long(i) => RawValue::Integer(i),
            FieldValue::Float(x) => RawValue::Float(f64::from(x)),
            FieldValue::Double(x) => RawValue::Float(x),
            FieldValue::String(s) => RawValue::Text(s),
        }
    }
}

/// Field values in schema order; every schema field has an entry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NormalizedRecord {
    fields: Vec<(String, FieldValue)>,
}

impl NormalizedRecord {
    pub fn with_capacity(n: usize) -> NormalizedRecord {
        NormalizedRecord {
            fields: Vec::with_capacity(n),
        }
    }

    pub fn push(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn fields(&self) -> &[(String, FieldValue)] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Views the record as a raw row, e.g. to feed it back through normalization.
    pub fn into_raw(self) -> RawRow {
        RawRow::from_pairs(self.fields.into_iter().map(|(k, v)| (k, RawValue::from(v))))
    }
}

impl FromIterator<(String, FieldValue)> for NormalizedRecord {
    fn from_iter<T: IntoIterator<Item = (String, FieldValue)>>(iter: T) -> Self {
        NormalizedRecord {
            fields: iter.into_iter().collect(),
        }
    }
}
