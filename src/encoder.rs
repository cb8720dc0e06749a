//! Avro binary encoding of normalized records.
//!
//! Payloads are schemaless Avro datums: no container header, no registry
//! framing. A consumer needs the same `.avsc` to read them.
use std::sync::Arc;

use apache_avro::{from_avro_datum, to_avro_datum, types::Value};

use crate::{
    error::EncodeError,
    schema::{Field, FieldType, Schema},
    value::{FieldValue, NormalizedRecord},
};

/// Stateless apart from the shared schema, so one instance may serve many threads.
#[derive(Debug, Clone)]
pub struct AvroEncoder {
    schema: Arc<Schema>,
}

impl AvroEncoder {
    pub fn new(schema: Arc<Schema>) -> AvroEncoder {
        AvroEncoder { schema }
    }

    pub fn encode(&self, record: &NormalizedRecord) -> Result<Vec<u8>, EncodeError> {
        let mut fields = Vec::with_capacity(self.schema.fields().len());
        for field in self.schema.fields() {
            let value = record
                .get(&field.name)
                .ok_or_else(|| EncodeError::MissingField(field.name.clone()))?;
            fields.push((field.name.clone(), to_avro(field, value)?));
        }
        Ok(to_avro_datum(self.schema.avro(), Value::Record(fields))?)
    }

    /// Reads a payload produced by [`AvroEncoder::encode`] back into a record.
    pub fn decode(&self, payload: &[u8]) -> Result<NormalizedRecord, EncodeError> {
        let mut reader = payload;
        match from_avro_datum(self.schema.avro(), &mut reader, None)? {
            Value::Record(fields) => fields
                .into_iter()
                .map(|(name, v)| from_avro(&name, v).map(|value| (name, value)))
                .collect(),
            _ => Err(EncodeError::NotARecord),
        }
    }
}

fn to_avro(field: &Field, value: &FieldValue) -> Result<Value, EncodeError> {
    let mismatch = || EncodeError::TypeMismatch {
        field: field.name.clone(),
        expected: field.field_type.name(),
        found: value.kind(),
    };
    let inner = match (field.field_type, value) {
        (_, FieldValue::Absent) => {
            return match field.nullable {
                Some(u) => Ok(Value::Union(u.null_index, Box::new(Value::Null))),
                None => Err(EncodeError::NullNotAllowed(field.name.clone())),
            }
        }
        (FieldType::Boolean, FieldValue::Boolean(b)) => Value::Boolean(*b),
        (FieldType::Int, FieldValue::Int(i)) => Value::Int(*i),
        (FieldType::Long, FieldValue::Int(i)) => Value::Long(i64::from(*i)),
        (FieldType::Long, FieldValue::Long(i)) => Value::Long(*i),
        (FieldType::Float, FieldValue::Float(x)) => Value::Float(*x),
        (FieldType::Double, FieldValue::Float(x)) => Value::Double(f64::from(*x)),
        (FieldType::Double, FieldValue::Double(x)) => Value::Double(*x),
        (FieldType::String, FieldValue::String(s)) => Value::String(s.clone()),
        (FieldType::Date, FieldValue::Int(d)) => Value::Date(*d),
        (FieldType::TimestampMillis, FieldValue::Long(t)) => Value::TimestampMillis(*t),
        (FieldType::TimestampMicros, FieldValue::Long(t)) => Value::TimestampMicros(*t),
        _ => return Err(mismatch()),
    };
    Ok(match field.nullable {
        Some(u) => Value::Union(u.value_index, Box::new(inner)),
        None => inner,
    })
}

fn from_avro(field: &str, v: Value) -> Result<FieldValue, EncodeError> {
    Ok(match v {
        Value::Null => FieldValue::Absent,
        Value::Union(_, inner) => return from_avro(field, *inner),
        Value::Boolean(b) => FieldValue::Boolean(b),
        Value::Int(i) | Value::Date(i) => FieldValue::Int(i),
        Value::Long(i) | Value::TimestampMillis(i) | Value::TimestampMicros(i) => {
            FieldValue::Long(i)
        }
        Value::Float(x) => FieldValue::Float(x),
        Value::Double(x) => FieldValue::Double(x),
        Value::String(s) => FieldValue::String(s),
        _ => {
            return Err(EncodeError::TypeMismatch {
                field: field.to_string(),
                expected: "flat primitive",
                found: "nested value",
            })
        }
    })
}
