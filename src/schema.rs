//! Record schema, loaded once from an Avro `.avsc` file.
//!
//! Only flat records are accepted: each field is a primitive (optionally with a
//! `date`/`timestamp-*` logical type) or a two-branch union with `"null"`.
use std::{fs, path::Path};

use serde_json::Value as Json;

use crate::error::{SchemaLoadError, SourceReadError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Boolean,
    Int,
    Long,
    Float,
    Double,
    String,
    /// `int` with logical type `date`, days since epoch
    Date,
    TimestampMillis,
    TimestampMicros,
}

impl FieldType {
    pub fn name(self) -> &'static str {
        match self {
            FieldType::Boolean => "boolean",
            FieldType::Int => "int",
            FieldType::Long => "long",
            FieldType::Float => "float",
            FieldType::Double => "double",
            FieldType::String => "string",
            FieldType::Date => "date",
            FieldType::TimestampMillis => "timestamp-millis",
            FieldType::TimestampMicros => "timestamp-micros",
        }
    }

    fn primitive(name: &str) -> Option<FieldType> {
        Some(match name {
            "boolean" => FieldType::Boolean,
            "int" => FieldType::Int,
            "long" => FieldType::Long,
            "float" => FieldType::Float,
            "double" => FieldType::Double,
            "string" => FieldType::String,
            _ => return None,
        })
    }
}

/// Branch positions of a `["null", T]` union.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NullableUnion {
    pub null_index: u32,
    pub value_index: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    pub nullable: Option<NullableUnion>,
}

impl Field {
    pub fn is_nullable(&self) -> bool {
        self.nullable.is_some()
    }
}

/// Immutable after load; share it behind an `Arc`.
#[derive(Debug)]
pub struct Schema {
    name: String,
    fields: Vec<Field>,
    avro: apache_avro::Schema,
}

impl Schema {
    pub fn load(path: impl AsRef<Path>) -> Result<Schema, SchemaLoadError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| SchemaLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Schema::parse_str(&text)
    }

    pub fn parse_str(text: &str) -> Result<Schema, SchemaLoadError> {
        let json: Json =
            serde_json::from_str(text).map_err(|e| SchemaLoadError::Malformed(e.to_string()))?;
        let (name, fields) = parse_record(&json)?;
        let avro = apache_avro::Schema::parse(&json)?;
        Ok(Schema { name, fields, avro })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn avro(&self) -> &apache_avro::Schema {
        &self.avro
    }

    /// Fails when a non-nullable field has no matching source column.
    pub fn check_columns(&self, columns: &[String]) -> Result<(), SourceReadError> {
        match self
            .fields
            .iter()
            .find(|f| !f.is_nullable() && !columns.iter().any(|c| c == &f.name))
        {
            Some(f) => Err(SourceReadError::SchemaMismatch(f.name.clone())),
            None => Ok(()),
        }
    }
}

fn parse_record(json: &Json) -> Result<(String, Vec<Field>), SchemaLoadError> {
    let obj = json
        .as_object()
        .ok_or_else(|| SchemaLoadError::NotARecord(json.to_string()))?;
    match obj.get("type").and_then(Json::as_str) {
        Some("record") => {}
        other => {
            return Err(SchemaLoadError::NotARecord(
                other.unwrap_or("<missing type>").to_string(),
            ))
        }
    }
    let name = obj
        .get("name")
        .and_then(Json::as_str)
        .ok_or_else(|| SchemaLoadError::Malformed("record has no name".to_string()))?
        .to_string();
    let raw_fields = obj
        .get("fields")
        .and_then(Json::as_array)
        .ok_or_else(|| SchemaLoadError::Malformed("record has no fields array".to_string()))?;

    let mut fields = Vec::with_capacity(raw_fields.len());
    for raw in raw_fields {
        let field_name = raw
            .get("name")
            .and_then(Json::as_str)
            .ok_or_else(|| SchemaLoadError::Malformed(format!("field without name: {raw}")))?;
        let ty = raw
            .get("type")
            .ok_or_else(|| SchemaLoadError::Malformed(format!("field '{field_name}' has no type")))?;
        let (field_type, nullable) = parse_field_type(field_name, ty)?;
        fields.push(Field {
            name: field_name.to_string(),
            field_type,
            nullable,
        });
    }
    Ok((name, fields))
}

fn parse_field_type(
    field: &str,
    ty: &Json,
) -> Result<(FieldType, Option<NullableUnion>), SchemaLoadError> {
    let unsupported = || SchemaLoadError::UnsupportedType {
        field: field.to_string(),
        found: ty.to_string(),
    };
    match ty {
        Json::Array(branches) => {
            let null_index = branches.iter().position(|b| b == "null");
            match (branches.len(), null_index) {
                (2, Some(null_index)) => {
                    let value_index = 1 - null_index;
                    let inner = parse_plain_type(field, &branches[value_index])?;
                    Ok((
                        inner,
                        Some(NullableUnion {
                            null_index: null_index as u32,
                            value_index: value_index as u32,
                        }),
                    ))
                }
                _ => Err(unsupported()),
            }
        }
        other => Ok((parse_plain_type(field, other)?, None)),
    }
}

fn parse_plain_type(field: &str, ty: &Json) -> Result<FieldType, SchemaLoadError> {
    let unsupported = || SchemaLoadError::UnsupportedType {
        field: field.to_string(),
        found: ty.to_string(),
    };
    match ty {
        Json::String(name) => FieldType::primitive(name).ok_or_else(unsupported),
        Json::Object(obj) => {
            let base = obj.get("type").and_then(Json::as_str).ok_or_else(unsupported)?;
            match (base, obj.get("logicalType").and_then(Json::as_str)) {
                ("long", Some("timestamp-millis")) => Ok(FieldType::TimestampMillis),
                ("long", Some("timestamp-micros")) => Ok(FieldType::TimestampMicros),
                ("int", Some("date")) => Ok(FieldType::Date),
                // unknown logical types fall back to their underlying type
                (base, _) => FieldType::primitive(base).ok_or_else(unsupported),
            }
        }
        _ => Err(unsupported()),
    }
}
