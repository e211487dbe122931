//! Deterministic wire serialization of the schema model.
//!
//! The serialized form is a canonical map, so two identical databases
//! always serialize to identical bytes. The layout is versioned with a
//! single format tag; the type tags travel as their exact strings.

use crate::error::{SchemaError, SchemaResult};
use crate::model::{Column, ColumnType, Database, Key, Table};
use driftsync_codec::PackedValue;

/// Current schema serialization format version.
pub const SCHEMA_FORMAT_VERSION: i64 = 1;

fn field<'a>(map: &'a PackedValue, name: &str) -> SchemaResult<&'a PackedValue> {
    map.get(name)
        .ok_or_else(|| SchemaError::malformed(format!("missing field {name}")))
}

fn text_field(map: &PackedValue, name: &str) -> SchemaResult<String> {
    field(map, name)?
        .as_text()
        .map(str::to_string)
        .ok_or_else(|| SchemaError::malformed(format!("field {name} should be a string")))
}

fn uint_field(map: &PackedValue, name: &str) -> SchemaResult<u64> {
    field(map, name)?
        .as_uint()
        .ok_or_else(|| SchemaError::malformed(format!("field {name} should be an integer")))
}

fn bool_field(map: &PackedValue, name: &str) -> SchemaResult<bool> {
    field(map, name)?
        .as_bool()
        .ok_or_else(|| SchemaError::malformed(format!("field {name} should be a boolean")))
}

fn indices_field(map: &PackedValue, name: &str) -> SchemaResult<Vec<usize>> {
    field(map, name)?
        .as_array()
        .ok_or_else(|| SchemaError::malformed(format!("field {name} should be an array")))?
        .iter()
        .map(|v| {
            v.as_uint()
                .map(|n| n as usize)
                .ok_or_else(|| SchemaError::malformed(format!("{name} entries should be integers")))
        })
        .collect()
}

impl Database {
    /// Serialize to the wire form.
    pub fn to_packed(&self) -> PackedValue {
        PackedValue::map(vec![
            (
                PackedValue::from("version"),
                PackedValue::Int(SCHEMA_FORMAT_VERSION),
            ),
            (
                PackedValue::from("tables"),
                PackedValue::Array(self.tables.iter().map(Table::to_packed).collect()),
            ),
        ])
    }

    /// Deserialize from the wire form, validating structure and indices.
    pub fn from_packed(value: &PackedValue) -> SchemaResult<Self> {
        let version = field(value, "version")?
            .as_int()
            .ok_or_else(|| SchemaError::malformed("version should be an integer"))?;
        if version != SCHEMA_FORMAT_VERSION {
            return Err(SchemaError::UnsupportedVersion { version });
        }

        let tables = field(value, "tables")?
            .as_array()
            .ok_or_else(|| SchemaError::malformed("tables should be an array"))?
            .iter()
            .map(Table::from_packed)
            .collect::<SchemaResult<Vec<_>>>()?;

        Ok(Database { tables })
    }
}

impl Table {
    fn to_packed(&self) -> PackedValue {
        PackedValue::map(vec![
            (PackedValue::from("name"), PackedValue::from(self.name.as_str())),
            (
                PackedValue::from("columns"),
                PackedValue::Array(self.columns.iter().map(Column::to_packed).collect()),
            ),
            (
                PackedValue::from("primary_key"),
                PackedValue::Array(
                    self.primary_key_columns
                        .iter()
                        .map(|&i| PackedValue::Int(i as i64))
                        .collect(),
                ),
            ),
            (
                PackedValue::from("keys"),
                PackedValue::Array(self.keys.iter().map(Key::to_packed).collect()),
            ),
        ])
    }

    fn from_packed(value: &PackedValue) -> SchemaResult<Self> {
        let table = Table {
            name: text_field(value, "name")?,
            columns: field(value, "columns")?
                .as_array()
                .ok_or_else(|| SchemaError::malformed("columns should be an array"))?
                .iter()
                .map(Column::from_packed)
                .collect::<SchemaResult<Vec<_>>>()?,
            primary_key_columns: indices_field(value, "primary_key")?,
            keys: field(value, "keys")?
                .as_array()
                .ok_or_else(|| SchemaError::malformed("keys should be an array"))?
                .iter()
                .map(Key::from_packed)
                .collect::<SchemaResult<Vec<_>>>()?,
            where_conditions: None,
        };
        table.validate()?;
        Ok(table)
    }
}

impl Column {
    fn to_packed(&self) -> PackedValue {
        let mut pairs = vec![
            (PackedValue::from("name"), PackedValue::from(self.name.as_str())),
            (
                PackedValue::from("type"),
                PackedValue::from(self.column_type.tag()),
            ),
            (PackedValue::from("size"), PackedValue::Int(i64::from(self.size))),
            (
                PackedValue::from("scale"),
                PackedValue::Int(i64::from(self.scale)),
            ),
            (
                PackedValue::from("nullable"),
                PackedValue::Bool(self.nullable),
            ),
        ];
        if let Some(ref default_value) = self.default_value {
            pairs.push((
                PackedValue::from("default"),
                PackedValue::from(default_value.as_str()),
            ));
        }
        PackedValue::map(pairs)
    }

    fn from_packed(value: &PackedValue) -> SchemaResult<Self> {
        let default_value = match value.get("default") {
            Some(v) => Some(
                v.as_text()
                    .map(str::to_string)
                    .ok_or_else(|| SchemaError::malformed("default should be a string"))?,
            ),
            None => None,
        };

        Ok(Column {
            name: text_field(value, "name")?,
            column_type: ColumnType::from_tag(&text_field(value, "type")?)?,
            size: uint_field(value, "size")? as u32,
            scale: uint_field(value, "scale")? as u32,
            nullable: bool_field(value, "nullable")?,
            default_value,
            filter_expression: None,
        })
    }
}

impl Key {
    fn to_packed(&self) -> PackedValue {
        PackedValue::map(vec![
            (PackedValue::from("name"), PackedValue::from(self.name.as_str())),
            (PackedValue::from("unique"), PackedValue::Bool(self.unique)),
            (
                PackedValue::from("columns"),
                PackedValue::Array(
                    self.columns
                        .iter()
                        .map(|&i| PackedValue::Int(i as i64))
                        .collect(),
                ),
            ),
        ])
    }

    fn from_packed(value: &PackedValue) -> SchemaResult<Self> {
        Ok(Key {
            name: text_field(value, "name")?,
            unique: bool_field(value, "unique")?,
            columns: indices_field(value, "columns")?,
        })
    }
}
