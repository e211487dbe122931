//! Schema entities: columns, keys, tables, databases.

use crate::error::{SchemaError, SchemaResult};
use driftsync_codec::PackedValue;
use std::cmp::Ordering;

/// Column indices into a table's column list, in key order.
pub type ColumnIndices = Vec<usize>;

/// An ordered tuple of wire values, interpreted positionally against a
/// key's column list. An empty tuple means "unbounded" when used as a
/// range endpoint.
pub type ColumnValues = Vec<PackedValue>;

/// A row: one value per column, in column-declaration order.
pub type Row = Vec<PackedValue>;

/// The portable column type tags.
///
/// Native database types map onto this set during introspection; the tag
/// strings are what travels in the serialized schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Binary data.
    Blob,
    /// Unbounded text.
    Text,
    /// Bounded variable-length text; `size` is the bound.
    Varchar,
    /// Fixed-length text; `size` is the length.
    FixedChar,
    /// Boolean.
    Bool,
    /// Signed integer; `size` is the width in bytes.
    SignedInt,
    /// Unsigned integer; `size` is the width in bytes.
    UnsignedInt,
    /// Floating point; `size` is the width in bytes.
    Real,
    /// Fixed-point decimal; `size` is the precision, `scale` the scale.
    Decimal,
    /// Calendar date.
    Date,
    /// Time of day.
    Time,
    /// Date and time.
    DateTime,
}

impl ColumnType {
    /// The exact tag string transmitted in serialized schemas.
    pub fn tag(&self) -> &'static str {
        match self {
            ColumnType::Blob => "BLOB",
            ColumnType::Text => "TEXT",
            ColumnType::Varchar => "VCHR",
            ColumnType::FixedChar => "FCHR",
            ColumnType::Bool => "BOOL",
            ColumnType::SignedInt => "SINT",
            ColumnType::UnsignedInt => "UINT",
            ColumnType::Real => "REAL",
            ColumnType::Decimal => "DECI",
            ColumnType::Date => "DATE",
            ColumnType::Time => "TIME",
            ColumnType::DateTime => "DTTM",
        }
    }

    /// Parse a tag string back to a column type.
    pub fn from_tag(tag: &str) -> SchemaResult<Self> {
        Ok(match tag {
            "BLOB" => ColumnType::Blob,
            "TEXT" => ColumnType::Text,
            "VCHR" => ColumnType::Varchar,
            "FCHR" => ColumnType::FixedChar,
            "BOOL" => ColumnType::Bool,
            "SINT" => ColumnType::SignedInt,
            "UINT" => ColumnType::UnsignedInt,
            "REAL" => ColumnType::Real,
            "DECI" => ColumnType::Decimal,
            "DATE" => ColumnType::Date,
            "TIME" => ColumnType::Time,
            "DTTM" => ColumnType::DateTime,
            other => return Err(SchemaError::unknown_type_tag(other)),
        })
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// A table column.
#[derive(Debug, Clone)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Portable type tag.
    pub column_type: ColumnType,
    /// Size attribute; meaning depends on the type.
    pub size: u32,
    /// Scale attribute; meaningful only for `Decimal`.
    pub scale: u32,
    /// Whether the column accepts NULL.
    pub nullable: bool,
    /// Declared default value, if any, in the database's text form.
    pub default_value: Option<String>,
    /// Optional expression selected in place of the raw column at both
    /// ends. Not serialized and not part of equality.
    pub filter_expression: Option<String>,
}

impl Column {
    /// Create a column with no size/scale attributes and no default.
    pub fn new(name: impl Into<String>, column_type: ColumnType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            column_type,
            size: 0,
            scale: 0,
            nullable,
            default_value: None,
            filter_expression: None,
        }
    }

    /// Set the size attribute.
    pub fn with_size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    /// Set the scale attribute.
    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = scale;
        self
    }

    /// Set the default value.
    pub fn with_default(mut self, default_value: impl Into<String>) -> Self {
        self.default_value = Some(default_value.into());
        self
    }
}

/// Equality ignores the filter expression decoration; everything else is
/// schema-significant.
impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.column_type == other.column_type
            && self.size == other.size
            && self.scale == other.scale
            && self.nullable == other.nullable
            && self.default_value == other.default_value
    }
}

impl Eq for Column {}

/// A secondary key (index) on a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    /// Index name. Must not be empty.
    pub name: String,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
    /// Indices into the owning table's column list, in key order.
    pub columns: ColumnIndices,
}

impl Key {
    /// Create a key over the given column indices.
    pub fn new(name: impl Into<String>, unique: bool, columns: ColumnIndices) -> Self {
        Self {
            name: name.into(),
            unique,
            columns,
        }
    }
}

/// Keys sort unique-first, then by name, so both ends enumerate a table's
/// keys in the same order.
impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.unique, other.unique) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => self.name.cmp(&other.name),
        }
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A table: ordered columns, primary key, and secondary keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    /// Table name.
    pub name: String,
    /// Columns in declaration order. The order is schema-significant.
    pub columns: Vec<Column>,
    /// Indices of the primary-key columns, in key order. Never empty for a
    /// table that passed introspection.
    pub primary_key_columns: ColumnIndices,
    /// Secondary keys, excluding the primary key.
    pub keys: Vec<Key>,
    /// Optional row filter applied identically at both ends. Not
    /// serialized.
    pub where_conditions: Option<String>,
}

impl Table {
    /// Create an empty table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            primary_key_columns: Vec::new(),
            keys: Vec::new(),
            where_conditions: None,
        }
    }

    /// Find the offset of the named column.
    pub fn index_of_column(&self, name: &str) -> SchemaResult<usize> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| SchemaError::no_such_column(&self.name, name))
    }

    /// Check that every key and primary-key column index is a valid offset
    /// into the column list, and that no key has an empty name.
    pub fn validate(&self) -> SchemaResult<()> {
        let in_range = |indices: &[usize]| indices.iter().all(|&i| i < self.columns.len());

        if !in_range(&self.primary_key_columns) {
            return Err(SchemaError::column_index_out_of_range(&self.name));
        }
        for key in &self.keys {
            if key.name.is_empty() {
                return Err(SchemaError::empty_key_name(&self.name));
            }
            if !in_range(&key.columns) {
                return Err(SchemaError::column_index_out_of_range(&self.name));
            }
        }
        Ok(())
    }

    /// Extract a row's primary-key tuple.
    pub fn key_of(&self, row: &[PackedValue]) -> ColumnValues {
        self.primary_key_columns
            .iter()
            .map(|&i| row[i].clone())
            .collect()
    }
}

/// Tables sort by name.
impl Ord for Table {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

impl PartialOrd for Table {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A database: the list of user tables.
///
/// Introspection may discover tables in any order (some backends list by
/// on-disk size); consumers that need the canonical order call
/// [`Database::sort_tables`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Database {
    /// The user tables.
    pub tables: Vec<Table>,
}

impl Database {
    /// Look up a table by name.
    pub fn table_by_name(&self, name: &str) -> SchemaResult<&Table> {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| SchemaError::no_such_table(name))
    }

    /// Sort tables into the canonical name order.
    pub fn sort_tables(&mut self) {
        self.tables.sort();
    }
}

/// Elect a surrogate primary key for a table that declares none: the
/// unique key with the lexicographically smallest name among those whose
/// columns are all non-nullable. A nullable unique key cannot provide the
/// total order the range algorithm needs, so it is never eligible.
pub fn choose_surrogate_key<'a>(columns: &[Column], keys: &'a [Key]) -> Option<&'a Key> {
    keys.iter()
        .filter(|key| key.unique && key.columns.iter().all(|&i| !columns[i].nullable))
        .min_by(|a, b| a.name.cmp(&b.name))
}
