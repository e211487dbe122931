//! SQL templates.
//!
//! Language-neutral statement builders parameterized by a backend's
//! [`SqlPolicy`], so the same templates emit correctly quoted identifiers
//! and correctly escaped literals for every backend.

use crate::error::{AdapterError, AdapterResult};
use driftsync_codec::PackedValue;
use driftsync_schema::{Column, Key, Table};

/// Backend-specific lexical policy: identifier quoting, literal escaping,
/// and DDL fragments.
pub trait SqlPolicy {
    /// The identifier quote character, or `None` if the backend takes
    /// identifiers bare.
    fn quote_char(&self) -> Option<char>;

    /// Whether index names share one global namespace (`DROP INDEX name`)
    /// or live under their table (`ALTER TABLE ... DROP INDEX name`).
    fn index_names_are_global(&self) -> bool;

    /// Escape a string for inclusion inside a single-quoted literal.
    fn escape_string(&self, value: &str) -> String;

    /// Render a byte string as a complete binary literal.
    fn bytes_literal(&self, bytes: &[u8]) -> String;

    /// Render a boolean literal.
    fn bool_literal(&self, value: bool) -> &'static str {
        if value {
            "TRUE"
        } else {
            "FALSE"
        }
    }

    /// The column DDL fragment for CREATE TABLE or ADD COLUMN.
    fn column_definition(&self, column: &Column) -> AdapterResult<String>;
}

/// Quote an identifier per the policy.
pub fn quote_ident<P: SqlPolicy + ?Sized>(policy: &P, name: &str) -> String {
    match policy.quote_char() {
        Some(q) => format!("{q}{name}{q}"),
        None => name.to_string(),
    }
}

/// Render a value as a SQL literal.
pub fn sql_literal<P: SqlPolicy + ?Sized>(
    policy: &P,
    value: &PackedValue,
) -> AdapterResult<String> {
    Ok(match value {
        PackedValue::Nil => "NULL".to_string(),
        PackedValue::Bool(b) => policy.bool_literal(*b).to_string(),
        PackedValue::Int(n) => n.to_string(),
        PackedValue::Uint(n) => n.to_string(),
        PackedValue::Float(f) => f.to_string(),
        PackedValue::Bytes(b) => policy.bytes_literal(b),
        PackedValue::Text(s) => format!("'{}'", policy.escape_string(s)),
        PackedValue::Array(_) | PackedValue::Map(_) => {
            return Err(AdapterError::unsupported(
                "composite values have no SQL literal form",
            ))
        }
    })
}

/// A comma-separated, quoted list of the named columns: `a, b`.
fn column_list<P: SqlPolicy + ?Sized>(policy: &P, table: &Table, indices: &[usize]) -> String {
    indices
        .iter()
        .map(|&i| quote_ident(policy, &table.columns[i].name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// The primary-key columns as a row-value tuple: `(a, b)`.
fn key_columns_tuple<P: SqlPolicy + ?Sized>(policy: &P, table: &Table) -> String {
    format!(
        "({})",
        column_list(policy, table, &table.primary_key_columns)
    )
}

/// A key tuple's values as a row-value tuple: `(1, 'aa')`.
fn key_values_tuple<P: SqlPolicy + ?Sized>(
    policy: &P,
    values: &[PackedValue],
) -> AdapterResult<String> {
    let literals = values
        .iter()
        .map(|v| sql_literal(policy, v))
        .collect::<AdapterResult<Vec<_>>>()?;
    Ok(format!("({})", literals.join(", ")))
}

/// The shared range predicate: `(pk) > (prev) AND (pk) <= (last)`, each
/// bound omitted when its tuple is empty, plus the table's extra where
/// conditions. Returns an empty string when there is nothing to constrain.
fn where_clause<P: SqlPolicy + ?Sized>(
    policy: &P,
    table: &Table,
    prev_key: &[PackedValue],
    last_key: &[PackedValue],
) -> AdapterResult<String> {
    let key_columns = key_columns_tuple(policy, table);
    let mut result = String::new();
    let mut prefix = " WHERE ";

    if !prev_key.is_empty() {
        result.push_str(prefix);
        result.push_str(&key_columns);
        result.push_str(" > ");
        result.push_str(&key_values_tuple(policy, prev_key)?);
        prefix = " AND ";
    }
    if !last_key.is_empty() {
        result.push_str(prefix);
        result.push_str(&key_columns);
        result.push_str(" <= ");
        result.push_str(&key_values_tuple(policy, last_key)?);
        prefix = " AND ";
    }
    if let Some(ref conditions) = table.where_conditions {
        result.push_str(prefix);
        result.push_str(conditions);
    }
    Ok(result)
}

/// The select list: every column in declaration order, with any filter
/// expression selected in place of the raw column.
fn select_columns<P: SqlPolicy + ?Sized>(policy: &P, table: &Table) -> String {
    table
        .columns
        .iter()
        .map(|column| {
            let quoted = quote_ident(policy, &column.name);
            match column.filter_expression {
                Some(ref expression) => format!("{expression} AS {quoted}"),
                None => quoted,
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// `SELECT <cols> FROM <table> WHERE <pk> > <prev> AND <pk> <= <last>
/// ORDER BY <pk> [LIMIT <row_count>]`.
///
/// The ORDER BY names the key columns positionally in the same order the
/// range predicate compares them, so the tuple comparison and the sort
/// agree on one lexicographic order.
pub fn retrieve_rows_sql<P: SqlPolicy + ?Sized>(
    policy: &P,
    table: &Table,
    prev_key: &[PackedValue],
    last_key: &[PackedValue],
    row_count: Option<usize>,
) -> AdapterResult<String> {
    let mut result = format!(
        "SELECT {} FROM {}{} ORDER BY {}",
        select_columns(policy, table),
        quote_ident(policy, &table.name),
        where_clause(policy, table, prev_key, last_key)?,
        column_list(policy, table, &table.primary_key_columns),
    );
    if let Some(count) = row_count {
        result.push_str(&format!(" LIMIT {count}"));
    }
    Ok(result)
}

/// `SELECT COUNT(*) FROM ...` with the same predicate shape.
pub fn count_rows_sql<P: SqlPolicy + ?Sized>(
    policy: &P,
    table: &Table,
    prev_key: &[PackedValue],
    last_key: &[PackedValue],
) -> AdapterResult<String> {
    Ok(format!(
        "SELECT COUNT(*) FROM {}{}",
        quote_ident(policy, &table.name),
        where_clause(policy, table, prev_key, last_key)?,
    ))
}

/// `CREATE TABLE` with all columns and the primary key.
pub fn create_table_sql<P: SqlPolicy + ?Sized>(policy: &P, table: &Table) -> AdapterResult<String> {
    let mut definitions = table
        .columns
        .iter()
        .map(|column| policy.column_definition(column))
        .collect::<AdapterResult<Vec<_>>>()?;
    definitions.push(format!(
        "PRIMARY KEY {}",
        key_columns_tuple(policy, table)
    ));
    Ok(format!(
        "CREATE TABLE {} ({})",
        quote_ident(policy, &table.name),
        definitions.join(", ")
    ))
}

/// `DROP TABLE`.
pub fn drop_table_sql<P: SqlPolicy + ?Sized>(policy: &P, table_name: &str) -> String {
    format!("DROP TABLE {}", quote_ident(policy, table_name))
}

/// `CREATE [UNIQUE] INDEX`.
pub fn add_key_sql<P: SqlPolicy + ?Sized>(policy: &P, table: &Table, key: &Key) -> String {
    format!(
        "CREATE {}INDEX {} ON {} ({})",
        if key.unique { "UNIQUE " } else { "" },
        quote_ident(policy, &key.name),
        quote_ident(policy, &table.name),
        column_list(policy, table, &key.columns),
    )
}

/// `DROP INDEX`, shaped by whether index names are global.
pub fn drop_key_sql<P: SqlPolicy + ?Sized>(policy: &P, table: &Table, key: &Key) -> String {
    if policy.index_names_are_global() {
        format!("DROP INDEX {}", quote_ident(policy, &key.name))
    } else {
        format!(
            "ALTER TABLE {} DROP INDEX {}",
            quote_ident(policy, &table.name),
            quote_ident(policy, &key.name),
        )
    }
}

/// `ALTER TABLE ... DROP COLUMN ...` for each named column.
pub fn drop_columns_sql<P: SqlPolicy + ?Sized>(
    policy: &P,
    table: &Table,
    column_names: &[String],
) -> String {
    let drops = column_names
        .iter()
        .map(|name| format!("DROP COLUMN {}", quote_ident(policy, name)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "ALTER TABLE {} {}",
        quote_ident(policy, &table.name),
        drops
    )
}

/// `INSERT INTO ... VALUES ...` for one row.
pub fn insert_row_sql<P: SqlPolicy + ?Sized>(
    policy: &P,
    table: &Table,
    row: &[PackedValue],
) -> AdapterResult<String> {
    let all_columns: Vec<usize> = (0..table.columns.len()).collect();
    let literals = row
        .iter()
        .map(|v| sql_literal(policy, v))
        .collect::<AdapterResult<Vec<_>>>()?;
    Ok(format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(policy, &table.name),
        column_list(policy, table, &all_columns),
        literals.join(", ")
    ))
}

/// `DELETE FROM ...` over a primary-key range.
pub fn delete_range_sql<P: SqlPolicy + ?Sized>(
    policy: &P,
    table: &Table,
    prev_key: &[PackedValue],
    last_key: &[PackedValue],
) -> AdapterResult<String> {
    Ok(format!(
        "DELETE FROM {}{}",
        quote_ident(policy, &table.name),
        where_clause(policy, table, prev_key, last_key)?,
    ))
}
