use crate::store::{Condition, Filter};
use crate::value::{Record, Value};
use anyhow::{anyhow, bail};
use chrono::{NaiveDate, NaiveTime};
use regex::Regex;
use sqlx::mysql::{MySqlArguments, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, MySql, Row, TypeInfo, ValueRef};
use std::sync::OnceLock;

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_$]*$").expect("valid identifier pattern"))
}

/// Quotes a table or column name, refusing anything that is not a plain
/// identifier.
pub(crate) fn quote(identifier: &str) -> anyhow::Result<String> {
    if !identifier_pattern().is_match(identifier) {
        bail!("invalid identifier {:?}", identifier);
    }
    Ok(format!("`{}`", identifier))
}

/// `WHERE ...` for a condition (empty for an unconditional one) and the
/// parameters to bind, in placeholder order.
pub(crate) fn where_clause(condition: &Condition) -> anyhow::Result<(String, Vec<Value>)> {
    if condition.filters.is_empty() {
        return Ok((String::new(), vec![]));
    }
    let mut clauses = vec![];
    let mut params = vec![];
    for filter in &condition.filters {
        match filter {
            Filter::Eq(field, Value::Null) => clauses.push(format!("{} IS NULL", quote(field)?)),
            Filter::Eq(field, value) => {
                clauses.push(format!("{} = ?", quote(field)?));
                params.push(value.clone());
            }
            Filter::In(_, values) if values.is_empty() => clauses.push("1 = 0".to_string()),
            Filter::In(field, values) => {
                let placeholders = vec!["?"; values.len()].join(", ");
                clauses.push(format!("{} IN ({})", quote(field)?, placeholders));
                params.extend(values.iter().cloned());
            }
        }
    }
    Ok((format!(" WHERE {}", clauses.join(" AND ")), params))
}

pub(crate) fn insert_sql(table: &str, record: &Record) -> anyhow::Result<(String, Vec<Value>)> {
    let mut sql_columns = vec![];
    let mut sql_values = vec![];
    let mut values = vec![];
    for (column, value) in record.fields() {
        sql_columns.push(quote(column)?);
        sql_values.push("?");
        values.push(value.clone());
    }
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote(table)?,
        sql_columns.join(", "),
        sql_values.join(", "),
    );
    Ok((sql, values))
}

pub(crate) fn select_sql(table: &str, condition: &Condition) -> anyhow::Result<(String, Vec<Value>)> {
    let (where_sql, params) = where_clause(condition)?;
    Ok((format!("SELECT * FROM {}{}", quote(table)?, where_sql), params))
}

pub(crate) fn delete_sql(table: &str, condition: &Condition) -> anyhow::Result<(String, Vec<Value>)> {
    let (where_sql, params) = where_clause(condition)?;
    Ok((format!("DELETE FROM {}{}", quote(table)?, where_sql), params))
}

pub(crate) fn bind_all<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    params: &[Value],
) -> anyhow::Result<Query<'q, MySql, MySqlArguments>> {
    for param in params {
        query = match param {
            Value::Null => query.bind(None::<i64>),
            Value::Boolean(v) => query.bind(*v),
            Value::Integer(v) => query.bind(*v),
            Value::Float(v) => query.bind(*v),
            Value::String(v) => query.bind(v.clone()),
            Value::Datetime(v) => query.bind(*v),
            Value::List(_) | Value::Record(_) => {
                bail!("nested value {} cannot be bound to a MySQL column", param)
            }
        };
    }
    Ok(query)
}

/// Decodes a row column by column, dispatching on the reported column type.
pub(crate) fn convert_row(row: &MySqlRow) -> anyhow::Result<Record> {
    let mut record = Record::new();
    for (index, column) in row.columns().iter().enumerate() {
        let is_null = row.try_get_raw(index)?.is_null();
        let value = if is_null {
            Value::Null
        } else {
            decode_column(row, index, column.type_info().name())
                .map_err(|err| anyhow!("column {}: {}", column.name(), err))?
        };
        record.set(column.name(), value);
    }
    Ok(record)
}

fn decode_column(row: &MySqlRow, index: usize, type_name: &str) -> anyhow::Result<Value> {
    let value = match type_name {
        "BOOLEAN" => Value::Boolean(row.try_get(index)?),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
            Value::Integer(row.try_get(index)?)
        }
        name if name.ends_with(" UNSIGNED") => {
            let value: u64 = row.try_get(index)?;
            Value::Integer(i64::try_from(value)?)
        }
        "FLOAT" => Value::Float(row.try_get::<f32, _>(index)?.into()),
        "DOUBLE" => Value::Float(row.try_get(index)?),
        "DATETIME" | "TIMESTAMP" => Value::Datetime(row.try_get(index)?),
        "DATE" => {
            let date: NaiveDate = row.try_get(index)?;
            Value::Datetime(date.and_time(NaiveTime::MIN))
        }
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
            let bytes: Vec<u8> = row.try_get(index)?;
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        }
        _ => Value::String(row.try_get(index)?),
    };
    Ok(value)
}
