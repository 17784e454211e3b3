//! Type registry: maps the logical column types reported by schema
//! introspection to their native [`Value`] representation.
//!
//! Every supported type knows how to coerce a raw engine cell into a native
//! value (used when materializing rows) and whether a native value belongs to
//! it (used when validating writes and filters).

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use rusqlite::types::Value as SqlValue;

use crate::error::{SqliterError, SqliterResult};
use crate::value::Value;

/// Storage format for DATE columns.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Accepted DATETIME formats, tried in order.
pub const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

/// Logical column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Text,
    Integer,
    Real,
    Blob,
    Date,
    DateTime,
    Boolean,
}

impl FieldType {
    /// The SQL keyword used in DDL and reported back by introspection.
    pub fn keyword(&self) -> &'static str {
        match self {
            FieldType::Text => "TEXT",
            FieldType::Integer => "INTEGER",
            FieldType::Real => "REAL",
            FieldType::Blob => "BLOB",
            FieldType::Date => "DATE",
            FieldType::DateTime => "DATETIME",
            FieldType::Boolean => "BOOLEAN",
        }
    }

    /// Looks up a declared column type. Returns `None` for types outside the registry.
    pub fn from_declared(declared: &str) -> Option<Self> {
        match declared.trim().to_ascii_uppercase().as_str() {
            "TEXT" => Some(FieldType::Text),
            "INTEGER" => Some(FieldType::Integer),
            "REAL" => Some(FieldType::Real),
            "BLOB" => Some(FieldType::Blob),
            "DATE" => Some(FieldType::Date),
            "DATETIME" => Some(FieldType::DateTime),
            "BOOLEAN" => Some(FieldType::Boolean),
            _ => None,
        }
    }

    /// Returns whether a non-null scalar value has this type's native representation.
    pub fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (FieldType::Text, Value::Text(_))
                | (FieldType::Integer, Value::Integer(_))
                | (FieldType::Real, Value::Real(_))
                | (FieldType::Blob, Value::Blob(_))
                | (FieldType::Date, Value::Date(_))
                | (FieldType::DateTime, Value::DateTime(_))
                | (FieldType::Boolean, Value::Boolean(_))
        )
    }

    /// Coerces a raw engine cell read from `column` into its native value.
    pub fn coerce(&self, column: &str, raw: SqlValue) -> SqliterResult<Value> {
        let found = raw_type_name(&raw);
        let mismatch = || SqliterError::MismatchingTypes {
            field: column.to_string(),
            expected: *self,
            found,
        };

        let value = match (self, raw) {
            (_, SqlValue::Null) => Value::Null,
            (FieldType::Text, SqlValue::Text(text)) => Value::Text(text),
            (FieldType::Text, SqlValue::Integer(number)) => Value::Text(number.to_string()),
            (FieldType::Text, SqlValue::Real(number)) => Value::Text(number.to_string()),
            (FieldType::Text, SqlValue::Blob(bytes)) => {
                Value::Text(String::from_utf8(bytes).map_err(|_| mismatch())?)
            }
            (FieldType::Integer, SqlValue::Integer(number)) => Value::Integer(number),
            (FieldType::Integer, SqlValue::Real(number)) => Value::Integer(number as i64),
            (FieldType::Integer, SqlValue::Text(text)) => {
                Value::Integer(text.trim().parse().map_err(|_| mismatch())?)
            }
            (FieldType::Real, SqlValue::Real(number)) => Value::Real(number),
            (FieldType::Real, SqlValue::Integer(number)) => Value::Real(number as f64),
            (FieldType::Real, SqlValue::Text(text)) => {
                Value::Real(text.trim().parse().map_err(|_| mismatch())?)
            }
            (FieldType::Blob, SqlValue::Blob(bytes)) => Value::Blob(bytes),
            (FieldType::Blob, SqlValue::Text(text)) => Value::Blob(text.into_bytes()),
            (FieldType::Date, SqlValue::Text(text)) => {
                Value::Date(parse_date(&text).ok_or_else(mismatch)?)
            }
            (FieldType::DateTime, SqlValue::Text(text)) => {
                Value::DateTime(parse_datetime(&text).ok_or_else(mismatch)?)
            }
            (FieldType::Boolean, SqlValue::Integer(number)) => Value::Boolean(number != 0),
            (FieldType::Boolean, SqlValue::Real(number)) => Value::Boolean(number != 0.0),
            (FieldType::Boolean, SqlValue::Text(text)) => {
                match text.trim().to_ascii_lowercase().as_str() {
                    "1" | "true" => Value::Boolean(true),
                    "0" | "false" => Value::Boolean(false),
                    _ => return Err(mismatch()),
                }
            }
            _ => return Err(mismatch()),
        };

        Ok(value)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Parses a DATE cell.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), DATE_FORMAT).ok()
}

/// Parses a DATETIME cell, with fractional seconds first and whole seconds as fallback.
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text.trim(), format).ok())
}

pub fn format_date(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Formats a DATETIME so that [`parse_datetime`] reads it back unchanged.
pub fn format_datetime(datetime: &NaiveDateTime) -> String {
    if datetime.nanosecond() == 0 {
        datetime.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        datetime.format("%Y-%m-%d %H:%M:%S%.f").to_string()
    }
}

fn raw_type_name(raw: &SqlValue) -> &'static str {
    match raw {
        SqlValue::Null => "NULL",
        SqlValue::Integer(_) => "INTEGER",
        SqlValue::Real(_) => "REAL",
        SqlValue::Text(_) => "TEXT",
        SqlValue::Blob(_) => "BLOB",
    }
}
