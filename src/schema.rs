//! Per-table schema cache derived from engine introspection.

use rusqlite::Connection;
use tracing::debug;

use crate::entry::Entry;
use crate::error::{SqliterError, SqliterResult};
use crate::field::ForeignKeyAction;
use crate::types::FieldType;
use crate::util::{is_valid_field_name, PK_ALIAS};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSchema {
    pub name: String,
    pub field_type: FieldType,
    pub nullable: bool,
    pub is_primary_key: bool,
    /// Default expression exactly as the engine reports it.
    pub default_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForeignKeySchema {
    pub column: String,
    pub referenced_table: String,
    /// `None` when the reference targets the other table's primary key implicitly.
    pub referenced_column: Option<String>,
    pub on_delete: ForeignKeyAction,
}

/// Immutable metadata of one table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSchema {
    name: String,
    columns: Vec<ColumnSchema>,
    primary_key: String,
    foreign_keys: Vec<ForeignKeySchema>,
}

impl TableSchema {
    /// Introspects `name` through `pragma_table_info` and `pragma_foreign_key_list`.
    pub fn load(conn: &Connection, name: &str) -> SqliterResult<Self> {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            [name],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(SqliterError::NoSuchTable(name.to_string()));
        }

        let mut stmt = conn.prepare(
            "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid",
        )?;
        let raw_columns = stmt
            .query_map([name], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, bool>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut columns = Vec::with_capacity(raw_columns.len());
        for (column, declared, not_null, default_value, pk) in raw_columns {
            let field_type =
                FieldType::from_declared(&declared).ok_or_else(|| SqliterError::UnknownFieldType {
                    table: name.to_string(),
                    column: column.clone(),
                    declared,
                })?;
            let is_primary_key = pk > 0;
            columns.push(ColumnSchema {
                name: column,
                field_type,
                nullable: !not_null && !is_primary_key,
                is_primary_key,
                default_value,
            });
        }

        let mut primary_keys = columns.iter().filter(|column| column.is_primary_key);
        let primary_key = match (primary_keys.next(), primary_keys.next()) {
            (Some(column), None) => column.name.clone(),
            _ => {
                return Err(SqliterError::UnsupportedPrimaryKey {
                    table: name.to_string(),
                    count: columns.iter().filter(|column| column.is_primary_key).count(),
                })
            }
        };

        let mut stmt = conn.prepare(
            "SELECT \"from\", \"table\", \"to\", on_delete FROM pragma_foreign_key_list(?1) ORDER BY id, seq",
        )?;
        let raw_foreign_keys = stmt
            .query_map([name], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut foreign_keys = Vec::with_capacity(raw_foreign_keys.len());
        for (column, referenced_table, referenced_column, on_delete) in raw_foreign_keys {
            let on_delete = parse_on_delete(name, &column, &on_delete)?;
            foreign_keys.push(ForeignKeySchema {
                column,
                referenced_table,
                referenced_column,
                on_delete,
            });
        }

        debug!(
            table = name,
            columns = columns.len(),
            foreign_keys = foreign_keys.len(),
            "loaded table schema"
        );

        Ok(Self {
            name: name.to_string(),
            columns,
            primary_key,
            foreign_keys,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    /// Name of the single primary-key column.
    pub fn primary_key(&self) -> &str {
        &self.primary_key
    }

    pub fn foreign_keys(&self) -> &[ForeignKeySchema] {
        &self.foreign_keys
    }

    pub fn foreign_key(&self, column: &str) -> Option<&ForeignKeySchema> {
        self.foreign_keys.iter().find(|fk| fk.column == column)
    }

    /// Resolves a caller-supplied field name to its column, honouring the `pk` alias.
    pub fn resolve_field(&self, field: &str) -> SqliterResult<&ColumnSchema> {
        if !is_valid_field_name(field) {
            return Err(SqliterError::InvalidFieldName(field.to_string()));
        }
        let name = if field == PK_ALIAS {
            self.primary_key.as_str()
        } else {
            field
        };
        self.column(name).ok_or_else(|| SqliterError::NoSuchField {
            table: self.name.clone(),
            field: field.to_string(),
        })
    }

    /// Prepares `value` for writing to or comparing with `column`.
    ///
    /// Entries are reduced to the key they are referenced by, then the result
    /// must be NULL or match the column's native type.
    pub fn conform(&self, column: &ColumnSchema, value: Value) -> SqliterResult<Value> {
        let value = match value {
            Value::Entry(entry) => self.reduce_entry(column, *entry)?,
            other => other,
        };

        if value.is_null() || column.field_type.accepts(&value) {
            return Ok(value);
        }
        Err(SqliterError::MismatchingTypes {
            field: column.name.clone(),
            expected: column.field_type,
            found: value.type_name(),
        })
    }

    /// Like [`TableSchema::conform`], but for a membership-test operand: every element must conform.
    pub fn conform_list(&self, column: &ColumnSchema, value: Value) -> SqliterResult<Vec<Value>> {
        match value {
            Value::List(items) => items
                .into_iter()
                .map(|item| self.conform(column, item))
                .collect(),
            other => Err(SqliterError::MismatchingTypes {
                field: column.name.clone(),
                expected: column.field_type,
                found: other.type_name(),
            }),
        }
    }

    fn reduce_entry(&self, column: &ColumnSchema, entry: Entry) -> SqliterResult<Value> {
        let Some(fk) = self.foreign_key(&column.name) else {
            return Ok(entry.pk().clone());
        };
        if entry.table_name() != fk.referenced_table {
            return Err(SqliterError::ForeignKey(format!(
                "{}.{} references {}, got an entry of {}",
                self.name,
                column.name,
                fk.referenced_table,
                entry.table_name()
            )));
        }
        match &fk.referenced_column {
            Some(referenced) => Ok(entry.get(referenced)?.clone()),
            None => Ok(entry.pk().clone()),
        }
    }
}

/// Parses the on-delete action reported by `pragma_foreign_key_list`.
fn parse_on_delete(table: &str, column: &str, action: &str) -> SqliterResult<ForeignKeyAction> {
    action.parse().map_err(|_| {
        SqliterError::ForeignKey(format!(
            "{table}.{column} has an unsupported on-delete action {action:?}"
        ))
    })
}
