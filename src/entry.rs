//! Materialized rows.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::debug;

use crate::database::{Database, RawRow};
use crate::error::{SqliterError, SqliterResult};
use crate::schema::{ForeignKeySchema, TableSchema};
use crate::table::Table;
use crate::util::{is_valid_field_name, scrub};
use crate::value::Value;

/// One row of a table.
///
/// Holds one [`Value`] per schema column, in column order, plus the primary
/// key the row was loaded with. Assignments stay local until [`Entry::save`].
#[derive(Clone)]
pub struct Entry {
    db: Database,
    schema: Rc<TableSchema>,
    pk: Value,
    values: Vec<Value>,
}

impl Entry {
    /// The primary key this entry was loaded (or last saved) with.
    pub fn pk(&self) -> &Value {
        &self.pk
    }

    pub fn table_name(&self) -> &str {
        self.schema.name()
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Reads a field by column name (or `pk`).
    pub fn get(&self, field: &str) -> SqliterResult<&Value> {
        let index = self.field_index(field)?;
        Ok(&self.values[index])
    }

    /// Assigns a field. Types are checked when the entry is saved.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> SqliterResult<()> {
        let index = self.field_index(field)?;
        self.values[index] = value.into();
        Ok(())
    }

    /// Column names and current values, in column order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.schema
            .columns()
            .iter()
            .map(|column| column.name.as_str())
            .zip(self.values.iter())
    }

    /// Writes every column back to the row with a single `UPDATE`.
    pub fn save(&mut self) -> SqliterResult<()> {
        let schema = Rc::clone(&self.schema);
        let mut assignments = Vec::with_capacity(self.values.len());
        let mut params = Vec::with_capacity(self.values.len() + 1);
        for (column, value) in schema.columns().iter().zip(self.values.iter()) {
            params.push(schema.conform(column, value.clone())?);
            assignments.push(format!("{} = ?", scrub(&column.name)));
        }
        let new_pk = self.pk_index().map(|index| params[index].clone());
        params.push(self.pk.clone());

        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            scrub(schema.name()),
            assignments.join(", "),
            scrub(schema.primary_key())
        );
        let updated = self.db.with_transaction(|tx| {
            debug!(%sql, "saving entry");
            Ok(tx.execute(&sql, params_from_iter(params.iter()))?)
        })?;
        if updated == 0 {
            return Err(self.missing());
        }

        if let Some(pk) = new_pk {
            self.pk = pk;
        }
        Ok(())
    }

    /// Deletes the row this entry was loaded from.
    pub fn delete(self) -> SqliterResult<()> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1",
            scrub(self.schema.name()),
            scrub(self.schema.primary_key())
        );
        let deleted = self.db.with_transaction(|tx| {
            debug!(%sql, "deleting entry");
            Ok(tx.execute(&sql, [&self.pk])?)
        })?;
        if deleted == 0 {
            return Err(self.missing());
        }
        Ok(())
    }

    /// Discards local assignments and re-reads the row.
    pub fn reload(&mut self) -> SqliterResult<()> {
        let table = Table::from_parts(self.db.clone(), Rc::clone(&self.schema));
        *self = table.get_pk(self.pk.clone())?;
        Ok(())
    }

    fn field_index(&self, field: &str) -> SqliterResult<usize> {
        let column = self.schema.resolve_field(field)?;
        self.schema
            .column_index(&column.name)
            .ok_or_else(|| SqliterError::NoSuchField {
                table: self.schema.name().to_string(),
                field: field.to_string(),
            })
    }

    fn pk_index(&self) -> Option<usize> {
        self.schema.column_index(self.schema.primary_key())
    }

    fn missing(&self) -> SqliterError {
        SqliterError::NoSuchEntry {
            table: self.schema.name().to_string(),
            lookup: format!("{}={}", self.schema.primary_key(), self.pk),
        }
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.schema.name() == other.schema.name() && self.values == other.values
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (name, value) in self.fields() {
            map.entry(&name, value);
        }
        map.finish()
    }
}

impl Serialize for Entry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in self.fields() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Prints the column → value mapping as JSON.
impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

/// Turns buffered rows of one table into entries.
///
/// Foreign-key columns are dereferenced eagerly into nested entries, one hop
/// deep: nested entries keep their own foreign keys as plain values.
/// Referenced tables are introspected once per materializer.
pub(crate) struct Materializer {
    db: Database,
    schema: Rc<TableSchema>,
    resolve_foreign_keys: bool,
    referenced: HashMap<String, Table>,
}

impl Materializer {
    pub(crate) fn new(db: Database, schema: Rc<TableSchema>) -> Self {
        Self {
            db,
            schema,
            resolve_foreign_keys: true,
            referenced: HashMap::new(),
        }
    }

    fn shallow(db: Database, schema: Rc<TableSchema>) -> Self {
        Self {
            resolve_foreign_keys: false,
            ..Self::new(db, schema)
        }
    }

    pub(crate) fn materialize(&mut self, row: RawRow) -> SqliterResult<Entry> {
        let schema = Rc::clone(&self.schema);
        let mut values = vec![Value::Null; schema.columns().len()];
        let mut pk = Value::Null;

        for (name, raw) in row {
            if !is_valid_field_name(&name) {
                return Err(SqliterError::InvalidFieldName(name));
            }
            let index = schema
                .column_index(&name)
                .ok_or_else(|| SqliterError::NoSuchField {
                    table: schema.name().to_string(),
                    field: name.clone(),
                })?;
            let column = &schema.columns()[index];

            if column.is_primary_key {
                pk = column.field_type.coerce(&name, raw.clone())?;
            }
            values[index] = match schema.foreign_key(&name) {
                Some(fk) if self.resolve_foreign_keys && raw != SqlValue::Null => {
                    self.dereference(fk, raw)?
                }
                _ => column.field_type.coerce(&name, raw)?,
            };
        }

        Ok(Entry {
            db: self.db.clone(),
            schema,
            pk,
            values,
        })
    }

    fn dereference(&mut self, fk: &ForeignKeySchema, raw: SqlValue) -> SqliterResult<Value> {
        let table = self.referenced_table(&fk.referenced_table)?;
        let schema = table.schema_rc();
        let column_name = fk
            .referenced_column
            .as_deref()
            .unwrap_or_else(|| schema.primary_key());
        let column = schema.column(column_name).ok_or_else(|| {
            SqliterError::ForeignKey(format!(
                "{}.{} references missing column {}.{}",
                self.schema.name(),
                fk.column,
                fk.referenced_table,
                column_name
            ))
        })?;
        let key = column.field_type.coerce(column_name, raw)?;

        let sql = format!(
            "SELECT * FROM {} WHERE {} = ?1 LIMIT 1",
            scrub(schema.name()),
            scrub(column_name)
        );
        let row = self
            .db
            .fetch_rows(&sql, [&key])?
            .into_iter()
            .next()
            .ok_or_else(|| {
                SqliterError::ForeignKey(format!(
                    "{}.{} = {} has no matching row in {}",
                    self.schema.name(),
                    fk.column,
                    key,
                    fk.referenced_table
                ))
            })?;

        let entry = Materializer::shallow(self.db.clone(), Rc::clone(&schema)).materialize(row)?;
        Ok(Value::from(entry))
    }

    fn referenced_table(&mut self, name: &str) -> SqliterResult<Table> {
        if let Some(table) = self.referenced.get(name) {
            return Ok(table.clone());
        }
        let table = self.db.table(name).map_err(|error| match error {
            SqliterError::NoSuchTable(table) => {
                SqliterError::ForeignKey(format!("referenced table {table} does not exist"))
            }
            other => other,
        })?;
        self.referenced.insert(name.to_string(), table.clone());
        Ok(table)
    }
}
