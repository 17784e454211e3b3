use std::rc::Rc;

use rusqlite::{params_from_iter, Connection};
use tracing::{debug, info};

use crate::database::Database;
use crate::entry::{Entry, Materializer};
use crate::error::{SqliterError, SqliterResult};
use crate::query::{Combinator, ResultSet};
use crate::schema::TableSchema;
use crate::util::{scrub, PK_ALIAS};
use crate::value::{Fields, Value};

/// How an insert treats conflicts with existing rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InsertMode {
    Insert,
    Replace,
    Ignore,
}

impl InsertMode {
    fn keyword(&self) -> &'static str {
        match self {
            InsertMode::Insert => "INSERT",
            InsertMode::Replace => "INSERT OR REPLACE",
            InsertMode::Ignore => "INSERT OR IGNORE",
        }
    }
}

/// Handle on one table, carrying the schema introspected when it was obtained.
#[derive(Debug, Clone)]
pub struct Table {
    db: Database,
    schema: Rc<TableSchema>,
}

impl Table {
    pub(crate) fn load(db: Database, name: &str) -> SqliterResult<Self> {
        let schema = TableSchema::load(db.connection(), name)?;
        Ok(Self::from_parts(db, Rc::new(schema)))
    }

    pub(crate) fn from_parts(db: Database, schema: Rc<TableSchema>) -> Self {
        Self { db, schema }
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub(crate) fn schema_rc(&self) -> Rc<TableSchema> {
        Rc::clone(&self.schema)
    }

    pub(crate) fn database(&self) -> &Database {
        &self.db
    }

    /// Column names in declaration order.
    pub fn columns(&self) -> Vec<&str> {
        self.schema
            .columns()
            .iter()
            .map(|column| column.name.as_str())
            .collect()
    }

    /// Inserts a row and returns it as stored, defaults and primary key included.
    pub fn create(&self, fields: Fields) -> SqliterResult<Entry> {
        self.db
            .with_transaction(|tx| self.insert(tx, InsertMode::Insert, fields))?
            .ok_or_else(|| self.no_entry("last_insert_rowid"))
    }

    /// Inserts a row, replacing any row it conflicts with.
    pub fn create_or_replace(&self, fields: Fields) -> SqliterResult<Entry> {
        self.db
            .with_transaction(|tx| self.insert(tx, InsertMode::Replace, fields))?
            .ok_or_else(|| self.no_entry("last_insert_rowid"))
    }

    /// Inserts a row unless it conflicts with an existing one; `None` when ignored.
    pub fn create_or_ignore(&self, fields: Fields) -> SqliterResult<Option<Entry>> {
        self.db
            .with_transaction(|tx| self.insert(tx, InsertMode::Ignore, fields))
    }

    /// Inserts every item in one transaction: either all rows are written or none.
    pub fn bulk_create<I>(&self, items: I) -> SqliterResult<Vec<Entry>>
    where
        I: IntoIterator<Item = Fields>,
    {
        self.bulk_insert(InsertMode::Insert, items)
    }

    pub fn bulk_create_or_replace<I>(&self, items: I) -> SqliterResult<Vec<Entry>>
    where
        I: IntoIterator<Item = Fields>,
    {
        self.bulk_insert(InsertMode::Replace, items)
    }

    /// Like [`Table::bulk_create`], skipping conflicting items. Only inserted rows are returned.
    pub fn bulk_create_or_ignore<I>(&self, items: I) -> SqliterResult<Vec<Entry>>
    where
        I: IntoIterator<Item = Fields>,
    {
        self.bulk_insert(InsertMode::Ignore, items)
    }

    /// Every row of the table.
    pub fn all(&self) -> ResultSet {
        ResultSet::unfiltered(self.clone())
    }

    /// Rows matching every condition in `fields`.
    pub fn filter(&self, fields: Fields) -> SqliterResult<ResultSet> {
        ResultSet::new(self.clone(), Combinator::And, fields)
    }

    /// Rows matching `fields` combined with `operator` (`"AND"` or `"OR"`, any case).
    pub fn filter_by(&self, operator: &str, fields: Fields) -> SqliterResult<ResultSet> {
        ResultSet::new(self.clone(), operator.parse()?, fields)
    }

    /// Exact-match lookup of a single row.
    ///
    /// Fails with `NoSuchEntry` when nothing matches and `MultipleEntries` when
    /// more than one row does. An empty lookup is rejected.
    pub fn get(&self, fields: Fields) -> SqliterResult<Entry> {
        if fields.is_empty() {
            return Err(SqliterError::InvalidFieldName(
                "get requires at least one field".to_string(),
            ));
        }
        let lookup = fields.to_string();
        let mut entries = ResultSet::exact(self.clone(), fields)?.limit(2).all()?;
        match entries.len() {
            0 => Err(self.no_entry(&lookup)),
            1 => Ok(entries.remove(0)),
            _ => Err(SqliterError::MultipleEntries {
                table: self.name().to_string(),
                lookup,
            }),
        }
    }

    pub fn get_pk(&self, pk: impl Into<Value>) -> SqliterResult<Entry> {
        self.get(Fields::new().with_value(PK_ALIAS, pk))
    }

    /// Deletes every row; returns how many were removed.
    pub fn clear(&self) -> SqliterResult<usize> {
        self.all().delete()
    }

    /// Drops the table definition.
    pub fn drop_table(self) -> SqliterResult<()> {
        let sql = format!("DROP TABLE {}", scrub(self.name()));
        info!(table = self.name(), "dropping table");
        self.db.with_transaction(|tx| {
            tx.execute(&sql, [])?;
            Ok(())
        })
    }

    fn bulk_insert<I>(&self, mode: InsertMode, items: I) -> SqliterResult<Vec<Entry>>
    where
        I: IntoIterator<Item = Fields>,
    {
        self.db.with_transaction(|tx| {
            let mut entries = Vec::new();
            for fields in items {
                if let Some(entry) = self.insert(tx, mode, fields)? {
                    entries.push(entry);
                }
            }
            Ok(entries)
        })
    }

    /// Inserts one row on `conn` and re-fetches it by row id.
    /// Returns `None` when the engine ignored the insert.
    fn insert(&self, conn: &Connection, mode: InsertMode, fields: Fields) -> SqliterResult<Option<Entry>> {
        let mut columns = Vec::with_capacity(fields.len());
        let mut values = Vec::with_capacity(fields.len());
        for (key, value) in fields {
            let column = self.schema.resolve_field(&scrub(&key))?;
            values.push(self.schema.conform(column, value)?);
            columns.push(scrub(&column.name));
        }

        let table = scrub(self.name());
        let sql = if columns.is_empty() {
            format!("{} INTO {table} DEFAULT VALUES", mode.keyword())
        } else {
            let placeholders = vec!["?"; columns.len()].join(", ");
            format!(
                "{} INTO {table} ({}) VALUES ({placeholders})",
                mode.keyword(),
                columns.join(", ")
            )
        };
        debug!(%sql, "inserting row");

        if conn.execute(&sql, params_from_iter(values.iter()))? == 0 {
            return Ok(None);
        }
        let rowid = conn.last_insert_rowid();
        self.fetch_rowid(rowid).map(Some)
    }

    fn fetch_rowid(&self, rowid: i64) -> SqliterResult<Entry> {
        let sql = format!("SELECT * FROM {} WHERE rowid = ?1", scrub(self.name()));
        let row = self
            .db
            .fetch_rows(&sql, [rowid])?
            .into_iter()
            .next()
            .ok_or_else(|| self.no_entry(&format!("rowid={rowid}")))?;
        Materializer::new(self.db.clone(), self.schema_rc()).materialize(row)
    }

    fn no_entry(&self, lookup: &str) -> SqliterError {
        SqliterError::NoSuchEntry {
            table: self.name().to_string(),
            lookup: lookup.to_string(),
        }
    }
}
