use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, Params, Transaction};
use tracing::{debug, info, warn};

use crate::config::SqliteConfig;
use crate::error::{SqliterError, SqliterResult};
use crate::field::FieldDescriptor;
use crate::table::Table;
use crate::util::scrub;

/// A fully buffered result row: column name and raw engine cell, in select order.
pub(crate) type RawRow = Vec<(String, SqlValue)>;

/// Handle to one SQLite connection.
///
/// Cloning is cheap and every clone shares the same connection. Tables, entries
/// and result sets keep a clone so they can issue follow-up queries, such as
/// foreign-key lookups. The connection is not thread-safe, and neither is this handle.
#[derive(Debug, Clone)]
pub struct Database {
    conn: Rc<Connection>,
}

impl Database {
    /// Opens (or creates) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> SqliterResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening sqlite database");
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> SqliterResult<Self> {
        info!("opening in-memory sqlite database");
        Self::from_connection(Connection::open_in_memory()?)
    }

    /// Opens the database described by `config` and creates any table of its
    /// schema that does not exist yet.
    pub fn open_with_config(config: &SqliteConfig) -> SqliterResult<Self> {
        let db = Self::open(&config.db_path)?;
        if let Some(timeout) = config.busy_timeout_ms {
            db.conn.busy_timeout(Duration::from_millis(timeout))?;
        }
        db.initialize_schema(config)?;
        Ok(db)
    }

    fn from_connection(conn: Connection) -> SqliterResult<Self> {
        // foreign key enforcement is off by default and scoped to the connection
        conn.pragma_update(None, "foreign_keys", true)?;
        Ok(Self {
            conn: Rc::new(conn),
        })
    }

    fn initialize_schema(&self, config: &SqliteConfig) -> SqliterResult<()> {
        for table in &config.schema.tables {
            let fields = table
                .fields
                .iter()
                .map(|(name, descriptor)| (name.as_str(), descriptor));
            self.create_table_with(&table.name, fields, true)?;
        }
        Ok(())
    }

    pub fn foreign_keys_enabled(&self) -> SqliterResult<bool> {
        Ok(self
            .conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))?)
    }

    /// Names of the user tables, in catalog order.
    pub fn tables(&self) -> SqliterResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\'",
        )?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(names)
    }

    pub fn has_table(&self, name: &str) -> SqliterResult<bool> {
        let name = scrub(name);
        Ok(self.tables()?.iter().any(|table| *table == name))
    }

    /// Returns a handle on an existing table, introspecting its schema.
    pub fn table(&self, name: &str) -> SqliterResult<Table> {
        Table::load(self.clone(), &scrub(name))
    }

    pub fn create_table(&self, name: &str, fields: &[(&str, FieldDescriptor)]) -> SqliterResult<Table> {
        self.create_table_with(name, fields.iter().map(|(n, d)| (*n, d)), false)
    }

    pub fn create_table_if_not_exists(
        &self,
        name: &str,
        fields: &[(&str, FieldDescriptor)],
    ) -> SqliterResult<Table> {
        self.create_table_with(name, fields.iter().map(|(n, d)| (*n, d)), true)
    }

    fn create_table_with<'a>(
        &self,
        name: &str,
        fields: impl IntoIterator<Item = (&'a str, &'a FieldDescriptor)>,
        if_not_exists: bool,
    ) -> SqliterResult<Table> {
        let name = scrub(name);
        let definitions: Vec<String> = fields
            .into_iter()
            .map(|(column, descriptor)| descriptor.render(column))
            .collect();
        if name.is_empty() || definitions.is_empty() {
            return Err(SqliterError::InvalidDescriptor(format!(
                "table {name:?} needs a name and at least one field"
            )));
        }

        let sql = format!(
            "CREATE TABLE {}{} ({})",
            if if_not_exists { "IF NOT EXISTS " } else { "" },
            name,
            definitions.join(", ")
        );
        info!(table = %name, %sql, "creating table");
        self.conn.execute(&sql, [])?;
        self.table(&name)
    }

    /// Runs unmanaged SQL and returns the last inserted row id.
    pub fn raw(&self, sql: &str) -> SqliterResult<i64> {
        debug!(%sql, "executing raw sql");
        self.conn.execute_batch(sql)?;
        Ok(self.conn.last_insert_rowid())
    }

    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Runs `f` inside a transaction. Commits when `f` succeeds; otherwise the
    /// transaction is rolled back and the error from `f` is returned as is.
    pub(crate) fn with_transaction<T>(
        &self,
        f: impl FnOnce(&Transaction<'_>) -> SqliterResult<T>,
    ) -> SqliterResult<T> {
        let tx = self.conn.unchecked_transaction()?;
        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                debug!("transaction committed");
                Ok(value)
            }
            Err(error) => {
                warn!(%error, "rolling back transaction");
                // the engine may already have rolled back, e.g. ON CONFLICT ROLLBACK
                if !self.conn.is_autocommit() {
                    if let Err(rollback_error) = tx.rollback() {
                        warn!(error = %rollback_error, "rollback failed");
                    }
                }
                Err(error)
            }
        }
    }

    /// Executes a query and buffers every row before returning, so callers may
    /// issue nested queries on the same connection while consuming the rows.
    pub(crate) fn fetch_rows<P: Params>(&self, sql: &str, params: P) -> SqliterResult<Vec<RawRow>> {
        debug!(%sql, "fetching rows");
        let mut stmt = self.conn.prepare(sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query(params)?;

        let mut buffered = Vec::new();
        while let Some(row) = rows.next()? {
            let mut raw = Vec::with_capacity(names.len());
            for (index, name) in names.iter().enumerate() {
                raw.push((name.clone(), row.get::<_, SqlValue>(index)?));
            }
            buffered.push(raw);
        }
        Ok(buffered)
    }
}
