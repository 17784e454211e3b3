//! Filter compilation and lazy result sets.
//!
//! A filter is an ordered list of `field[__operator]` keys with values. Each
//! key compiles to one SQL condition with its bound parameters; conditions
//! are joined with a single [`Combinator`]. Only identifiers coming from the
//! table schema are written into SQL text, and they are scrubbed first.

use std::fmt;
use std::str::FromStr;

use rusqlite::params_from_iter;
use tracing::debug;

use crate::database::RawRow;
use crate::entry::{Entry, Materializer};
use crate::error::{SqliterError, SqliterResult};
use crate::schema::{ColumnSchema, TableSchema};
use crate::table::Table;
use crate::types::FieldType;
use crate::util::{is_valid_field_name, scrub};
use crate::value::{Fields, Value};

/// Separates a field name from its operator in filter keys.
const OPERATOR_SEPARATOR: &str = "__";

/// Comparison operators accepted as `field__operator` suffixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    Gt,
    Lt,
    Gte,
    Lte,
    /// `LIKE` with the value used verbatim as the pattern.
    Like,
    /// Case-insensitive `LIKE`; the pattern is wrapped in `%`.
    ILike,
    /// Case-sensitive substring test.
    Contains,
    /// Case-insensitive substring test; wildcards in the value match literally.
    IContains,
    In,
}

impl FromStr for Operator {
    type Err = SqliterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "equals" => Ok(Operator::Equals),
            "gt" => Ok(Operator::Gt),
            "lt" => Ok(Operator::Lt),
            "gte" => Ok(Operator::Gte),
            "lte" => Ok(Operator::Lte),
            "like" => Ok(Operator::Like),
            "ilike" => Ok(Operator::ILike),
            "contains" => Ok(Operator::Contains),
            "icontains" => Ok(Operator::IContains),
            "in" => Ok(Operator::In),
            other => Err(SqliterError::UnknownOperation(other.to_string())),
        }
    }
}

impl Operator {
    /// Compiles `column <op> value` into a SQL fragment and its parameters.
    fn compile(self, schema: &TableSchema, column: &ColumnSchema, value: Value) -> SqliterResult<Condition> {
        let name = scrub(&column.name);
        // NULL only compares through equality
        let scalar = |value: Value| -> SqliterResult<Value> {
            let value = schema.conform(column, value)?;
            if value.is_null() {
                return Err(SqliterError::MismatchingTypes {
                    field: column.name.clone(),
                    expected: column.field_type,
                    found: value.type_name(),
                });
            }
            Ok(value)
        };

        let condition = match self {
            Operator::Equals => match schema.conform(column, value)? {
                Value::Null => Condition::new(format!("{name} IS NULL"), Vec::new()),
                value => Condition::new(format!("{name} = ?"), vec![value]),
            },
            Operator::Gt => Condition::new(format!("{name} > ?"), vec![scalar(value)?]),
            Operator::Lt => Condition::new(format!("{name} < ?"), vec![scalar(value)?]),
            Operator::Gte => Condition::new(format!("{name} >= ?"), vec![scalar(value)?]),
            Operator::Lte => Condition::new(format!("{name} <= ?"), vec![scalar(value)?]),
            Operator::Like => Condition::new(format!("{name} LIKE ?"), vec![scalar(value)?]),
            Operator::ILike => {
                require_textual(column)?;
                Condition::new(
                    format!("LOWER({name}) LIKE LOWER(?)"),
                    vec![wrap(&scalar(value)?, false)],
                )
            }
            Operator::Contains => {
                Condition::new(format!("instr({name}, ?) > 0"), vec![scalar(value)?])
            }
            Operator::IContains => {
                require_textual(column)?;
                Condition::new(
                    format!("LOWER({name}) LIKE LOWER(?) ESCAPE '\\'"),
                    vec![wrap(&scalar(value)?, true)],
                )
            }
            Operator::In => {
                let items = schema.conform_list(column, value)?;
                let placeholders = vec!["?"; items.len()].join(", ");
                Condition::new(format!("{name} IN ({placeholders})"), items)
            }
        };
        Ok(condition)
    }
}

/// Case-insensitive patterns are built from the value's text form, which only
/// matches what the engine stores for TEXT, DATE and DATETIME columns.
fn require_textual(column: &ColumnSchema) -> SqliterResult<()> {
    match column.field_type {
        FieldType::Text | FieldType::Date | FieldType::DateTime => Ok(()),
        other => Err(SqliterError::MismatchingTypes {
            field: column.name.clone(),
            expected: FieldType::Text,
            found: other.keyword(),
        }),
    }
}

/// Wraps a text value in `%` wildcards, optionally escaping wildcards it already contains.
fn wrap(value: &Value, escape: bool) -> Value {
    let text = match value {
        Value::Text(text) => text.clone(),
        other => other.to_string(),
    };
    let text = if escape {
        text.replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_")
    } else {
        text
    };
    Value::Text(format!("%{text}%"))
}

/// Boolean operator joining every condition of a filter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Combinator {
    #[default]
    And,
    Or,
}

impl Combinator {
    fn keyword(&self) -> &'static str {
        match self {
            Combinator::And => "AND",
            Combinator::Or => "OR",
        }
    }
}

impl FromStr for Combinator {
    type Err = SqliterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AND" => Ok(Combinator::And),
            "OR" => Ok(Combinator::Or),
            _ => Err(SqliterError::UnknownOperation(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
struct Condition {
    fragment: String,
    params: Vec<Value>,
}

impl Condition {
    fn new(fragment: String, params: Vec<Value>) -> Self {
        Self { fragment, params }
    }
}

/// A compiled WHERE clause.
#[derive(Debug, Clone, Default, PartialEq)]
struct WhereClause {
    fragments: Vec<String>,
    params: Vec<Value>,
    combinator: Combinator,
}

impl WhereClause {
    fn compile(
        schema: &TableSchema,
        combinator: Combinator,
        fields: Fields,
        allow_operators: bool,
    ) -> SqliterResult<Self> {
        let mut clause = WhereClause {
            combinator,
            ..Default::default()
        };

        for (key, value) in fields {
            let key = scrub(&key);
            if !is_valid_field_name(&key) {
                return Err(SqliterError::InvalidFieldName(key));
            }
            let (field, operator) = match key.rsplit_once(OPERATOR_SEPARATOR) {
                Some((field, operator)) if allow_operators => (field, operator.parse()?),
                _ => (key.as_str(), Operator::Equals),
            };
            let column = schema.resolve_field(field)?;
            let condition = operator.compile(schema, column, value)?;
            clause.fragments.push(condition.fragment);
            clause.params.extend(condition.params);
        }

        Ok(clause)
    }

    fn sql(&self) -> String {
        if self.fragments.is_empty() {
            return String::new();
        }
        let separator = format!(" {} ", self.combinator.keyword());
        format!(" WHERE {}", self.fragments.join(&separator))
    }
}

/// A lazy, restartable query over one table.
///
/// Nothing runs until the result set is iterated, counted, or used to delete
/// or update rows, and every such call re-executes the query against the
/// current state of the database.
#[derive(Debug, Clone)]
pub struct ResultSet {
    table: Table,
    filter: WhereClause,
    ordering: Vec<(String, SortOrder)>,
    limit: Option<u32>,
    offset: Option<u32>,
}

impl ResultSet {
    pub(crate) fn new(table: Table, combinator: Combinator, fields: Fields) -> SqliterResult<Self> {
        let filter = WhereClause::compile(table.schema(), combinator, fields, true)?;
        Ok(Self::with_filter(table, filter))
    }

    /// Equality-only lookup: keys are field names, never `field__operator`.
    pub(crate) fn exact(table: Table, fields: Fields) -> SqliterResult<Self> {
        let filter = WhereClause::compile(table.schema(), Combinator::And, fields, false)?;
        Ok(Self::with_filter(table, filter))
    }

    pub(crate) fn unfiltered(table: Table) -> Self {
        Self::with_filter(table, WhereClause::default())
    }

    fn with_filter(table: Table, filter: WhereClause) -> Self {
        Self {
            table,
            filter,
            ordering: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Sorts by the given fields; a leading `-` sorts that field descending.
    /// Replaces any previous ordering.
    pub fn order_by(mut self, fields: &[&str]) -> SqliterResult<Self> {
        let mut ordering = Vec::with_capacity(fields.len());
        for field in fields {
            let (field, order) = match field.strip_prefix('-') {
                Some(field) => (field, SortOrder::Descending),
                None => (*field, SortOrder::Ascending),
            };
            let column = self.table.schema().resolve_field(&scrub(field))?;
            ordering.push((column.name.clone(), order));
        }
        self.ordering = ordering;
        Ok(self)
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Runs the query and yields its entries one by one.
    ///
    /// Rows are buffered when the query runs; entries (and their foreign keys)
    /// are materialized as the iterator advances.
    pub fn iter(&self) -> SqliterResult<Entries> {
        let rows = self.fetch("*")?;
        Ok(Entries {
            rows: rows.into_iter(),
            materializer: Materializer::new(self.table.database().clone(), self.table.schema_rc()),
        })
    }

    pub fn all(&self) -> SqliterResult<Vec<Entry>> {
        self.iter()?.collect()
    }

    /// The first matching entry, if any.
    pub fn first(&self) -> SqliterResult<Option<Entry>> {
        self.clone().limit(1).iter()?.next().transpose()
    }

    pub fn count(&self) -> SqliterResult<usize> {
        let sql = format!("SELECT COUNT(*) FROM ({})", self.select_sql(&self.pk_column()));
        debug!(%sql, "counting rows");
        let count: i64 = self.table.database().connection().query_row(
            &sql,
            params_from_iter(self.filter.params.iter()),
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn exists(&self) -> SqliterResult<bool> {
        Ok(self.first()?.is_some())
    }

    /// Deletes every matched row; returns how many were removed.
    pub fn delete(&self) -> SqliterResult<usize> {
        let sql = format!("DELETE FROM {}{}", self.table_name(), self.target_sql());
        self.table.database().with_transaction(|tx| {
            debug!(%sql, "deleting rows");
            Ok(tx.execute(&sql, params_from_iter(self.filter.params.iter()))?)
        })
    }

    /// Sets `fields` on every matched row; returns how many were changed.
    pub fn update(&self, fields: Fields) -> SqliterResult<usize> {
        if fields.is_empty() {
            return Ok(0);
        }

        let schema = self.table.schema();
        let mut assignments = Vec::with_capacity(fields.len());
        let mut values = Vec::with_capacity(fields.len());
        for (key, value) in fields {
            let column = schema.resolve_field(&scrub(&key))?;
            values.push(schema.conform(column, value)?);
            assignments.push(format!("{} = ?", scrub(&column.name)));
        }

        let sql = format!(
            "UPDATE {} SET {}{}",
            self.table_name(),
            assignments.join(", "),
            self.target_sql()
        );
        self.table.database().with_transaction(|tx| {
            debug!(%sql, "updating rows");
            let params = values.iter().chain(self.filter.params.iter());
            Ok(tx.execute(&sql, params_from_iter(params))?)
        })
    }

    fn table_name(&self) -> String {
        scrub(self.table.name())
    }

    fn pk_column(&self) -> String {
        scrub(self.table.schema().primary_key())
    }

    fn fetch(&self, columns: &str) -> SqliterResult<Vec<RawRow>> {
        self.table
            .database()
            .fetch_rows(&self.select_sql(columns), params_from_iter(self.filter.params.iter()))
    }

    fn select_sql(&self, columns: &str) -> String {
        format!(
            "SELECT {columns} FROM {}{}{}{}",
            self.table_name(),
            self.filter.sql(),
            self.order_sql(),
            self.limit_sql()
        )
    }

    /// WHERE clause for DELETE and UPDATE. A limit or offset restricts the
    /// statement to the primary keys the equivalent SELECT would return.
    fn target_sql(&self) -> String {
        if self.limit.is_none() && self.offset.is_none() {
            return self.filter.sql();
        }
        let pk = self.pk_column();
        format!(" WHERE {pk} IN ({})", self.select_sql(&pk))
    }

    fn order_sql(&self) -> String {
        if self.ordering.is_empty() {
            return String::new();
        }
        let clauses: Vec<String> = self
            .ordering
            .iter()
            .map(|(column, order)| match order {
                SortOrder::Ascending => format!("{} ASC", scrub(column)),
                SortOrder::Descending => format!("{} DESC", scrub(column)),
            })
            .collect();
        format!(" ORDER BY {}", clauses.join(", "))
    }

    fn limit_sql(&self) -> String {
        match (self.limit, self.offset) {
            (None, None) => String::new(),
            (Some(limit), None) => format!(" LIMIT {limit}"),
            (None, Some(offset)) => format!(" LIMIT -1 OFFSET {offset}"),
            (Some(limit), Some(offset)) => format!(" LIMIT {limit} OFFSET {offset}"),
        }
    }
}

/// Iterator over the entries of one execution of a [`ResultSet`].
pub struct Entries {
    rows: std::vec::IntoIter<RawRow>,
    materializer: Materializer,
}

impl Iterator for Entries {
    type Item = SqliterResult<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.next()?;
        Some(self.materializer.materialize(row))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

impl fmt::Debug for Entries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entries")
            .field("remaining", &self.rows.len())
            .finish()
    }
}
