//! Typed, schema-driven ORM layer over SQLite for the Runar ecosystem.
//!
//! # Intention
//!
//! - Let callers declare tables with typed [`FieldDescriptor`]s, then create,
//!   fetch, filter, update and delete rows as [`Entry`] values instead of raw SQL.
//! - Derive everything else (column types, primary key, foreign keys) from the
//!   live database schema at runtime.
//!
//! # Architectural Boundaries
//!
//! - SQLite (through `rusqlite`) does storage, indexing, transactions and
//!   foreign-key enforcement. This crate only builds parameterized statements,
//!   materializes rows and validates writes.
//! - One [`Database`] is one connection used from one thread. [`Table`],
//!   [`Entry`] and [`ResultSet`] share it and are not `Send`.
//!
//! # Example
//!
//! ```
//! use rust_sqliter::{Database, FieldDescriptor, FieldType, Fields, Value};
//!
//! # fn main() -> rust_sqliter::SqliterResult<()> {
//! let db = Database::open_in_memory()?;
//! let owners = db.create_table(
//!     "owners",
//!     &[
//!         ("id", FieldDescriptor::builder(FieldType::Integer).primary_key().build()?),
//!         ("name", FieldDescriptor::builder(FieldType::Text).not_null().build()?),
//!     ],
//! )?;
//!
//! let frank = owners.create(Fields::new().with_value("name", "Frank"))?;
//! assert_eq!(frank.get("id")?, &Value::Integer(1));
//!
//! let found = owners
//!     .filter(Fields::new().with_value("name__icontains", "ran"))?
//!     .first()?;
//! assert_eq!(found, Some(frank));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod database;
pub mod entry;
pub mod error;
pub mod field;
pub mod query;
pub mod schema;
pub mod table;
pub mod types;
pub mod util;
pub mod value;

pub use config::{Schema, SqliteConfig, TableDefinition};
pub use database::Database;
pub use entry::Entry;
pub use error::{SqliterError, SqliterResult};
pub use field::{DefaultValue, FieldDescriptor, FieldDescriptorBuilder, ForeignKey, ForeignKeyAction};
pub use query::{Combinator, Entries, Operator, ResultSet, SortOrder};
pub use schema::{ColumnSchema, ForeignKeySchema, TableSchema};
pub use table::Table;
pub use types::FieldType;
pub use value::{Fields, Value};
