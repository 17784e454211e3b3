use serde::Deserialize;

use crate::error::SqliterResult;
use crate::field::FieldDescriptor;

/// Tables to create when a database is opened with a [`SqliteConfig`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    pub tables: Vec<TableDefinition>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(mut self, table: TableDefinition) -> Self {
        self.tables.push(table);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableDefinition {
    pub name: String,
    pub fields: Vec<(String, FieldDescriptor)>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, descriptor: FieldDescriptor) -> Self {
        self.fields.push((name.into(), descriptor));
        self
    }
}

/// SQLite database configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SqliteConfig {
    /// Path to the SQLite database file, or `:memory:`
    pub db_path: String,
    /// How long to wait on a locked database before failing
    #[serde(default)]
    pub busy_timeout_ms: Option<u64>,
    /// Tables created on open when missing. Not part of the serialized form.
    #[serde(skip)]
    pub schema: Schema,
}

impl SqliteConfig {
    /// Create a new SQLite config with path and schema
    pub fn new(db_path: impl Into<String>, schema: Schema) -> Self {
        Self {
            db_path: db_path.into(),
            busy_timeout_ms: None,
            schema,
        }
    }

    /// Parses the serializable part of a config from JSON; the schema starts empty.
    pub fn from_json(json: &str) -> SqliterResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_busy_timeout(mut self, millis: u64) -> Self {
        self.busy_timeout_ms = Some(millis);
        self
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }
}

#[cfg(test)]
mod test {

    use super::*;
    use crate::error::SqliterError;
    use crate::types::FieldType;

    #[test]
    fn test_should_parse_config_from_json() {
        let config =
            SqliteConfig::from_json(r#"{ "db_path": "pets.db", "busy_timeout_ms": 250 }"#).unwrap();
        assert_eq!(config.db_path, "pets.db");
        assert_eq!(config.busy_timeout_ms, Some(250));
        assert!(config.schema.tables.is_empty());

        let config = SqliteConfig::from_json(r#"{ "db_path": ":memory:" }"#).unwrap();
        assert_eq!(config.busy_timeout_ms, None);
    }

    #[test]
    fn test_should_reject_malformed_config() {
        let result = SqliteConfig::from_json(r#"{ "busy_timeout_ms": "soon" }"#);
        assert!(matches!(result, Err(SqliterError::Config(_))));
    }

    #[test]
    fn test_should_build_schema() {
        let id = FieldDescriptor::builder(FieldType::Integer)
            .primary_key()
            .build()
            .unwrap();
        let schema = Schema::new().add_table(TableDefinition::new("owners").with_field("id", id));
        let config = SqliteConfig::new(":memory:", Schema::new())
            .with_busy_timeout(100)
            .with_schema(schema);

        assert_eq!(config.schema.tables.len(), 1);
        assert_eq!(config.schema.tables[0].name, "owners");
        assert_eq!(config.schema.tables[0].fields[0].0, "id");
    }
}
