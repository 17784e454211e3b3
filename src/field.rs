//! Field descriptors: typed column declarations rendered into `CREATE TABLE` fragments.

use std::fmt;
use std::str::FromStr;

use crate::error::{SqliterError, SqliterResult};
use crate::types::{format_date, format_datetime, FieldType};
use crate::util::scrub;
use crate::value::Value;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ForeignKeyAction {
    #[default]
    NoAction,
    Cascade,
    SetNull,
    SetDefault,
    Restrict,
}

impl ForeignKeyAction {
    pub fn keyword(&self) -> &'static str {
        match self {
            ForeignKeyAction::NoAction => "NO ACTION",
            ForeignKeyAction::Cascade => "CASCADE",
            ForeignKeyAction::SetNull => "SET NULL",
            ForeignKeyAction::SetDefault => "SET DEFAULT",
            ForeignKeyAction::Restrict => "RESTRICT",
        }
    }
}

impl FromStr for ForeignKeyAction {
    type Err = SqliterError;

    /// Accepts both the SQL keywords (`SET NULL`) and their underscored form (`SET_NULL`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('_', " ").as_str() {
            "NO ACTION" => Ok(ForeignKeyAction::NoAction),
            "CASCADE" => Ok(ForeignKeyAction::Cascade),
            "SET NULL" => Ok(ForeignKeyAction::SetNull),
            "SET DEFAULT" => Ok(ForeignKeyAction::SetDefault),
            "RESTRICT" => Ok(ForeignKeyAction::Restrict),
            _ => Err(SqliterError::InvalidDescriptor(format!(
                "unknown on-delete action: {s}"
            ))),
        }
    }
}

impl fmt::Display for ForeignKeyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub table: String,
    pub column: String,
    pub on_delete: ForeignKeyAction,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    Literal(Value),
    /// `CURRENT_TIMESTAMP`, DATETIME columns only.
    CurrentTimestamp,
    /// `CURRENT_DATE`, DATE columns only.
    CurrentDate,
}

/// A validated column declaration.
///
/// Built through [`FieldDescriptor::builder`]; every descriptor that exists
/// has passed validation, so rendering cannot fail.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    field_type: FieldType,
    nullable: bool,
    default: Option<DefaultValue>,
    primary_key: bool,
    autoincrement: bool,
    unique: bool,
    foreign_key: Option<ForeignKey>,
}

impl FieldDescriptor {
    pub fn builder(field_type: FieldType) -> FieldDescriptorBuilder {
        FieldDescriptorBuilder::new(field_type)
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// Whether the column admits NULL. Primary keys never do.
    pub fn is_nullable(&self) -> bool {
        self.nullable && !self.primary_key
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn default_value(&self) -> Option<&DefaultValue> {
        self.default.as_ref()
    }

    pub fn foreign_key(&self) -> Option<&ForeignKey> {
        self.foreign_key.as_ref()
    }

    /// Renders the column-definition fragment for a column called `name`.
    pub fn render(&self, name: &str) -> String {
        let mut parts = vec![scrub(name), self.field_type.keyword().to_string()];

        if self.primary_key {
            parts.push("PRIMARY KEY".to_string());
            if self.autoincrement && self.field_type == FieldType::Integer {
                parts.push("AUTOINCREMENT".to_string());
            }
        }
        if self.unique {
            parts.push("UNIQUE".to_string());
        }
        if !self.nullable && !self.primary_key {
            parts.push("NOT NULL".to_string());
        }
        if let Some(fk) = &self.foreign_key {
            parts.push(format!(
                "REFERENCES {}({}) ON DELETE {}",
                fk.table, fk.column, fk.on_delete
            ));
        }
        if let Some(default) = &self.default {
            parts.push(format!("DEFAULT {}", render_default(default)));
        }

        parts.join(" ")
    }
}

/// Collects descriptor options; [`FieldDescriptorBuilder::build`] validates them.
#[derive(Debug, Clone)]
pub struct FieldDescriptorBuilder {
    field_type: FieldType,
    nullable: bool,
    default: Option<DefaultValue>,
    primary_key: bool,
    autoincrement: bool,
    unique: bool,
    references: Option<(String, String)>,
    on_delete: Option<String>,
}

impl FieldDescriptorBuilder {
    fn new(field_type: FieldType) -> Self {
        Self {
            field_type,
            nullable: true,
            default: None,
            primary_key: false,
            autoincrement: true,
            unique: false,
            references: None,
            on_delete: None,
        }
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn not_null(self) -> Self {
        self.nullable(false)
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Literal(value.into()));
        self
    }

    pub fn default_current_timestamp(mut self) -> Self {
        self.default = Some(DefaultValue::CurrentTimestamp);
        self
    }

    pub fn default_current_date(mut self) -> Self {
        self.default = Some(DefaultValue::CurrentDate);
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn autoincrement(mut self, autoincrement: bool) -> Self {
        self.autoincrement = autoincrement;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Declares a reference to `table(column)`. An on-delete action is required as well.
    pub fn references(mut self, table: &str, column: &str) -> Self {
        self.references = Some((table.to_string(), column.to_string()));
        self
    }

    /// Sets the on-delete action by name, e.g. `"CASCADE"` or `"SET_NULL"`.
    pub fn on_delete(mut self, action: &str) -> Self {
        self.on_delete = Some(action.to_string());
        self
    }

    pub fn on_delete_action(self, action: ForeignKeyAction) -> Self {
        self.on_delete(action.keyword())
    }

    pub fn build(self) -> SqliterResult<FieldDescriptor> {
        if let Some(default) = &self.default {
            validate_default(self.field_type, default)?;
        }

        let foreign_key = match (self.references, self.on_delete) {
            (None, None) => None,
            (Some((table, column)), Some(action)) => {
                let (table, column) = (scrub(&table), scrub(&column));
                if table.is_empty() || column.is_empty() {
                    return Err(SqliterError::InvalidDescriptor(
                        "foreign key target must name a table and a column".to_string(),
                    ));
                }
                Some(ForeignKey {
                    table,
                    column,
                    on_delete: action.parse()?,
                })
            }
            _ => {
                return Err(SqliterError::InvalidDescriptor(
                    "foreign key requires both a reference target and an on-delete action"
                        .to_string(),
                ))
            }
        };

        Ok(FieldDescriptor {
            field_type: self.field_type,
            nullable: self.nullable,
            default: self.default,
            primary_key: self.primary_key,
            autoincrement: self.autoincrement,
            unique: self.unique,
            foreign_key,
        })
    }
}

fn validate_default(field_type: FieldType, default: &DefaultValue) -> SqliterResult<()> {
    let mismatch = |found: &str| {
        Err(SqliterError::InvalidDescriptor(format!(
            "default of type {found} does not match field type {field_type}"
        )))
    };

    match default {
        DefaultValue::CurrentTimestamp if field_type != FieldType::DateTime => {
            mismatch("CURRENT_TIMESTAMP")
        }
        DefaultValue::CurrentDate if field_type != FieldType::Date => mismatch("CURRENT_DATE"),
        DefaultValue::CurrentTimestamp | DefaultValue::CurrentDate => Ok(()),
        DefaultValue::Literal(Value::Null) => Ok(()),
        DefaultValue::Literal(value) if !field_type.accepts(value) => mismatch(value.type_name()),
        DefaultValue::Literal(Value::Real(number)) if !number.is_finite() => Err(
            SqliterError::InvalidDescriptor("default must be a finite number".to_string()),
        ),
        DefaultValue::Literal(Value::Text(text)) if text.contains('\0') => Err(
            SqliterError::InvalidDescriptor("default text may not contain NUL".to_string()),
        ),
        DefaultValue::Literal(_) => Ok(()),
    }
}

/// Renders a validated default through a fixed literal grammar.
fn render_default(default: &DefaultValue) -> String {
    match default {
        DefaultValue::CurrentTimestamp => "CURRENT_TIMESTAMP".to_string(),
        DefaultValue::CurrentDate => "CURRENT_DATE".to_string(),
        DefaultValue::Literal(value) => render_literal(value),
    }
}

fn render_literal(value: &Value) -> String {
    match value {
        Value::Integer(number) => number.to_string(),
        Value::Real(number) => format!("{number:?}"),
        Value::Text(text) => quote(text),
        Value::Blob(bytes) => {
            let hex: String = bytes.iter().map(|byte| format!("{byte:02X}")).collect();
            format!("X'{hex}'")
        }
        Value::Boolean(flag) => i64::from(*flag).to_string(),
        Value::Date(date) => quote(&format_date(date)),
        Value::DateTime(datetime) => quote(&format_datetime(datetime)),
        Value::Null | Value::List(_) | Value::Entry(_) => "NULL".to_string(),
    }
}

fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}
