//! Identifier helpers shared by the SQL builders.

/// Prefix reserved for internal state. Columns and fields may not start with it.
pub const RESERVED_PREFIX: &str = "__";

/// Alias accepted anywhere a field name is expected, resolved to the table's primary key.
pub const PK_ALIAS: &str = "pk";

/// Strips everything but alphanumerics and `_` from an identifier.
///
/// Only identifiers ever go through here; values are always bound as parameters.
pub fn scrub(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect()
}

/// Returns whether `name` may be used as a column or field name.
pub fn is_valid_field_name(name: &str) -> bool {
    !name.starts_with(RESERVED_PREFIX)
}
