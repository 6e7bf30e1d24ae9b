//! Naming conventions shared by the registry and the SQL driver.
//!
//! # Responsibility
//! - Derive repository attribute names from entity type names.
//! - Derive relational table names from entity type names.
//!
//! # Invariants
//! - `table_name` is a pure function of the entity name, so schema files and
//!   repository SQL agree on every table.

use once_cell::sync::Lazy;
use regex::Regex;

static CAMEL_WORD_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(.)([A-Z][a-z]+)").expect("static regex must compile"));
static CAMEL_LOWER_UPPER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("static regex must compile"));
static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex must compile"));

/// Converts a `CamelCase` type name into `snake_case`.
///
/// Runs of capitals are kept together (`HTTPRequest` -> `http_request`).
pub fn camel_to_snake(value: &str) -> String {
    let first = CAMEL_WORD_BOUNDARY.replace_all(value, "${1}_${2}");
    CAMEL_LOWER_UPPER
        .replace_all(&first, "${1}_${2}")
        .to_lowercase()
}

/// Returns whether `value` can be used as a repository attribute name.
pub fn is_identifier(value: &str) -> bool {
    IDENTIFIER.is_match(value)
}

/// Returns the table name for one entity type.
///
/// The snake-cased name is pluralized with `es` when it already ends in a
/// sibilant (`s`, `x`, `z`, `ch`, `sh`) and with `s` otherwise.
pub fn table_name(entity: &str) -> String {
    let base = camel_to_snake(entity);
    if ["s", "x", "z", "ch", "sh"]
        .iter()
        .any(|suffix| base.ends_with(suffix))
    {
        format!("{base}es")
    } else {
        format!("{base}s")
    }
}

/// Returns the name of the join table linking two entity tables.
pub fn join_table_name(left: &str, right: &str) -> String {
    format!("{}_{}", table_name(left), table_name(right))
}
