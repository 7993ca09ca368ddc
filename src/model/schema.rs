//! Column schema and the declared-type vocabulary (spec.md §3, §4.6).

use serde::{Deserialize, Serialize};

/// Ordered column list for a db_input/db_output node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataModel {
    pub columns: Vec<Column>,
}

impl DataModel {
    pub fn key_columns<'a>(&'a self, keys: &'a [String]) -> impl Iterator<Item = &'a Column> {
        self.columns.iter().filter(move |c| keys.iter().any(|k| k == &c.name))
    }

    pub fn non_key_columns<'a>(&'a self, keys: &'a [String]) -> impl Iterator<Item = &'a Column> {
        self.columns.iter().filter(move |c| !keys.iter().any(|k| k == &c.name))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub declared_type: DeclaredType,
    pub nullable: bool,
}

/// The declared-type families from spec.md §4.6, left column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclaredType {
    Int,
    Smallint,
    Bigint,
    Serial,
    Float,
    Decimal,
    Numeric,
    Money,
    Boolean,
    Bit,
    Varchar,
    Text,
    Char,
    Uuid,
    Json,
    Xml,
    Time,
    Timestamp,
    Timestamptz,
    Date,
    Bytea,
    Unknown,
}

/// The emitted scalar type family (spec.md §4.6, middle/right columns).
/// Go-native names: these are the type names the emitter writes into
/// generated struct field declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    Int64,
    Float64,
    Bool,
    String,
    Time,
    Bytes,
}

impl ScalarType {
    /// Go type name for a non-nullable field.
    pub fn go_type(self) -> &'static str {
        match self {
            ScalarType::Int64 => "int64",
            ScalarType::Float64 => "float64",
            ScalarType::Bool => "bool",
            ScalarType::String => "string",
            ScalarType::Time => "time.Time",
            ScalarType::Bytes => "[]byte",
        }
    }

    /// Go type name for a nullable field, using the runtime lib's
    /// `sql.Null*` wrappers (bytea is nil-distinguished, not wrapped).
    pub fn go_nullable_type(self) -> &'static str {
        match self {
            ScalarType::Int64 => "sql.NullInt64",
            ScalarType::Float64 => "sql.NullFloat64",
            ScalarType::Bool => "sql.NullBool",
            ScalarType::String => "sql.NullString",
            ScalarType::Time => "sql.NullTime",
            ScalarType::Bytes => "[]byte",
        }
    }

    /// The zero value literal for this scalar, used when a union/join
    /// side has no corresponding field (spec.md §4.3).
    pub fn go_zero_value(self) -> &'static str {
        match self {
            ScalarType::Int64 => "0",
            ScalarType::Float64 => "0",
            ScalarType::Bool => "false",
            ScalarType::String => "\"\"",
            ScalarType::Time => "time.Time{}",
            ScalarType::Bytes => "nil",
        }
    }
}

impl DeclaredType {
    /// Maps a declared DB type family to the emitted scalar type
    /// (spec.md §4.6). Unknown types fall back to string.
    pub fn scalar_type(self) -> ScalarType {
        use DeclaredType::*;
        match self {
            Int | Smallint | Bigint | Serial => ScalarType::Int64,
            Float | Decimal | Numeric | Money => ScalarType::Float64,
            Boolean | Bit => ScalarType::Bool,
            Varchar | Text | Char | Uuid | Json | Xml => ScalarType::String,
            Time | Timestamp | Timestamptz | Date => ScalarType::Time,
            Bytea => ScalarType::Bytes,
            Unknown => ScalarType::String,
        }
    }
}

/// Converts a snake_case (or arbitrary) column/identifier name to
/// PascalCase for a Go struct field (spec.md §4.6): snake_case segments
/// map to ASCII capitalizations.
pub fn to_pascal_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut capitalize_next = true;
    for ch in name.chars() {
        if ch == '_' || ch == '-' || ch == ' ' {
            capitalize_next = true;
            continue;
        }
        if capitalize_next {
            out.extend(ch.to_uppercase());
            capitalize_next = false;
        } else {
            out.push(ch);
        }
    }
    if out.is_empty() {
        out.push('X');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pascal_case_converts_snake_case() {
        assert_eq!(to_pascal_case("total_amount"), "TotalAmount");
        assert_eq!(to_pascal_case("id"), "Id");
        assert_eq!(to_pascal_case("customer_order_id"), "CustomerOrderId");
    }

    #[test]
    fn pascal_case_handles_degenerate_input() {
        assert_eq!(to_pascal_case(""), "X");
        assert_eq!(to_pascal_case("___"), "X");
    }

    #[test]
    fn scalar_type_mapping_matches_table() {
        assert_eq!(DeclaredType::Bigint.scalar_type(), ScalarType::Int64);
        assert_eq!(DeclaredType::Numeric.scalar_type(), ScalarType::Float64);
        assert_eq!(DeclaredType::Bit.scalar_type(), ScalarType::Bool);
        assert_eq!(DeclaredType::Uuid.scalar_type(), ScalarType::String);
        assert_eq!(DeclaredType::Timestamptz.scalar_type(), ScalarType::Time);
        assert_eq!(DeclaredType::Bytea.scalar_type(), ScalarType::Bytes);
        assert_eq!(DeclaredType::Unknown.scalar_type(), ScalarType::String);
    }

    #[test]
    fn bytea_nullable_type_is_nil_distinguished_not_wrapped() {
        assert_eq!(ScalarType::Bytes.go_nullable_type(), "[]byte");
    }
}
