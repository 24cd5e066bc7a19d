use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Column data types recognized across backends. Each owns its mapping to a
/// GraphQL scalar and the filter surface it admits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum ColumnType {
    Int,
    BigInt,
    Text,
    Uuid,
    Bool,
    DateTime,
    Float,
    Decimal,
    Bytes,
}

impl ColumnType {
    /// GraphQL scalar name for the column type.
    pub fn graphql_type(&self) -> &'static str {
        match self {
            ColumnType::Int => "Int",
            ColumnType::BigInt => "Long",
            ColumnType::Text => "String",
            ColumnType::Uuid => "ID",
            ColumnType::Bool => "Boolean",
            ColumnType::DateTime => "DateTime",
            ColumnType::Float | ColumnType::Decimal => "Float",
            ColumnType::Bytes => "ByteArray",
        }
    }

    /// Filter input type for the column, if the type admits filtering.
    pub fn filter_input(&self) -> Option<&'static str> {
        match self {
            ColumnType::Int | ColumnType::BigInt => Some("IntFilterInput"),
            ColumnType::Text => Some("StringFilterInput"),
            ColumnType::Uuid => Some("IdFilterInput"),
            ColumnType::Bool => Some("BooleanFilterInput"),
            ColumnType::DateTime => Some("DateTimeFilterInput"),
            ColumnType::Float | ColumnType::Decimal => Some("FloatFilterInput"),
            ColumnType::Bytes => None,
        }
    }

    /// Whether ORDER BY and keyset cursors may use this column.
    pub fn admits_ordering(&self) -> bool {
        !matches!(self, ColumnType::Bytes)
    }

    /// Map a SQL type name (as reported by introspection) to a column type.
    pub fn from_sql_type(name: &str) -> ColumnType {
        let lowered = name.to_ascii_lowercase();
        match lowered.as_str() {
            "int" | "int4" | "integer" | "smallint" | "int2" | "tinyint" | "serial" => {
                ColumnType::Int
            }
            "bigint" | "int8" | "bigserial" => ColumnType::BigInt,
            "uuid" | "uniqueidentifier" => ColumnType::Uuid,
            "bit" | "bool" | "boolean" => ColumnType::Bool,
            "real" | "float" | "float4" | "float8" | "double precision" | "double" => {
                ColumnType::Float
            }
            "decimal" | "numeric" | "money" => ColumnType::Decimal,
            "date" | "time" | "datetime" | "datetime2" | "smalldatetime" | "timestamp"
            | "timestamptz" | "timestamp with time zone" | "timestamp without time zone"
            | "datetimeoffset" => ColumnType::DateTime,
            "bytea" | "binary" | "varbinary" | "blob" | "image" => ColumnType::Bytes,
            _ => ColumnType::Text,
        }
    }

    /// Map a GraphQL type name from a document schema file.
    pub fn from_graphql_name(name: &str) -> ColumnType {
        match name {
            "Int" => ColumnType::Int,
            "Long" => ColumnType::BigInt,
            "ID" => ColumnType::Uuid,
            "Boolean" => ColumnType::Bool,
            "Float" => ColumnType::Float,
            "DateTime" => ColumnType::DateTime,
            "ByteArray" => ColumnType::Bytes,
            _ => ColumnType::Text,
        }
    }
}

/// One column of a table, view, container or procedure result set.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ColumnDef {
    pub name: String,
    pub ty: ColumnType,
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
    /// Identity / serial columns; excluded from create inputs.
    #[serde(default)]
    pub autogenerated: bool,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: false,
            default: None,
            autogenerated: false,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn autogenerated(mut self) -> Self {
        self.autogenerated = true;
        self
    }
}

/// A foreign key edge discovered by introspection.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ForeignKey {
    pub columns: Vec<String>,
    pub ref_object: String,
    pub ref_columns: Vec<String>,
}

/// Discovered shape of the physical object behind an entity.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TableShape {
    pub columns: Vec<ColumnDef>,
    pub primary_key: Vec<String>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
    /// Stored procedure parameters; empty for tables and views.
    #[serde(default)]
    pub parameters: Vec<ColumnDef>,
}

impl TableShape {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Foreign keys on this object that reference `other_object`.
    pub fn foreign_keys_to(&self, other_object: &str) -> Vec<&ForeignKey> {
        self.foreign_keys
            .iter()
            .filter(|fk| fk.ref_object == other_object)
            .collect()
    }
}
