//! Purpose: Describe column kinds and the ordered schema rows are encoded against.
//! Exports: `Kind`, `ColumnType`, `Column`, `Schema`.
//! Role: Shared vocabulary for the row encoder, accessors, and typed stores.
//! Invariants: Column order is fixed once a `Schema` is built; names are unique.
//! Invariants: Name lookups resolve through a map built once in `Schema::new`.
use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;

use crate::core::error::{Error, ErrorKind};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Bool,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Int128,
    String,
}

impl Kind {
    /// Width in bytes of a non-null value, excluding the header byte.
    /// Strings use an 8-byte (offset, length) descriptor.
    pub fn width(self) -> usize {
        match self {
            Kind::Bool | Kind::Byte => 1,
            Kind::Short => 2,
            Kind::Int | Kind::Float => 4,
            Kind::Long | Kind::Double | Kind::String => 8,
            Kind::Int128 => 16,
        }
    }

    /// Code carried in the low nibble of a header byte.
    pub fn code(self) -> u8 {
        match self {
            Kind::Bool => 1,
            Kind::Byte => 2,
            Kind::Short => 3,
            Kind::Int => 4,
            Kind::Long => 5,
            Kind::Float => 6,
            Kind::Double => 7,
            Kind::Int128 => 8,
            Kind::String => 9,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Bool => "bool",
            Kind::Byte => "byte",
            Kind::Short => "short",
            Kind::Int => "int",
            Kind::Long => "long",
            Kind::Float => "float",
            Kind::Double => "double",
            Kind::Int128 => "int128",
            Kind::String => "string",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(from = "ColumnTypeRepr")]
pub enum ColumnType {
    Scalar(Kind),
    List(Kind),
    Map(Kind, Kind),
}

impl ColumnType {
    pub fn scalar(&self) -> Option<Kind> {
        match self {
            ColumnType::Scalar(kind) => Some(*kind),
            _ => None,
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Scalar(kind) => write!(f, "{kind}"),
            ColumnType::List(kind) => write!(f, "list<{kind}>"),
            ColumnType::Map(key, value) => write!(f, "map<{key}, {value}>"),
        }
    }
}

// JSON accepts `"int"`, `{"list": "string"}` and `{"map": ["string", "int"]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ColumnTypeRepr {
    Scalar(Kind),
    List { list: Kind },
    Map { map: (Kind, Kind) },
}

impl From<ColumnTypeRepr> for ColumnType {
    fn from(repr: ColumnTypeRepr) -> Self {
        match repr {
            ColumnTypeRepr::Scalar(kind) => ColumnType::Scalar(kind),
            ColumnTypeRepr::List { list } => ColumnType::List(list),
            ColumnTypeRepr::Map { map } => ColumnType::Map(map.0, map.1),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ColumnType,
    #[serde(default = "nullable_by_default")]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub bloom_filter: bool,
    /// String columns only: equal values share one stored copy.
    #[serde(default)]
    pub dictionary: bool,
}

fn nullable_by_default() -> bool {
    true
}

impl Column {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: true,
            default: None,
            bloom_filter: false,
            dictionary: false,
        }
    }

    pub fn scalar(name: impl Into<String>, kind: Kind) -> Self {
        Self::new(name, ColumnType::Scalar(kind))
    }

    pub fn list(name: impl Into<String>, item: Kind) -> Self {
        Self::new(name, ColumnType::List(item))
    }

    pub fn with_nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn with_default(mut self, literal: impl Into<String>) -> Self {
        self.default = Some(literal.into());
        self
    }

    pub fn with_bloom_filter(mut self, enabled: bool) -> Self {
        self.bloom_filter = enabled;
        self
    }

    pub fn with_dictionary(mut self, enabled: bool) -> Self {
        self.dictionary = enabled;
        self
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(try_from = "SchemaRepr")]
pub struct Schema {
    columns: Vec<Column>,
    fields: HashMap<String, usize>,
}

#[derive(Deserialize)]
struct SchemaRepr {
    columns: Vec<Column>,
}

impl TryFrom<SchemaRepr> for Schema {
    type Error = Error;

    fn try_from(repr: SchemaRepr) -> Result<Self, Self::Error> {
        Schema::new(repr.columns)
    }
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Result<Self, Error> {
        let mut fields = HashMap::with_capacity(columns.len());
        for (index, column) in columns.iter().enumerate() {
            if column.name.is_empty() {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("column name is empty")
                    .with_column(index));
            }
            if fields.insert(column.name.clone(), index).is_some() {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(format!("duplicate column name `{}`", column.name))
                    .with_column(index));
            }
        }
        Ok(Self { columns, fields })
    }

    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("invalid schema json")
                .with_hint("Expected {\"columns\": [{\"name\": \"id\", \"type\": \"int\"}, ...]}.")
                .with_source(err)
        })
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, index: usize) -> Option<&Column> {
        self.columns.get(index)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.get(name).copied()
    }

    /// Resolve a field name, failing on unknown names.
    pub fn field(&self, name: &str) -> Result<usize, Error> {
        self.index_of(name).ok_or_else(|| {
            Error::new(ErrorKind::OutOfRange).with_message(format!("unknown field `{name}`"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{Column, ColumnType, Kind, Schema};
    use crate::core::error::ErrorKind;

    #[test]
    fn schema_resolves_names_once() {
        let schema = Schema::new(vec![
            Column::scalar("id", Kind::Int),
            Column::scalar("event", Kind::String),
            Column::list("items", Kind::String),
        ])
        .expect("schema");
        assert_eq!(schema.len(), 3);
        assert_eq!(schema.index_of("items"), Some(2));
        assert_eq!(schema.field("nope").expect_err("unknown").kind(), ErrorKind::OutOfRange);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = Schema::new(vec![
            Column::scalar("id", Kind::Int),
            Column::scalar("id", Kind::Long),
        ])
        .expect_err("duplicate");
        assert_eq!(err.kind(), ErrorKind::Usage);
        assert_eq!(err.column(), Some(1));
    }

    #[test]
    fn schema_parses_from_json() {
        let schema = Schema::from_json(
            r#"{"columns": [
                {"name": "id", "type": "int", "nullable": false, "bloom_filter": true},
                {"name": "items", "type": {"list": "string"}},
                {"name": "tags", "type": {"map": ["string", "int"]}},
                {"name": "flag", "type": "bool", "default": "true"},
                {"name": "event", "type": "string", "dictionary": true}
            ]}"#,
        )
        .expect("schema");
        let id = schema.column(0).expect("id");
        assert_eq!(id.ty, ColumnType::Scalar(Kind::Int));
        assert!(!id.nullable);
        assert!(id.bloom_filter);
        assert_eq!(schema.column(1).expect("items").ty, ColumnType::List(Kind::String));
        assert_eq!(
            schema.column(2).expect("tags").ty,
            ColumnType::Map(Kind::String, Kind::Int)
        );
        assert_eq!(schema.column(3).expect("flag").default.as_deref(), Some("true"));
        assert!(!id.dictionary);
        assert!(schema.column(4).expect("event").dictionary);
    }

    #[test]
    fn widths_match_native_sizes() {
        assert_eq!(Kind::Short.width(), 2);
        assert_eq!(Kind::Int128.width(), 16);
        assert_eq!(Kind::String.width(), 8);
        assert_eq!(ColumnType::List(Kind::Int).to_string(), "list<int>");
    }
}
