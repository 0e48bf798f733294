//! Purpose: Adapt JSON objects to the row read traits and render accessors back to JSON.
//! Exports: `JsonRow`, `JsonList`, `row_to_json`.
//! Role: Input/output edge for the CLI and for tests that build rows from literals.
//! Invariants: Missing keys and JSON null read as null; an empty array is a non-null list.
//! Invariants: Keys outside the schema are rejected rather than dropped.
//! Invariants: int128 values accept JSON integers or decimal strings and render as strings.
use serde_json::{Map, Number, Value};

use crate::core::error::{Error, ErrorKind};
use crate::core::kind::{ColumnType, Kind, Schema};
use crate::core::surface::{ListData, RowData};

pub struct JsonRow<'s> {
    schema: &'s Schema,
    values: &'s Map<String, Value>,
}

impl<'s> JsonRow<'s> {
    pub fn new(schema: &'s Schema, value: &'s Value) -> Result<Self, Error> {
        let values = value.as_object().ok_or_else(|| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("row must be a JSON object, found {}", type_name(value)))
        })?;
        if let Some(key) = values.keys().find(|key| schema.index_of(key).is_none()) {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("unknown column `{key}` in row"))
                .with_hint("Row keys must match schema column names."));
        }
        Ok(Self { schema, values })
    }

    fn value(&self, index: usize) -> Result<&'s Value, Error> {
        let column = self.schema.column(index).ok_or_else(|| {
            Error::new(ErrorKind::OutOfRange)
                .with_message("column index out of range")
                .with_column(index)
        })?;
        Ok(self.values.get(&column.name).unwrap_or(&Value::Null))
    }
}

impl RowData for JsonRow<'_> {
    fn index_of(&self, field: &str) -> Result<usize, Error> {
        self.schema.field(field)
    }

    fn is_null(&self, index: usize) -> Result<bool, Error> {
        Ok(self.value(index)?.is_null())
    }

    fn read_bool(&self, index: usize) -> Result<bool, Error> {
        as_bool(self.value(index)?, index)
    }

    fn read_byte(&self, index: usize) -> Result<i8, Error> {
        as_integer(self.value(index)?, index, Kind::Byte)
    }

    fn read_short(&self, index: usize) -> Result<i16, Error> {
        as_integer(self.value(index)?, index, Kind::Short)
    }

    fn read_int(&self, index: usize) -> Result<i32, Error> {
        as_integer(self.value(index)?, index, Kind::Int)
    }

    fn read_long(&self, index: usize) -> Result<i64, Error> {
        as_integer(self.value(index)?, index, Kind::Long)
    }

    fn read_float(&self, index: usize) -> Result<f32, Error> {
        as_float(self.value(index)?, index)
    }

    fn read_double(&self, index: usize) -> Result<f64, Error> {
        as_double(self.value(index)?, index, Kind::Double)
    }

    fn read_int128(&self, index: usize) -> Result<i128, Error> {
        as_int128(self.value(index)?, index)
    }

    fn read_string(&self, index: usize) -> Result<&str, Error> {
        as_str(self.value(index)?, index)
    }

    fn read_list(&self, index: usize) -> Result<Box<dyn ListData + '_>, Error> {
        let value = self.value(index)?;
        let items = value
            .as_array()
            .ok_or_else(|| mismatch(value, index, "list"))?;
        Ok(Box::new(JsonList { items }))
    }
}

pub struct JsonList<'s> {
    items: &'s [Value],
}

impl<'s> JsonList<'s> {
    pub fn new(items: &'s [Value]) -> Self {
        Self { items }
    }

    fn item(&self, index: usize) -> Result<&'s Value, Error> {
        self.items.get(index).ok_or_else(|| {
            Error::new(ErrorKind::OutOfRange)
                .with_message(format!("list index out of range ({} items)", self.items.len()))
                .with_offset(index)
        })
    }
}

impl ListData for JsonList<'_> {
    fn items(&self) -> usize {
        self.items.len()
    }

    fn is_null(&self, index: usize) -> Result<bool, Error> {
        Ok(self.item(index)?.is_null())
    }

    fn read_bool(&self, index: usize) -> Result<bool, Error> {
        as_bool(self.item(index)?, index)
    }

    fn read_byte(&self, index: usize) -> Result<i8, Error> {
        as_integer(self.item(index)?, index, Kind::Byte)
    }

    fn read_short(&self, index: usize) -> Result<i16, Error> {
        as_integer(self.item(index)?, index, Kind::Short)
    }

    fn read_int(&self, index: usize) -> Result<i32, Error> {
        as_integer(self.item(index)?, index, Kind::Int)
    }

    fn read_long(&self, index: usize) -> Result<i64, Error> {
        as_integer(self.item(index)?, index, Kind::Long)
    }

    fn read_float(&self, index: usize) -> Result<f32, Error> {
        as_float(self.item(index)?, index)
    }

    fn read_double(&self, index: usize) -> Result<f64, Error> {
        as_double(self.item(index)?, index, Kind::Double)
    }

    fn read_int128(&self, index: usize) -> Result<i128, Error> {
        as_int128(self.item(index)?, index)
    }

    fn read_string(&self, index: usize) -> Result<&str, Error> {
        as_str(self.item(index)?, index)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn mismatch(value: &Value, index: usize, expected: impl std::fmt::Display) -> Error {
    Error::new(ErrorKind::TypeMismatch)
        .with_message(format!("expected {expected}, found {}", type_name(value)))
        .with_column(index)
}

fn as_bool(value: &Value, index: usize) -> Result<bool, Error> {
    value.as_bool().ok_or_else(|| mismatch(value, index, Kind::Bool))
}

fn as_integer<T: TryFrom<i64>>(value: &Value, index: usize, kind: Kind) -> Result<T, Error> {
    value
        .as_i64()
        .and_then(|number| T::try_from(number).ok())
        .ok_or_else(|| mismatch(value, index, kind))
}

fn as_double(value: &Value, index: usize, kind: Kind) -> Result<f64, Error> {
    value.as_f64().ok_or_else(|| mismatch(value, index, kind))
}

// Finite doubles beyond the f32 range would otherwise narrow to infinity.
fn as_float(value: &Value, index: usize) -> Result<f32, Error> {
    let wide = as_double(value, index, Kind::Float)?;
    let narrow = wide as f32;
    if wide.is_finite() && !narrow.is_finite() {
        return Err(Error::new(ErrorKind::TypeMismatch)
            .with_message(format!("{wide} is outside the float range"))
            .with_column(index));
    }
    Ok(narrow)
}

fn as_int128(value: &Value, index: usize) -> Result<i128, Error> {
    let parsed = match value {
        Value::Number(number) => number
            .as_i64()
            .map(i128::from)
            .or_else(|| number.as_u64().map(i128::from)),
        Value::String(text) => text.parse::<i128>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| mismatch(value, index, Kind::Int128))
}

fn as_str(value: &Value, index: usize) -> Result<&str, Error> {
    value.as_str().ok_or_else(|| mismatch(value, index, Kind::String))
}

/// Render every column of a row as a JSON object keyed by column name.
pub fn row_to_json(row: &dyn RowData, schema: &Schema) -> Result<Value, Error> {
    let mut out = Map::new();
    for (index, column) in schema.columns().iter().enumerate() {
        let value = if row.is_null(index)? {
            Value::Null
        } else {
            match column.ty {
                ColumnType::Scalar(kind) => scalar_to_json(row, index, kind)?,
                ColumnType::List(kind) => {
                    let list = row.read_list(index)?;
                    let mut items = Vec::with_capacity(list.items());
                    for item in 0..list.items() {
                        items.push(item_to_json(list.as_ref(), item, kind)?);
                    }
                    Value::Array(items)
                }
                ColumnType::Map(..) => {
                    row.read_map(index)?;
                    Value::Null
                }
            }
        };
        out.insert(column.name.clone(), value);
    }
    Ok(Value::Object(out))
}

fn scalar_to_json(row: &dyn RowData, index: usize, kind: Kind) -> Result<Value, Error> {
    Ok(match kind {
        Kind::Bool => Value::Bool(row.read_bool(index)?),
        Kind::Byte => Value::from(row.read_byte(index)?),
        Kind::Short => Value::from(row.read_short(index)?),
        Kind::Int => Value::from(row.read_int(index)?),
        Kind::Long => Value::from(row.read_long(index)?),
        Kind::Float => float(f64::from(row.read_float(index)?)),
        Kind::Double => float(row.read_double(index)?),
        Kind::Int128 => Value::String(row.read_int128(index)?.to_string()),
        Kind::String => Value::String(row.read_string(index)?.to_owned()),
    })
}

fn item_to_json(list: &dyn ListData, index: usize, kind: Kind) -> Result<Value, Error> {
    if list.is_null(index)? {
        return Ok(Value::Null);
    }
    Ok(match kind {
        Kind::Bool => Value::Bool(list.read_bool(index)?),
        Kind::Byte => Value::from(list.read_byte(index)?),
        Kind::Short => Value::from(list.read_short(index)?),
        Kind::Int => Value::from(list.read_int(index)?),
        Kind::Long => Value::from(list.read_long(index)?),
        Kind::Float => float(f64::from(list.read_float(index)?)),
        Kind::Double => float(list.read_double(index)?),
        Kind::Int128 => Value::String(list.read_int128(index)?.to_string()),
        Kind::String => Value::String(list.read_string(index)?.to_owned()),
    })
}

// Non-finite floats have no JSON form.
fn float(value: f64) -> Value {
    Number::from_f64(value).map(Value::Number).unwrap_or(Value::Null)
}
