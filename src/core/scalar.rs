// Closed value enum over the fixed-width kinds, read through the capability traits.
use std::hash::{Hash, Hasher};

use crate::core::error::{Error, ErrorKind};
use crate::core::kind::Kind;
use crate::core::surface::{ListData, RowData};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Int128(i128),
}

impl Scalar {
    pub fn kind(&self) -> Option<Kind> {
        match self {
            Scalar::Null => None,
            Scalar::Bool(_) => Some(Kind::Bool),
            Scalar::Byte(_) => Some(Kind::Byte),
            Scalar::Short(_) => Some(Kind::Short),
            Scalar::Int(_) => Some(Kind::Int),
            Scalar::Long(_) => Some(Kind::Long),
            Scalar::Float(_) => Some(Kind::Float),
            Scalar::Double(_) => Some(Kind::Double),
            Scalar::Int128(_) => Some(Kind::Int128),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    /// Equality that agrees with `Hash`: floats compare by bit pattern.
    pub fn bit_eq(&self, other: &Scalar) -> bool {
        match (self, other) {
            (Scalar::Float(a), Scalar::Float(b)) => a.to_bits() == b.to_bits(),
            (Scalar::Double(a), Scalar::Double(b)) => a.to_bits() == b.to_bits(),
            _ => self == other,
        }
    }

    pub fn read(row: &dyn RowData, index: usize, kind: Kind) -> Result<Self, Error> {
        if row.is_null(index)? {
            return Ok(Scalar::Null);
        }
        Ok(match kind {
            Kind::Bool => Scalar::Bool(row.read_bool(index)?),
            Kind::Byte => Scalar::Byte(row.read_byte(index)?),
            Kind::Short => Scalar::Short(row.read_short(index)?),
            Kind::Int => Scalar::Int(row.read_int(index)?),
            Kind::Long => Scalar::Long(row.read_long(index)?),
            Kind::Float => Scalar::Float(row.read_float(index)?),
            Kind::Double => Scalar::Double(row.read_double(index)?),
            Kind::Int128 => Scalar::Int128(row.read_int128(index)?),
            Kind::String => return Err(not_scalar(index)),
        })
    }

    pub fn read_item(list: &dyn ListData, index: usize, kind: Kind) -> Result<Self, Error> {
        if list.is_null(index)? {
            return Ok(Scalar::Null);
        }
        Ok(match kind {
            Kind::Bool => Scalar::Bool(list.read_bool(index)?),
            Kind::Byte => Scalar::Byte(list.read_byte(index)?),
            Kind::Short => Scalar::Short(list.read_short(index)?),
            Kind::Int => Scalar::Int(list.read_int(index)?),
            Kind::Long => Scalar::Long(list.read_long(index)?),
            Kind::Float => Scalar::Float(list.read_float(index)?),
            Kind::Double => Scalar::Double(list.read_double(index)?),
            Kind::Int128 => Scalar::Int128(list.read_int128(index)?),
            Kind::String => return Err(not_scalar(index)),
        })
    }
}

fn not_scalar(index: usize) -> Error {
    Error::new(ErrorKind::TypeMismatch)
        .with_message("string values are not scalars")
        .with_column(index)
}

// Floats hash by bit pattern so the hash agrees with bitwise slot equality.
impl Hash for Scalar {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Scalar::Null => {}
            Scalar::Bool(value) => value.hash(state),
            Scalar::Byte(value) => value.hash(state),
            Scalar::Short(value) => value.hash(state),
            Scalar::Int(value) => value.hash(state),
            Scalar::Long(value) => value.hash(state),
            Scalar::Float(value) => value.to_bits().hash(state),
            Scalar::Double(value) => value.to_bits().hash(state),
            Scalar::Int128(value) => value.hash(state),
        }
    }
}
