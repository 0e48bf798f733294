//! Purpose: Capability-set traits for reading rows and lists by field name or position.
//! Exports: `RowData`, `ListData`, `MapData`.
//! Role: Input contract for the row encoder and output contract of its accessors.
//! Invariants: The positional path is primary; the name path resolves once via `index_of`.
//! Invariants: Unimplemented reads fail with `Unsupported`, never with a default value.
use crate::core::error::{Error, ErrorKind};

fn not_implemented(what: &str, index: usize) -> Error {
    Error::new(ErrorKind::Unsupported)
        .with_message(format!("{what} reads are not implemented"))
        .with_column(index)
}

macro_rules! by_name {
    ($($named:ident => $positional:ident -> $ret:ty;)*) => {
        $(
            fn $named(&self, field: &str) -> Result<$ret, Error> {
                self.$positional(self.index_of(field)?)
            }
        )*
    };
}

pub trait ListData {
    fn items(&self) -> usize;

    fn is_null(&self, index: usize) -> Result<bool, Error>;

    fn read_bool(&self, index: usize) -> Result<bool, Error> {
        Err(not_implemented("bool", index))
    }

    fn read_byte(&self, index: usize) -> Result<i8, Error> {
        Err(not_implemented("byte", index))
    }

    fn read_short(&self, index: usize) -> Result<i16, Error> {
        Err(not_implemented("short", index))
    }

    fn read_int(&self, index: usize) -> Result<i32, Error> {
        Err(not_implemented("int", index))
    }

    fn read_long(&self, index: usize) -> Result<i64, Error> {
        Err(not_implemented("long", index))
    }

    fn read_float(&self, index: usize) -> Result<f32, Error> {
        Err(not_implemented("float", index))
    }

    fn read_double(&self, index: usize) -> Result<f64, Error> {
        Err(not_implemented("double", index))
    }

    fn read_int128(&self, index: usize) -> Result<i128, Error> {
        Err(not_implemented("int128", index))
    }

    fn read_string(&self, index: usize) -> Result<&str, Error> {
        Err(not_implemented("string", index))
    }
}

/// Placeholder for map values; no encoding exists for them.
pub trait MapData {
    fn items(&self) -> usize;
}

pub trait RowData {
    /// Resolve a field name to its positional index.
    fn index_of(&self, field: &str) -> Result<usize, Error>;

    fn is_null(&self, index: usize) -> Result<bool, Error>;

    fn read_bool(&self, index: usize) -> Result<bool, Error> {
        Err(not_implemented("bool", index))
    }

    fn read_byte(&self, index: usize) -> Result<i8, Error> {
        Err(not_implemented("byte", index))
    }

    fn read_short(&self, index: usize) -> Result<i16, Error> {
        Err(not_implemented("short", index))
    }

    fn read_int(&self, index: usize) -> Result<i32, Error> {
        Err(not_implemented("int", index))
    }

    fn read_long(&self, index: usize) -> Result<i64, Error> {
        Err(not_implemented("long", index))
    }

    fn read_float(&self, index: usize) -> Result<f32, Error> {
        Err(not_implemented("float", index))
    }

    fn read_double(&self, index: usize) -> Result<f64, Error> {
        Err(not_implemented("double", index))
    }

    fn read_int128(&self, index: usize) -> Result<i128, Error> {
        Err(not_implemented("int128", index))
    }

    fn read_string(&self, index: usize) -> Result<&str, Error> {
        Err(not_implemented("string", index))
    }

    fn read_list(&self, index: usize) -> Result<Box<dyn ListData + '_>, Error> {
        Err(not_implemented("list", index))
    }

    fn read_map(&self, index: usize) -> Result<Box<dyn MapData + '_>, Error> {
        Err(Error::new(ErrorKind::Unsupported)
            .with_message("map values are not supported")
            .with_column(index))
    }

    by_name! {
        is_null_by_name => is_null -> bool;
        read_bool_by_name => read_bool -> bool;
        read_byte_by_name => read_byte -> i8;
        read_short_by_name => read_short -> i16;
        read_int_by_name => read_int -> i32;
        read_long_by_name => read_long -> i64;
        read_float_by_name => read_float -> f32;
        read_double_by_name => read_double -> f64;
        read_int128_by_name => read_int128 -> i128;
        read_string_by_name => read_string -> &str;
        read_list_by_name => read_list -> Box<dyn ListData + '_>;
        read_map_by_name => read_map -> Box<dyn MapData + '_>;
    }
}
