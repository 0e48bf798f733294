//! Purpose: Zero-copy typed reads over rows and lists held by a `FlatBuffer`.
//! Exports: `RowAccessor`, `ListAccessor`.
//! Role: Output side of the row encoder; both accessors also implement the read traits.
//! Invariants: Reads check index range, then kind, then nullness, in that order.
//! Invariants: Strings borrow the encoder's data region and are validated as UTF-8.
use std::borrow::Cow;

use crate::core::error::{Error, ErrorKind};
use crate::core::flat::{ColumnProps, Encoder, FlatBuffer, RowProps};
use crate::core::format;
use crate::core::kind::Kind;
use crate::core::paged::{Buffer, NativeType};
use crate::core::surface::{ListData, MapData, RowData};

macro_rules! fixed_reads {
    ($($name:ident -> $ty:ty => $kind:expr;)*) => {
        $(
            pub fn $name(&self, index: usize) -> Result<$ty, Error> {
                self.fixed::<$ty>(index, $kind)
            }
        )*
    };
}

macro_rules! delegate_reads {
    ($($name:ident -> $ty:ty;)*) => {
        $(
            fn $name(&self, index: usize) -> Result<$ty, Error> {
                Self::$name(self, index)
            }
        )*
    };
}

/// Read view of one encoded row.
///
/// Built by `FlatBuffer::row` (borrowed metadata) or `FlatBuffer::crow` (owned copy).
#[derive(Clone, Debug)]
pub struct RowAccessor<'f> {
    flat: &'f FlatBuffer<'f>,
    row: usize,
    props: Cow<'f, RowProps>,
}

impl<'f> RowAccessor<'f> {
    pub(crate) fn new(flat: &'f FlatBuffer<'f>, row: usize, props: Cow<'f, RowProps>) -> Self {
        Self { flat, row, props }
    }

    pub fn row(&self) -> usize {
        self.row
    }

    pub fn columns(&self) -> usize {
        self.props.columns.len()
    }

    pub fn owns_props(&self) -> bool {
        matches!(self.props, Cow::Owned(_))
    }

    pub fn is_null(&self, index: usize) -> Result<bool, Error> {
        self.locate(index).map(|(slot, _)| slot.is_null)
    }

    fixed_reads! {
        read_bool -> bool => Kind::Bool;
        read_byte -> i8 => Kind::Byte;
        read_short -> i16 => Kind::Short;
        read_int -> i32 => Kind::Int;
        read_long -> i64 => Kind::Long;
        read_float -> f32 => Kind::Float;
        read_double -> f64 => Kind::Double;
        read_int128 -> i128 => Kind::Int128;
    }

    pub fn read_string(&self, index: usize) -> Result<&'f str, Error> {
        let flat = self.flat;
        let (at, _) = self.value_at(index, |encoder| encoder == Encoder::String)?;
        string_at(flat.main(), flat.data(), at).map_err(|err| err.with_row(self.row).with_column(index))
    }

    pub fn read_list(&self, index: usize) -> Result<ListAccessor<'f>, Error> {
        let flat = self.flat;
        let (at, encoder) = self.value_at(index, |encoder| matches!(encoder, Encoder::List(_)))?;
        let count = flat.main().read::<u32>(at)? as usize;
        let offset = flat.main().read::<u32>(at + 4)? as usize;
        ListAccessor::new(flat.list(), flat.data(), encoder.kind(), offset, count)
            .map_err(|err| err.with_row(self.row).with_column(index))
    }

    fn fixed<T: NativeType>(&self, index: usize, kind: Kind) -> Result<T, Error> {
        let (at, _) = self.value_at(index, |encoder| encoder == Encoder::Scalar(kind))?;
        self.flat.main().read::<T>(at)
    }

    fn locate(&self, index: usize) -> Result<(ColumnProps, Encoder), Error> {
        let slot = self.props.columns.get(index).copied();
        let encoder = self.flat.encoder(index);
        match (slot, encoder) {
            (Some(slot), Some(encoder)) => Ok((slot, encoder)),
            _ => Err(Error::new(ErrorKind::OutOfRange)
                .with_message(format!("column index out of range ({} columns)", self.columns()))
                .with_row(self.row)
                .with_column(index)),
        }
    }

    // Offset of the value bytes just past the header.
    fn value_at(
        &self,
        index: usize,
        expected: impl Fn(Encoder) -> bool,
    ) -> Result<(usize, Encoder), Error> {
        let (slot, encoder) = self.locate(index)?;
        if !expected(encoder) {
            let ty = self
                .flat
                .schema()
                .column(index)
                .map(|column| column.ty.to_string())
                .unwrap_or_default();
            return Err(Error::new(ErrorKind::TypeMismatch)
                .with_message(format!("column {index} holds {ty}"))
                .with_row(self.row)
                .with_column(index));
        }
        if slot.is_null {
            return Err(Error::new(ErrorKind::NullValue)
                .with_message(format!("column {index} is null"))
                .with_row(self.row)
                .with_column(index));
        }
        Ok((self.props.offset + slot.offset as usize + 1, encoder))
    }
}

impl RowData for RowAccessor<'_> {
    fn index_of(&self, field: &str) -> Result<usize, Error> {
        self.flat.schema().field(field)
    }

    delegate_reads! {
        is_null -> bool;
        read_bool -> bool;
        read_byte -> i8;
        read_short -> i16;
        read_int -> i32;
        read_long -> i64;
        read_float -> f32;
        read_double -> f64;
        read_int128 -> i128;
        read_string -> &str;
    }

    fn read_list(&self, index: usize) -> Result<Box<dyn ListData + '_>, Error> {
        Ok(Box::new(Self::read_list(self, index)?))
    }

    fn read_map(&self, index: usize) -> Result<Box<dyn MapData + '_>, Error> {
        // Map columns are rejected when the encoder binds its schema.
        Err(Error::new(ErrorKind::Unsupported)
            .with_message("map values are not supported")
            .with_row(self.row)
            .with_column(index))
    }
}

/// Read view of one list value; item offsets are resolved once at construction.
#[derive(Clone, Debug)]
pub struct ListAccessor<'f> {
    list: &'f Buffer<'f>,
    data: &'f Buffer<'f>,
    kind: Kind,
    items: Vec<usize>,
}

impl<'f> ListAccessor<'f> {
    fn new(
        list: &'f Buffer<'f>,
        data: &'f Buffer<'f>,
        kind: Kind,
        offset: usize,
        count: usize,
    ) -> Result<Self, Error> {
        let mut items = Vec::with_capacity(count.min(list.offset()));
        let mut cursor = offset;
        for _ in 0..count {
            let header = list.read::<u8>(cursor).map_err(|err| {
                Error::new(ErrorKind::Corrupt)
                    .with_message("list items run past the list region")
                    .with_offset(cursor)
                    .with_source(err)
            })?;
            items.push(cursor);
            cursor += 1;
            if !format::is_null_header(header) {
                cursor += kind.width();
            }
        }
        Ok(Self {
            list,
            data,
            kind,
            items,
        })
    }

    pub fn items(&self) -> usize {
        self.items.len()
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn is_null(&self, index: usize) -> Result<bool, Error> {
        let at = self.header_at(index)?;
        Ok(format::is_null_header(self.list.read::<u8>(at)?))
    }

    fixed_reads! {
        read_bool -> bool => Kind::Bool;
        read_byte -> i8 => Kind::Byte;
        read_short -> i16 => Kind::Short;
        read_int -> i32 => Kind::Int;
        read_long -> i64 => Kind::Long;
        read_float -> f32 => Kind::Float;
        read_double -> f64 => Kind::Double;
        read_int128 -> i128 => Kind::Int128;
    }

    pub fn read_string(&self, index: usize) -> Result<&'f str, Error> {
        let at = self.value_at(index, Kind::String)?;
        string_at(self.list, self.data, at)
    }

    fn fixed<T: NativeType>(&self, index: usize, kind: Kind) -> Result<T, Error> {
        let at = self.value_at(index, kind)?;
        self.list.read::<T>(at)
    }

    fn header_at(&self, index: usize) -> Result<usize, Error> {
        self.items.get(index).copied().ok_or_else(|| {
            Error::new(ErrorKind::OutOfRange)
                .with_message(format!("list index out of range ({} items)", self.items.len()))
                .with_offset(index)
        })
    }

    fn value_at(&self, index: usize, kind: Kind) -> Result<usize, Error> {
        let at = self.header_at(index)?;
        if kind != self.kind {
            return Err(Error::new(ErrorKind::TypeMismatch)
                .with_message(format!("list holds {} items, read as {kind}", self.kind)));
        }
        if format::is_null_header(self.list.read::<u8>(at)?) {
            return Err(Error::new(ErrorKind::NullValue)
                .with_message(format!("list item {index} is null")));
        }
        Ok(at + 1)
    }
}

impl ListData for ListAccessor<'_> {
    fn items(&self) -> usize {
        Self::items(self)
    }

    delegate_reads! {
        is_null -> bool;
        read_bool -> bool;
        read_byte -> i8;
        read_short -> i16;
        read_int -> i32;
        read_long -> i64;
        read_float -> f32;
        read_double -> f64;
        read_int128 -> i128;
        read_string -> &str;
    }
}

fn string_at<'f>(descriptors: &'f Buffer<'f>, data: &'f Buffer<'f>, at: usize) -> Result<&'f str, Error> {
    let offset = descriptors.read::<u32>(at)? as usize;
    let len = descriptors.read::<u32>(at + 4)? as usize;
    let bytes = data.bytes(offset, len)?;
    std::str::from_utf8(bytes).map_err(|err| {
        Error::new(ErrorKind::Corrupt)
            .with_message("string bytes are not valid utf-8")
            .with_offset(offset)
            .with_source(err)
    })
}
